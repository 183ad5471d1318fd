use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use pizzabot_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use pizzabot_core::cart::{checkout, upsell_suggestion, Cart, CheckoutOutcome, UpsellRule};
use pizzabot_core::catalog::MenuCatalog;
use pizzabot_core::domain::order::OrderRecord;
use pizzabot_core::domain::session::{SessionId, SessionState};
use pizzabot_core::journal::OrderLog;

use crate::responses::ReplyBook;

/// Identity of one inbound turn, threaded through logging and audit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnContext {
    pub session_id: SessionId,
    pub audit: AuditContext,
}

impl TurnContext {
    pub fn new(
        session_id: SessionId,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        let audit = AuditContext::new(Some(session_id.clone()), correlation_id, actor);
        Self { session_id, audit }
    }

    pub fn correlation_id(&self) -> &str {
        &self.audit.correlation_id
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddOutcome {
    /// Canonical name and quantity of every line group added.
    pub added: Vec<(String, u32)>,
    /// Requested names that resolved to nothing.
    pub missing: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub removed: Vec<String>,
    pub missing: Vec<String>,
}

/// Collaborators shared by the controller and the function-calling tools.
pub struct DialogueServices {
    pub catalog: Arc<MenuCatalog>,
    pub replies: Arc<ReplyBook>,
    pub orders: Arc<dyn OrderLog>,
    pub audit: Arc<dyn AuditSink>,
    pub upsell_rules: Vec<UpsellRule>,
}

impl DialogueServices {
    pub fn add_items(&self, cart: &mut Cart, requests: &[(String, u32)]) -> AddOutcome {
        let mut outcome = AddOutcome::default();
        for (name, quantity) in requests {
            if *quantity == 0 {
                continue;
            }
            match self.catalog.resolve(name) {
                Some(item) => {
                    cart.add(item, *quantity);
                    outcome.added.push((item.name.clone(), *quantity));
                }
                None => outcome.missing.push(name.clone()),
            }
        }
        outcome
    }

    /// Literal case-insensitive removal first; a name with no literal match
    /// is retried under its canonical menu name.
    pub fn remove_items(&self, cart: &mut Cart, requests: &[(String, u32)]) -> RemoveOutcome {
        let mut outcome = RemoveOutcome::default();
        for (name, quantity) in requests {
            let mut removed_as = name.clone();
            let mut removed = cart.remove(name, *quantity);
            if removed == 0 {
                if let Some(item) = self.catalog.resolve(name) {
                    removed = cart.remove(&item.name, *quantity);
                    removed_as = item.name.clone();
                }
            }
            if removed > 0 {
                outcome.removed.push(removed_as);
            } else {
                outcome.missing.push(name.clone());
            }
        }
        outcome
    }

    pub fn confirm_added(&self, cart: &Cart, added: &[(String, u32)]) -> String {
        let upsell =
            upsell_suggestion(cart, &self.catalog, &self.upsell_rules, &mut rand::thread_rng());
        self.replies.confirm_order(cart, added, upsell)
    }

    /// Reply fragments for a removal: what went, then what was not found.
    pub fn removal_fragments(&self, cart: &Cart, outcome: &RemoveOutcome) -> Vec<String> {
        let mut fragments = Vec::new();
        if !outcome.removed.is_empty() {
            fragments.push(self.replies.removed(&outcome.removed, &cart.summarize()));
        }
        fragments.extend(outcome.missing.iter().map(|name| self.replies.not_in_cart(name)));
        fragments
    }

    /// Commits the cart as an order and journals it. `None` for an empty
    /// cart, which leaves the session untouched.
    pub async fn finalize_order(
        &self,
        turn: &TurnContext,
        state: &mut SessionState,
    ) -> Option<OrderRecord> {
        let outcome = checkout(state, &turn.session_id, Utc::now(), &mut rand::thread_rng());
        let CheckoutOutcome::Committed(order) = outcome else {
            return None;
        };

        info!(
            event_name = "order.checkout_committed",
            session_id = %turn.session_id,
            correlation_id = %turn.correlation_id(),
            order_number = %order.order_number,
            total = %order.total,
            items = order.item_count(),
            "order committed"
        );
        self.audit.emit(
            AuditEvent::from_context(
                &turn.audit,
                "order.checkout_committed",
                AuditCategory::Order,
                AuditOutcome::Success,
            )
            .with_metadata("order_number", order.order_number.clone())
            .with_metadata("total", order.total.to_string())
            .with_metadata("items", order.item_count().to_string()),
        );

        if let Err(error) = self.orders.append_order(&order).await {
            error!(
                event_name = "order.journal_failed",
                session_id = %turn.session_id,
                order_number = %order.order_number,
                error = %error,
                "could not append order to the journal"
            );
        }
        Some(order)
    }

    /// Receipt for a committed order, or the empty-cart reply.
    pub async fn checkout_reply(&self, turn: &TurnContext, state: &mut SessionState) -> String {
        match self.finalize_order(turn, state).await {
            Some(order) => self.replies.receipt(&order),
            None => self.replies.empty_cart(),
        }
    }
}


#[cfg(test)]
mod tests {
    use pizzabot_core::cart::Cart;
    use pizzabot_core::domain::session::{DialogueStep, SessionState};

    use super::test_support::{harness, turn};
    use super::{AddOutcome, RemoveOutcome};

    #[test]
    fn adds_resolve_fuzzily_and_report_missing_names() {
        let harness = harness();
        let mut cart = Cart::default();

        let outcome = harness.services.add_items(
            &mut cart,
            &[("margherite".into(), 2), ("XYZ123".into(), 1), ("coke".into(), 0)],
        );

        assert_eq!(
            outcome,
            AddOutcome { added: vec![("Margherita".into(), 2)], missing: vec!["XYZ123".into()] }
        );
        assert_eq!(cart.len(), 2);
    }

    #[test]
    fn removal_falls_back_to_the_canonical_name() {
        let harness = harness();
        let mut cart = Cart::default();
        harness.services.add_items(&mut cart, &[("Coca-Cola".into(), 2), ("Diavola".into(), 1)]);

        let outcome = harness
            .services
            .remove_items(&mut cart, &[("coca".into(), 1), ("Tiramisù".into(), 1)]);

        assert_eq!(
            outcome,
            RemoveOutcome { removed: vec!["Coca-Cola".into()], missing: vec!["Tiramisù".into()] }
        );
        let fragments = harness.services.removal_fragments(&cart, &outcome);
        assert_eq!(
            fragments,
            vec![
                "🗑️ Ho rimosso Coca-Cola. Carrello attuale: Coca-Cola x1, Diavola x1".to_string(),
                "Non ho trovato 'Tiramisù' nel tuo carrello.".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn checkout_journals_and_audits_the_order() {
        let harness = harness();
        let turn = turn();
        let mut state = SessionState { step: DialogueStep::Ordering, ..SessionState::default() };
        harness.services.add_items(&mut state.cart, &[("Diavola".into(), 2)]);

        let receipt = harness.services.checkout_reply(&turn, &mut state).await;

        assert!(receipt.contains("- **Diavola** × 2 = €16.00"));
        assert!(state.cart.is_empty());
        assert_eq!(state.step, DialogueStep::Ordered);
        let orders = harness.journal.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(Some(&orders[0].order_number), state.last_order.as_ref().map(|o| &o.number));
        let events = harness.audit.events();
        assert_eq!(events[0].event_type, "order.checkout_committed");
        assert_eq!(events[0].context.correlation_id, "req-1");

        let again = harness.services.checkout_reply(&turn, &mut state).await;
        assert_eq!(again, "🛒 *Il tuo carrello è vuoto.* Vuoi ordinare qualcosa?");
        assert_eq!(harness.journal.orders().len(), 1);
    }
}
