use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::session::{DeliveryMethod, DialogueStep};
use crate::flows::states::{FlowAction, FlowContext, FlowEvent, FlowState, TransitionOutcome};

pub trait FlowDefinition {
    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

#[derive(Clone, Debug, Default)]
pub struct CheckoutWizard;

impl FlowDefinition for CheckoutWizard {
    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_checkout(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn apply(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "dialogue.wizard_transition",
                        AuditCategory::Dialogue,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", outcome.event.name()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "dialogue.wizard_transition_rejected",
                        AuditCategory::Dialogue,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<CheckoutWizard> {
    fn default() -> Self {
        Self::new(CheckoutWizard)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("cannot start checkout from {state:?} with an empty cart")]
    EmptyCart { state: FlowState },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: FlowState, event: FlowEvent },
}

fn transition_checkout(
    current: &FlowState,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use DialogueStep::{
        AwaitAddress, AwaitDeliveryMethod, AwaitName, AwaitOrderConfirmation, AwaitPaymentMethod,
        Ordered, Ordering, Start,
    };
    use FlowAction::{
        AskAddress, AskDeliveryMethod, AskName, AskPaymentMethod, DiscardPendingOrder,
        EmitWelcome, FinalizeOrder, PresentSummary, StartPendingOrder, StoreAddress,
        StoreDelivery, StoreName, StorePayment,
    };
    use FlowEvent::{
        AddressProvided, CheckoutRequested, DeliveryChosen, Greeted, NameProvided,
        OrderConfirmed, OrderDeclined, PaymentChosen,
    };

    let (to, actions) = match (current, event) {
        (Start | Ordering | Ordered, Greeted) => (Ordering, vec![EmitWelcome]),
        (Ordering | Ordered, CheckoutRequested) => {
            if context.cart_is_empty {
                return Err(FlowTransitionError::EmptyCart { state: *current });
            }
            (AwaitName, vec![StartPendingOrder, AskName])
        }
        (AwaitName, NameProvided(_)) => (AwaitDeliveryMethod, vec![StoreName, AskDeliveryMethod]),
        (AwaitDeliveryMethod, DeliveryChosen(DeliveryMethod::HomeDelivery)) => {
            (AwaitAddress, vec![StoreDelivery, AskAddress])
        }
        (AwaitDeliveryMethod, DeliveryChosen(DeliveryMethod::Pickup)) => {
            (AwaitPaymentMethod, vec![StoreDelivery, AskPaymentMethod])
        }
        (AwaitAddress, AddressProvided(_)) => {
            (AwaitPaymentMethod, vec![StoreAddress, AskPaymentMethod])
        }
        (AwaitPaymentMethod, PaymentChosen(_)) => {
            (AwaitOrderConfirmation, vec![StorePayment, PresentSummary])
        }
        (AwaitOrderConfirmation, OrderConfirmed) => (Ordered, vec![FinalizeOrder]),
        (AwaitOrderConfirmation, OrderDeclined) => (Ordering, vec![DiscardPendingOrder]),
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: *current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::session::{DeliveryMethod, PaymentMethod, SessionId};
    use crate::flows::engine::{CheckoutWizard, FlowEngine, FlowTransitionError};
    use crate::flows::states::{FlowAction, FlowContext, FlowEvent, FlowState};

    fn with_items() -> FlowContext {
        FlowContext { cart_is_empty: false }
    }

    #[test]
    fn pickup_path_skips_the_address() {
        let engine = FlowEngine::new(CheckoutWizard);
        let context = with_items();
        let mut state = FlowState::default();

        state = engine.apply(&state, &FlowEvent::Greeted, &context).expect("start -> ordering").to;
        let ask_name = engine
            .apply(&state, &FlowEvent::CheckoutRequested, &context)
            .expect("ordering -> await name");
        assert_eq!(ask_name.actions, vec![FlowAction::StartPendingOrder, FlowAction::AskName]);

        state = engine
            .apply(&ask_name.to, &FlowEvent::NameProvided("Mario".into()), &context)
            .expect("name")
            .to;
        state = engine
            .apply(&state, &FlowEvent::DeliveryChosen(DeliveryMethod::Pickup), &context)
            .expect("pickup")
            .to;
        assert_eq!(state, FlowState::AwaitPaymentMethod);

        let summary = engine
            .apply(&state, &FlowEvent::PaymentChosen(PaymentMethod::InPizzeria), &context)
            .expect("payment");
        assert_eq!(summary.to, FlowState::AwaitOrderConfirmation);
        assert!(summary.actions.contains(&FlowAction::PresentSummary));

        let done =
            engine.apply(&summary.to, &FlowEvent::OrderConfirmed, &context).expect("confirmed");
        assert_eq!(done.to, FlowState::Ordered);
        assert_eq!(done.actions, vec![FlowAction::FinalizeOrder]);
    }

    #[test]
    fn home_delivery_asks_for_address() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(
                &FlowState::AwaitDeliveryMethod,
                &FlowEvent::DeliveryChosen(DeliveryMethod::HomeDelivery),
                &with_items(),
            )
            .expect("delivery chosen");
        assert_eq!(outcome.to, FlowState::AwaitAddress);

        let next = engine
            .apply(&outcome.to, &FlowEvent::AddressProvided("Via Verdi 1".into()), &with_items())
            .expect("address");
        assert_eq!(next.to, FlowState::AwaitPaymentMethod);
    }

    #[test]
    fn declining_returns_to_ordering() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(&FlowState::AwaitOrderConfirmation, &FlowEvent::OrderDeclined, &with_items())
            .expect("declined");
        assert_eq!(outcome.to, FlowState::Ordering);
        assert_eq!(outcome.actions, vec![FlowAction::DiscardPendingOrder]);
    }

    #[test]
    fn empty_cart_cannot_enter_checkout() {
        let engine = FlowEngine::default();
        let error = engine
            .apply(&FlowState::Ordering, &FlowEvent::CheckoutRequested, &FlowContext {
                cart_is_empty: true,
            })
            .expect_err("empty cart must not start the wizard");
        assert_eq!(error, FlowTransitionError::EmptyCart { state: FlowState::Ordering });
    }

    #[test]
    fn out_of_order_event_is_rejected() {
        let engine = FlowEngine::default();
        let error = engine
            .apply(&FlowState::AwaitName, &FlowEvent::OrderConfirmed, &with_items())
            .expect_err("name step cannot confirm");
        assert!(matches!(
            error,
            FlowTransitionError::InvalidTransition {
                state: FlowState::AwaitName,
                event: FlowEvent::OrderConfirmed
            }
        ));
    }

    #[test]
    fn wizard_transition_emits_audit_event() {
        let engine = FlowEngine::default();
        let sink = InMemoryAuditSink::default();

        let _ = engine
            .apply_with_audit(
                &FlowState::AwaitName,
                &FlowEvent::NameProvided("Lucia".into()),
                &with_items(),
                &sink,
                &AuditContext::new(Some(SessionId("web-7".to_owned())), "req-42", "web"),
            )
            .expect("transition should succeed");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].context.correlation_id, "req-42");
        assert_eq!(events[0].event_type, "dialogue.wizard_transition");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("await_delivery_method"));
    }
}
