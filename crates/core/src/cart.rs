use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::catalog::MenuCatalog;
use crate::domain::menu::{MenuCategory, MenuItem};
use crate::domain::order::{OrderItem, OrderRecord};
use crate::domain::session::{DialogueStep, LastOrder, SessionId, SessionState};

pub const ORDER_NUMBER_RANGE: std::ops::RangeInclusive<u32> = 1000..=9999;
pub const ETA_MINUTES_RANGE: std::ops::Range<i64> = 15..30;
/// Most units of one item a single request may add.
pub const MAX_ITEM_QUANTITY: u32 = 50;

/// One entry per unit ordered; quantity is implied by repetition.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    lines: Vec<MenuItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryLine {
    pub name: String,
    pub quantity: u32,
    pub subtotal: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSummary {
    pub lines: Vec<SummaryLine>,
    pub total: Decimal,
}

impl CartSummary {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn into_order_items(self) -> Vec<OrderItem> {
        self.lines
            .into_iter()
            .map(|line| OrderItem { name: line.name, quantity: line.quantity, subtotal: line.subtotal })
            .collect()
    }
}

impl Cart {
    pub fn lines(&self) -> &[MenuItem] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Appends `quantity` units of `item`, clamped to [`MAX_ITEM_QUANTITY`].
    pub fn add(&mut self, item: &MenuItem, quantity: u32) {
        let quantity = quantity.min(MAX_ITEM_QUANTITY) as usize;
        self.lines.extend(std::iter::repeat(item.clone()).take(quantity));
    }

    /// Removes up to `quantity` lines whose name matches case-insensitively,
    /// earliest first. Returns how many were removed.
    pub fn remove(&mut self, name: &str, quantity: u32) -> u32 {
        let key = name.trim().to_lowercase();
        let mut removed = 0;
        self.lines.retain(|line| {
            if removed < quantity && line.name.to_lowercase() == key {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn contains(&self, name: &str) -> bool {
        let key = name.trim().to_lowercase();
        self.lines.iter().any(|line| line.name.to_lowercase() == key)
    }

    pub fn has_category(&self, category: MenuCategory) -> bool {
        self.lines.iter().any(|line| line.category == category)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Groups lines by exact name in first-seen order. Subtotals add up each
    /// line's own price.
    pub fn summarize(&self) -> CartSummary {
        let mut summary = CartSummary::default();
        for line in &self.lines {
            match summary.lines.iter_mut().find(|entry| entry.name == line.name) {
                Some(entry) => {
                    entry.quantity += 1;
                    entry.subtotal += line.price;
                }
                None => summary.lines.push(SummaryLine {
                    name: line.name.clone(),
                    quantity: 1,
                    subtotal: line.price,
                }),
            }
            summary.total += line.price;
        }
        summary
    }
}

/// Suggest an item of `suggest` when the cart lacks that category and, if
/// set, already holds something from `when_present`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsellRule {
    #[serde(default)]
    pub when_present: Option<MenuCategory>,
    pub suggest: MenuCategory,
}

impl UpsellRule {
    pub fn defaults() -> Vec<UpsellRule> {
        vec![
            UpsellRule { when_present: Some(MenuCategory::Pizza), suggest: MenuCategory::Drink },
            UpsellRule { when_present: None, suggest: MenuCategory::Dessert },
        ]
    }

    fn applies_to(&self, cart: &Cart) -> bool {
        let trigger = match self.when_present {
            Some(category) => cart.has_category(category),
            None => !cart.is_empty(),
        };
        trigger && !cart.has_category(self.suggest)
    }
}

pub fn upsell_suggestion<'c, R: Rng + ?Sized>(
    cart: &Cart,
    catalog: &'c MenuCatalog,
    rules: &[UpsellRule],
    rng: &mut R,
) -> Option<&'c MenuItem> {
    let mut missing = Vec::new();
    for rule in rules.iter().filter(|rule| rule.applies_to(cart)) {
        if !missing.contains(&rule.suggest) && !catalog.items_in(rule.suggest).is_empty() {
            missing.push(rule.suggest);
        }
    }
    let category = *missing.choose(rng)?;
    catalog.items_in(category).choose(rng).copied()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckoutOutcome {
    EmptyCart,
    Committed(OrderRecord),
}

/// Finalises the cart into an order. An empty cart leaves the state untouched.
/// There is no idempotency key: a second call sees an empty cart.
pub fn checkout<R: Rng + ?Sized>(
    state: &mut SessionState,
    session_id: &SessionId,
    now: DateTime<Utc>,
    rng: &mut R,
) -> CheckoutOutcome {
    if state.cart.is_empty() {
        return CheckoutOutcome::EmptyCart;
    }

    let summary = state.cart.summarize();
    let order_number = format!("#{}", rng.gen_range(ORDER_NUMBER_RANGE));
    let eta = now + Duration::minutes(rng.gen_range(ETA_MINUTES_RANGE));
    let pending = state.pending_order.take().unwrap_or_default();
    let total = summary.total;

    state.cart.clear();
    state.step = DialogueStep::Ordered;
    state.last_order = Some(LastOrder { number: order_number.clone(), eta, total });

    CheckoutOutcome::Committed(OrderRecord {
        order_number,
        session_id: session_id.to_string(),
        items: summary.into_order_items(),
        total,
        eta,
        placed_at: now,
        customer: pending.name,
        delivery: pending.delivery,
        address: pending.address,
        payment: pending.payment,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal::Decimal;

    use super::{checkout, upsell_suggestion, Cart, CheckoutOutcome, UpsellRule, MAX_ITEM_QUANTITY};
    use crate::catalog::test_support::catalog;
    use crate::domain::menu::MenuCategory;
    use crate::domain::session::{
        DialogueStep, PaymentMethod, PendingOrder, SessionId, SessionState,
    };

    fn cart_with(names: &[(&str, u32)]) -> Cart {
        let catalog = catalog();
        let mut cart = Cart::default();
        for (name, quantity) in names {
            cart.add(catalog.find(name).expect("fixture item"), *quantity);
        }
        cart
    }

    #[test]
    fn summary_groups_by_name_and_totals_line_prices() {
        let cart = cart_with(&[("Margherita", 2), ("Coca-Cola", 1), ("Margherita", 1)]);
        let summary = cart.summarize();

        assert_eq!(summary.lines.len(), 2);
        assert_eq!(summary.lines[0].name, "Margherita");
        assert_eq!(summary.lines[0].quantity, 3);
        assert_eq!(summary.lines[0].subtotal, Decimal::new(195, 1));
        assert_eq!(summary.total, Decimal::new(220, 1));
        assert!(summary.lines.iter().all(|line| line.quantity > 0));
    }

    #[test]
    fn oversized_quantity_is_clamped_per_add() {
        let cart = cart_with(&[("Acqua", 3_000_000)]);
        assert_eq!(cart.len(), MAX_ITEM_QUANTITY as usize);

        let cart = cart_with(&[("Acqua", u32::MAX), ("Diavola", 2)]);
        assert_eq!(cart.len(), MAX_ITEM_QUANTITY as usize + 2);
    }

    #[test]
    fn remove_is_bounded_by_quantity_and_availability() {
        let mut cart = cart_with(&[("Diavola", 3), ("Acqua", 1)]);

        assert_eq!(cart.remove("diavola", 2), 2);
        assert_eq!(cart.len(), 2);
        assert_eq!(cart.remove("DIAVOLA", 5), 1);
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.remove("Tiramisù", 1), 0);
        assert!(cart.contains("acqua"));
    }

    #[test]
    fn remove_takes_earliest_lines_first() {
        let mut cart = cart_with(&[("Acqua", 1), ("Diavola", 1), ("Acqua", 1)]);
        cart.remove("Acqua", 1);
        let names = cart.lines().iter().map(|line| line.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Diavola", "Acqua"]);
    }

    #[test]
    fn checkout_on_empty_cart_changes_nothing() {
        let mut state = SessionState { step: DialogueStep::Ordering, ..SessionState::default() };
        let before = state.clone();
        let mut rng = StdRng::seed_from_u64(7);

        let outcome = checkout(&mut state, &SessionId("s-1".into()), Utc::now(), &mut rng);

        assert_eq!(outcome, CheckoutOutcome::EmptyCart);
        assert_eq!(state, before);
    }

    #[test]
    fn checkout_commits_order_and_clears_cart() {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 19, 0, 0).single().expect("valid timestamp");
        let mut state = SessionState {
            step: DialogueStep::AwaitOrderConfirmation,
            cart: cart_with(&[("Margherita", 1), ("Coca-Cola", 2)]),
            pending_order: Some(PendingOrder {
                name: Some("Mario".into()),
                payment: Some(PaymentMethod::InPizzeria),
                ..PendingOrder::default()
            }),
            ..SessionState::default()
        };
        let expected_total = state.cart.summarize().total;
        let mut rng = StdRng::seed_from_u64(42);

        let CheckoutOutcome::Committed(order) =
            checkout(&mut state, &SessionId("s-2".into()), now, &mut rng)
        else {
            panic!("non-empty cart must commit");
        };

        assert!(state.cart.is_empty());
        assert_eq!(state.step, DialogueStep::Ordered);
        assert!(state.pending_order.is_none());
        assert_eq!(order.total, expected_total);
        assert_eq!(order.item_count(), 3);
        assert_eq!(order.customer.as_deref(), Some("Mario"));
        assert_eq!(order.session_id, "s-2");

        let number = order.order_number.trim_start_matches('#').parse::<u32>().expect("numeric");
        assert!(order.order_number.starts_with('#'));
        assert!((1000..=9999).contains(&number));
        assert!(order.eta >= now + Duration::minutes(15));
        assert!(order.eta < now + Duration::minutes(30));

        let last = state.last_order.expect("last order recorded");
        assert_eq!(last.number, order.order_number);
        assert_eq!(last.total, expected_total);
    }

    #[test]
    fn upsell_suggests_drink_or_dessert_for_a_lone_pizza() {
        let catalog = catalog();
        let cart = cart_with(&[("Diavola", 1)]);
        for seed in 0..16 {
            let mut rng = StdRng::seed_from_u64(seed);
            let suggestion = upsell_suggestion(&cart, &catalog, &UpsellRule::defaults(), &mut rng)
                .expect("something is missing");
            assert!(matches!(suggestion.category, MenuCategory::Drink | MenuCategory::Dessert));
        }
    }

    #[test]
    fn upsell_is_silent_when_nothing_is_missing() {
        let catalog = catalog();
        let mut rng = StdRng::seed_from_u64(1);

        let full = cart_with(&[("Diavola", 1), ("Acqua", 1), ("Tiramisù", 1)]);
        assert!(upsell_suggestion(&full, &catalog, &UpsellRule::defaults(), &mut rng).is_none());
        assert!(
            upsell_suggestion(&Cart::default(), &catalog, &UpsellRule::defaults(), &mut rng)
                .is_none()
        );

        let drink_only = cart_with(&[("Acqua", 1)]);
        let suggestion = upsell_suggestion(&drink_only, &catalog, &UpsellRule::defaults(), &mut rng)
            .expect("dessert missing");
        assert_eq!(suggestion.category, MenuCategory::Dessert);
    }
}
