//! User-facing Italian replies.
//!
//! Short messages are tera templates with built-in defaults; the knowledge
//! base may override any of them by key. Structured blocks (menu, cart
//! confirmation, receipt, wizard summary) are composed here directly.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use chrono::{DateTime, Local, Utc};
use rust_decimal::Decimal;
use tera::{Context, Tera};
use tracing::warn;

use pizzabot_core::cart::{Cart, CartSummary};
use pizzabot_core::catalog::MenuCatalog;
use pizzabot_core::config::RestaurantConfig;
use pizzabot_core::domain::menu::MenuItem;
use pizzabot_core::domain::order::OrderRecord;
use pizzabot_core::domain::session::{DeliveryMethod, LastOrder, PaymentMethod, PendingOrder};

const DEFAULT_PREFIX: &str = "default/";

pub const DEFAULT_TEMPLATES: &[(&str, &str)] = &[
    (
        "welcome",
        "👋 Benvenuto in *{{ pizzeria }}*! Vuoi vedere il menu o ordinare subito? La Diavola oggi è 🔥",
    ),
    ("menu", "📋 Ecco il nostro menu completo!"),
    ("order_start", "Ho capito, desideri fare un ordine. Ecco il nostro menu:"),
    ("greet", "👋 Ciao! Benvenuto in {{ pizzeria }}!"),
    ("info", "📍 {{ address }}\n🕒 {{ hours }}\n📞 {{ phone }}"),
    ("track", "Il tuo ordine {{ number }} sarà pronto per il ritiro alle {{ eta }}."),
    ("fallback", "Nessun ordine trovato. Vuoi ordinarne uno?"),
    ("other", "Ti metto in contatto con lo staff... scherzo! Sono ancora io. Dimmi pure."),
    ("not_in_menu", "'{{ name }}' non è nel nostro menu. Vuoi che ti mostri le opzioni?"),
    ("not_in_cart", "Non ho trovato '{{ name }}' nel tuo carrello."),
    ("removed", "🗑️ Ho rimosso {{ names }}. Carrello attuale: {{ remaining }}"),
    ("cart_now_empty", "🗑️ Ho rimosso {{ names }}. Il tuo carrello è ora vuoto."),
    ("empty_cart", "🛒 *Il tuo carrello è vuoto.* Vuoi ordinare qualcosa?"),
    (
        "cart_hint",
        "🛒 Il tuo carrello è vuoto. Puoi dire 'menu' per vedere le nostre opzioni deliziose!",
    ),
    ("checkout_start", "Perfetto, proseguiamo con l'ordine! Prima di tutto, come ti chiami?"),
    (
        "ask_delivery",
        "Piacere di conoscerti, {{ name }}! Preferisci consegna a domicilio o ritiro al locale?",
    ),
    ("ask_address", "Perfetto, per favore indicami l'indirizzo di consegna."),
    (
        "ask_payment_pickup",
        "Va benissimo, come preferisci pagare? Online o direttamente in pizzeria?",
    ),
    ("ask_payment_delivery", "Grazie! Ora dimmi come preferisci pagare: online o in pizzeria?"),
    ("order_confirmed", "✅ Ordine confermato!\n{{ receipt }}"),
    ("order_cancelled", "Ordine annullato. Posso aiutarti in altro modo?"),
    ("unknown_function", "Funzione '{{ name }}' non riconosciuta."),
    ("not_understood", "Non ho capito bene. Vuoi vedere il menu, ordinare o controllare un ordine?"),
];

/// Formats a money amount with two decimals. Accepts numbers and the string
/// form `Decimal` serializes to.
fn tera_money_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let amount = match value {
        tera::Value::Number(n) => n.as_f64().and_then(Decimal::from_f64_retain),
        tera::Value::String(raw) => Decimal::from_str(raw.trim()).ok(),
        _ => None,
    }
    .unwrap_or_default();
    Ok(tera::Value::String(format!("{amount:.2}")))
}

pub fn format_eta(eta: DateTime<Utc>) -> String {
    eta.with_timezone(&Local).format("%H:%M").to_string()
}

#[derive(Clone, Debug)]
pub struct ReplyBook {
    tera: Tera,
    restaurant: RestaurantConfig,
}

impl ReplyBook {
    pub fn new(restaurant: RestaurantConfig, overrides: &BTreeMap<String, String>) -> Self {
        let mut tera = Tera::default();
        tera.register_filter("money", tera_money_filter);

        for (key, body) in DEFAULT_TEMPLATES {
            if let Err(error) = tera.add_raw_template(&format!("{DEFAULT_PREFIX}{key}"), body) {
                warn!(event_name = "replies.default_invalid", key, error = %error, "bad default");
            }
        }
        for (key, body) in overrides {
            if let Err(error) = tera.add_raw_template(key, body) {
                warn!(
                    event_name = "replies.override_rejected",
                    key = %key,
                    error = %error,
                    "ignoring unparsable reply template"
                );
            }
        }

        Self { tera, restaurant }
    }

    pub fn restaurant(&self) -> &RestaurantConfig {
        &self.restaurant
    }

    fn base_context(&self) -> Context {
        let mut context = Context::new();
        context.insert("pizzeria", &self.restaurant.name);
        context.insert("address", &self.restaurant.address);
        context.insert("hours", &self.restaurant.hours);
        context.insert("phone", &self.restaurant.phone);
        context
    }

    /// Renders the override for `key` if one exists and renders cleanly,
    /// otherwise the built-in default.
    pub fn render(&self, key: &str, extra: &Context) -> String {
        let mut context = self.base_context();
        context.extend(extra.clone());

        let has_override = self.tera.get_template_names().any(|name| name == key);
        if has_override {
            match self.tera.render(key, &context) {
                Ok(text) => return text,
                Err(error) => warn!(
                    event_name = "replies.override_failed",
                    key,
                    error = %error,
                    "falling back to default reply"
                ),
            }
        }

        let default_key = format!("{DEFAULT_PREFIX}{key}");
        self.tera.render(&default_key, &context).unwrap_or_else(|error| {
            warn!(event_name = "replies.default_failed", key, error = %error, "raw default");
            DEFAULT_TEMPLATES
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, body)| body.to_string())
                .unwrap_or_default()
        })
    }

    fn render_with(&self, key: &str, pairs: &[(&str, &str)]) -> String {
        let mut context = Context::new();
        for (name, value) in pairs {
            context.insert(*name, value);
        }
        self.render(key, &context)
    }

    fn plain(&self, key: &str) -> String {
        self.render(key, &Context::new())
    }

    pub fn welcome(&self) -> String {
        self.plain("welcome")
    }

    pub fn menu_header(&self) -> String {
        self.plain("menu")
    }

    pub fn order_start(&self) -> String {
        self.plain("order_start")
    }

    pub fn greet(&self) -> String {
        self.plain("greet")
    }

    pub fn info(&self) -> String {
        self.plain("info")
    }

    pub fn track(&self, last_order: Option<&LastOrder>) -> String {
        match last_order {
            Some(order) => {
                let mut context = Context::new();
                context.insert("number", &order.number);
                context.insert("eta", &format_eta(order.eta));
                context.insert("total", &order.total);
                self.render("track", &context)
            }
            None => self.plain("fallback"),
        }
    }

    pub fn staff(&self) -> String {
        self.plain("other")
    }

    pub fn not_in_menu(&self, name: &str) -> String {
        self.render_with("not_in_menu", &[("name", name)])
    }

    pub fn not_in_cart(&self, name: &str) -> String {
        self.render_with("not_in_cart", &[("name", name)])
    }

    /// Names removed plus what is left in the cart.
    pub fn removed(&self, names: &[String], remaining: &CartSummary) -> String {
        let names = names.join(", ");
        if remaining.is_empty() {
            return self.render_with("cart_now_empty", &[("names", &names)]);
        }
        let left = remaining
            .lines
            .iter()
            .map(|line| format!("{} x{}", line.name, line.quantity))
            .collect::<Vec<_>>()
            .join(", ");
        self.render_with("removed", &[("names", &names), ("remaining", &left)])
    }

    pub fn empty_cart(&self) -> String {
        self.plain("empty_cart")
    }

    pub fn checkout_start(&self) -> String {
        self.plain("checkout_start")
    }

    pub fn ask_delivery(&self, name: &str) -> String {
        self.render_with("ask_delivery", &[("name", name)])
    }

    pub fn ask_address(&self) -> String {
        self.plain("ask_address")
    }

    pub fn ask_payment(&self, delivery: Option<DeliveryMethod>) -> String {
        match delivery {
            Some(DeliveryMethod::HomeDelivery) => self.plain("ask_payment_delivery"),
            _ => self.plain("ask_payment_pickup"),
        }
    }

    pub fn order_confirmed(&self, receipt: &str) -> String {
        self.render_with("order_confirmed", &[("receipt", receipt)])
    }

    pub fn order_cancelled(&self) -> String {
        self.plain("order_cancelled")
    }

    pub fn unknown_function(&self, name: &str) -> String {
        self.render_with("unknown_function", &[("name", name)])
    }

    pub fn not_understood(&self) -> String {
        self.plain("not_understood")
    }

    pub fn format_menu(&self, catalog: &MenuCatalog) -> String {
        let mut lines = vec![format!("# 📋 *Menu di {}*", self.restaurant.name)];
        for section in catalog.sections() {
            lines.push(format!("\n## {} *{}*", section.category.emoji(), section.title));
            for item in &section.items {
                lines.push(format!("- **{}** ─ €{:.2}", item.name, item.price));
            }
        }
        lines.push("\n*Per ordinare, scrivi ad esempio:* _\"Una Margherita e una Coca-Cola\"_".into());
        lines.join("\n")
    }

    /// Running-order confirmation after an add, with an optional upsell line.
    pub fn confirm_order(
        &self,
        cart: &Cart,
        added: &[(String, u32)],
        upsell: Option<&MenuItem>,
    ) -> String {
        if cart.is_empty() {
            return self.plain("cart_hint");
        }

        let summary = cart.summarize();
        let mut parts = Vec::new();
        if !added.is_empty() {
            let added_text = added
                .iter()
                .map(|(name, quantity)| format!("{name} x{quantity}"))
                .collect::<Vec<_>>()
                .join(", ");
            parts.push(format!("✅ *Aggiunto*: {added_text}\n"));
        }

        parts.push("🧾 *Il tuo ordine finora:*\n".to_string());
        for line in &summary.lines {
            parts.push(format!("• {} x{}", line.name, line.quantity));
        }
        parts.push(format!("\n💰 *Totale*: €{:.2}", summary.total));

        if let Some(item) = upsell {
            parts.push(format!(
                "\n✨ *Aggiungiamo un* _{}_ *per €{:.2}?* È perfetto con la tua pizza!",
                item.name, item.price
            ));
        }

        parts.push("\nVuoi aggiungere altro o passiamo al checkout?".to_string());
        parts.join("\n\n")
    }

    pub fn receipt(&self, order: &OrderRecord) -> String {
        let mut lines = vec!["# 📋 *Riepilogo Ordine*\n".to_string(), "## Prodotti:".to_string()];
        for item in &order.items {
            lines.push(format!("- **{}** × {} = €{:.2}", item.name, item.quantity, item.subtotal));
        }
        lines.push("\n---".to_string());
        lines.push(format!("## *Totale:* €{:.2}", order.total));

        lines.push("\n## Dettagli:".to_string());
        lines.push(format!("- **Ordine:** {}", order.order_number));
        let eta = format_eta(order.eta);
        match (order.delivery, order.address.as_deref()) {
            (Some(DeliveryMethod::HomeDelivery), Some(address)) => {
                lines.push(format!("- **Consegna:** *{eta}* a {address}"));
            }
            _ => lines.push(format!("- **Ritiro:** *{eta}* presso {}", self.restaurant.address)),
        }

        lines.push("\n## ✅ *Ordine Confermato!*".to_string());
        lines.push(format!("\n*Grazie per aver scelto {}!* 🍕 *Buon appetito!*", self.restaurant.name));
        lines.join("\n")
    }

    /// Summary shown before the final confirmation question.
    pub fn wizard_summary(&self, cart: &Cart, pending: &PendingOrder) -> String {
        let summary = cart.summarize();
        let items = summary
            .lines
            .iter()
            .map(|line| format!("• {} x{}", line.name, line.quantity))
            .collect::<Vec<_>>()
            .join("\n");
        let delivery = match pending.delivery {
            Some(DeliveryMethod::HomeDelivery) => "📦 Consegna a domicilio",
            _ => "🏁 Ritiro al locale",
        };
        let payment = match pending.payment {
            Some(PaymentMethod::Online) => "Online",
            _ => "In pizzeria",
        };

        format!(
            "Ciao **{customer}**, ecco il riepilogo del tuo ordine:\n\
             ## 📋 Riepilogo Ordine\n{items}\n\n\
             💰 **Totale:** €{total:.2}\n\
             🚚 **Modalità:** {delivery}\n\
             📍 **Indirizzo:** {address}\n\
             💳 **Pagamento:** {payment}\n\n\
             __Confermi l'ordine?__ (sì / no)",
            customer = pending.name.as_deref().unwrap_or(""),
            total = summary.total,
            address = pending.address.as_deref().unwrap_or("—"),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use pizzabot_core::cart::Cart;
    use pizzabot_core::config::RestaurantConfig;
    use pizzabot_core::domain::order::{OrderItem, OrderRecord};
    use pizzabot_core::domain::session::{
        DeliveryMethod, LastOrder, PaymentMethod, PendingOrder,
    };

    use super::{format_eta, ReplyBook};
    use crate::testing::{catalog, knowledge_base};

    fn book() -> ReplyBook {
        ReplyBook::new(RestaurantConfig::default(), &BTreeMap::new())
    }

    #[test]
    fn defaults_render_restaurant_details() {
        let book = book();
        assert_eq!(
            book.welcome(),
            "👋 Benvenuto in *Pizzeria Da Mario*! Vuoi vedere il menu o ordinare subito? La Diavola oggi è 🔥"
        );
        assert_eq!(book.info(), "📍 Via Roma 123, Milano\n🕒 11:00 - 23:00\n📞 +39 02 1234567");
        assert_eq!(book.track(None), "Nessun ordine trovato. Vuoi ordinarne uno?");
        assert_eq!(book.unknown_function("balla"), "Funzione 'balla' non riconosciuta.");
    }

    #[test]
    fn knowledge_base_overrides_win_and_broken_ones_fall_back() {
        let mut overrides = knowledge_base().templates().clone();
        overrides.insert("staff".into(), "ignored key".into());
        overrides.insert("other".into(), "{{ missing_var }}".into());
        overrides.insert("menu".into(), "{% if %}".into());
        let book = ReplyBook::new(RestaurantConfig::default(), &overrides);

        assert_eq!(book.greet(), "Ciao da Pizzeria Da Mario!");
        assert_eq!(
            book.staff(),
            "Ti metto in contatto con lo staff... scherzo! Sono ancora io. Dimmi pure."
        );
        assert_eq!(book.menu_header(), "📋 Ecco il nostro menu completo!");
    }

    #[test]
    fn track_reports_number_and_eta() {
        let eta = Utc::now();
        let order = LastOrder { number: "#1234".into(), eta, total: Decimal::new(95, 1) };
        let text = book().track(Some(&order));
        assert_eq!(
            text,
            format!("Il tuo ordine #1234 sarà pronto per il ritiro alle {}.", format_eta(eta))
        );
    }

    #[test]
    fn money_filter_formats_decimals() {
        let mut overrides = BTreeMap::new();
        overrides.insert("track".into(), "{{ number }}: €{{ total | money }}".into());
        let book = ReplyBook::new(RestaurantConfig::default(), &overrides);
        let order =
            LastOrder { number: "#7".into(), eta: Utc::now(), total: Decimal::new(95, 1) };
        assert_eq!(book.track(Some(&order)), "#7: €9.50");
    }

    #[test]
    fn menu_lists_every_section_in_order() {
        let menu = book().format_menu(&catalog());
        let lines = menu.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "# 📋 *Menu di Pizzeria Da Mario*");
        assert!(menu.contains("\n## 🍕 *Pizze*\n- **Margherita** ─ €6.50"));
        assert!(menu.contains("## 🥤 *Bevande*"));
        assert!(menu.contains("- **Tiramisù** ─ €4.50"));
        assert!(menu.find("Pizze") < menu.find("Dolci"));
        assert!(menu.ends_with("_\"Una Margherita e una Coca-Cola\"_"));
    }

    #[test]
    fn confirmation_lists_additions_running_order_and_upsell() {
        let catalog = catalog();
        let mut cart = Cart::default();
        cart.add(catalog.find("Margherita").expect("fixture"), 2);
        let upsell = catalog.find("Acqua");

        let text = book().confirm_order(&cart, &[("Margherita".into(), 2)], upsell);

        assert!(text.starts_with(
            "✅ *Aggiunto*: Margherita x2\n\n\n🧾 *Il tuo ordine finora:*\n\n\n• Margherita x2"
        ));
        assert!(text.contains("💰 *Totale*: €13.00"));
        assert!(text.contains("✨ *Aggiungiamo un* _Acqua_ *per €1.00?*"));
        assert!(text.ends_with("Vuoi aggiungere altro o passiamo al checkout?"));

        assert!(book().confirm_order(&Cart::default(), &[], None).starts_with("🛒 Il tuo carrello"));
    }

    #[test]
    fn removal_message_mentions_what_is_left() {
        let catalog = catalog();
        let mut cart = Cart::default();
        cart.add(catalog.find("Acqua").expect("fixture"), 2);
        let book = book();

        assert_eq!(
            book.removed(&["Diavola".into()], &cart.summarize()),
            "🗑️ Ho rimosso Diavola. Carrello attuale: Acqua x2"
        );
        assert_eq!(
            book.removed(&["Acqua".into()], &Cart::default().summarize()),
            "🗑️ Ho rimosso Acqua. Il tuo carrello è ora vuoto."
        );
    }

    #[test]
    fn receipt_shows_lines_total_and_pickup_or_delivery() {
        let now = Utc::now();
        let mut order = OrderRecord {
            order_number: "#2048".into(),
            session_id: "web-1".into(),
            items: vec![
                OrderItem { name: "Diavola".into(), quantity: 2, subtotal: Decimal::new(16, 0) },
                OrderItem { name: "Acqua".into(), quantity: 1, subtotal: Decimal::new(1, 0) },
            ],
            total: Decimal::new(17, 0),
            eta: now,
            placed_at: now,
            customer: Some("Mario".into()),
            delivery: Some(DeliveryMethod::Pickup),
            address: None,
            payment: Some(PaymentMethod::InPizzeria),
        };
        let book = book();

        let receipt = book.receipt(&order);
        assert!(receipt.starts_with("# 📋 *Riepilogo Ordine*\n\n## Prodotti:"));
        assert!(receipt.contains("- **Diavola** × 2 = €16.00"));
        assert!(receipt.contains("## *Totale:* €17.00"));
        assert!(receipt.contains("- **Ordine:** #2048"));
        assert!(receipt.contains(&format!("- **Ritiro:** *{}* presso Via Roma 123", format_eta(now))));
        assert!(receipt.ends_with("*Grazie per aver scelto Pizzeria Da Mario!* 🍕 *Buon appetito!*"));

        order.delivery = Some(DeliveryMethod::HomeDelivery);
        order.address = Some("Via Verdi 3".into());
        assert!(book.receipt(&order).contains("- **Consegna:**"));
        assert!(book.receipt(&order).contains(" a Via Verdi 3"));
    }

    #[test]
    fn wizard_summary_uses_dash_for_pickup_address() {
        let catalog = catalog();
        let mut cart = Cart::default();
        cart.add(catalog.find("Diavola").expect("fixture"), 1);
        let pending = PendingOrder {
            name: Some("Lucia".into()),
            delivery: Some(DeliveryMethod::Pickup),
            address: None,
            payment: Some(PaymentMethod::Online),
        };

        let summary = book().wizard_summary(&cart, &pending);
        assert!(summary.starts_with("Ciao **Lucia**, ecco il riepilogo del tuo ordine:"));
        assert!(summary.contains("• Diavola x1"));
        assert!(summary.contains("💰 **Totale:** €8.00"));
        assert!(summary.contains("🏁 Ritiro al locale"));
        assert!(summary.contains("📍 **Indirizzo:** —"));
        assert!(summary.contains("💳 **Pagamento:** Online"));
        assert!(summary.ends_with("(sì / no)"));
    }
}
