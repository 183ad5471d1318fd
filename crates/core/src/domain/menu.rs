use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuCategory {
    Pizza,
    Drink,
    Dessert,
    Other,
}

impl MenuCategory {
    /// Maps a menu section heading (Italian or English) onto a category.
    pub fn from_section_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "pizze" | "pizza" | "pizzas" => Self::Pizza,
            "bevande" | "bibite" | "drinks" | "drink" => Self::Drink,
            "dolci" | "dessert" | "desserts" => Self::Dessert,
            _ => Self::Other,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Pizza => "🍕",
            Self::Drink => "🥤",
            Self::Dessert => "🍰",
            Self::Other => "",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pizza => "pizza",
            Self::Drink => "drink",
            Self::Dessert => "dessert",
            Self::Other => "other",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub name: String,
    pub price: Decimal,
    pub category: MenuCategory,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuSection {
    pub title: String,
    pub category: MenuCategory,
    pub items: Vec<MenuItem>,
}

#[cfg(test)]
mod tests {
    use super::MenuCategory;

    #[test]
    fn section_names_map_to_categories() {
        assert_eq!(MenuCategory::from_section_name("Pizze"), MenuCategory::Pizza);
        assert_eq!(MenuCategory::from_section_name(" bevande "), MenuCategory::Drink);
        assert_eq!(MenuCategory::from_section_name("Dolci"), MenuCategory::Dessert);
        assert_eq!(MenuCategory::from_section_name("Antipasti"), MenuCategory::Other);
    }
}
