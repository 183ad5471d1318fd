pub mod fuzzy;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::menu::{MenuCategory, MenuItem, MenuSection};
pub use fuzzy::{FuzzyMatch, FuzzyMatcher, DEFAULT_SIMILARITY_THRESHOLD, MIN_QUERY_CHARS};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("could not read menu file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse menu document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("menu item in section `{section}` has an empty name")]
    EmptyName { section: String },
    #[error("menu item `{0}` has a negative price")]
    NegativePrice(String),
    #[error("menu item `{0}` appears more than once")]
    DuplicateItem(String),
}

#[derive(Debug, Deserialize)]
struct RawMenuItem {
    name: String,
    price: Decimal,
    #[serde(default)]
    aliases: Vec<String>,
}

#[derive(Clone, Debug)]
struct Candidate {
    key: String,
    section: usize,
    item: usize,
}

/// Immutable menu loaded once at startup, with a flattened lookup of every
/// canonical name and alias (case-folded) for fuzzy resolution.
#[derive(Clone, Debug)]
pub struct MenuCatalog {
    sections: Vec<MenuSection>,
    candidates: Vec<Candidate>,
    matcher: FuzzyMatcher,
}

impl MenuCatalog {
    pub fn new(sections: Vec<MenuSection>) -> Result<Self, CatalogError> {
        let mut seen = BTreeSet::new();
        let mut candidates = Vec::new();

        for (section_index, section) in sections.iter().enumerate() {
            for (item_index, item) in section.items.iter().enumerate() {
                let key = item.name.trim().to_lowercase();
                if key.is_empty() {
                    return Err(CatalogError::EmptyName { section: section.title.clone() });
                }
                if item.price.is_sign_negative() {
                    return Err(CatalogError::NegativePrice(item.name.clone()));
                }
                if !seen.insert(key.clone()) {
                    return Err(CatalogError::DuplicateItem(item.name.clone()));
                }

                candidates.push(Candidate { key, section: section_index, item: item_index });
                for alias in &item.aliases {
                    let alias_key = alias.trim().to_lowercase();
                    if !alias_key.is_empty() {
                        candidates.push(Candidate {
                            key: alias_key,
                            section: section_index,
                            item: item_index,
                        });
                    }
                }
            }
        }

        Ok(Self { sections, candidates, matcher: FuzzyMatcher::default() })
    }

    /// Parses `{ "<Section>": [ {name, price, aliases[]}, ... ], ... }`, keeping
    /// section order as written.
    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let document: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)?;
        let mut sections = Vec::with_capacity(document.len());

        for (title, value) in document {
            let category = MenuCategory::from_section_name(&title);
            let items = serde_json::from_value::<Vec<RawMenuItem>>(value)?
                .into_iter()
                .map(|raw| MenuItem {
                    name: raw.name.trim().to_string(),
                    price: raw.price,
                    category,
                    aliases: raw.aliases,
                })
                .collect();
            sections.push(MenuSection { title, category, items });
        }

        Self::new(sections)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| CatalogError::ReadFile { path: path.to_path_buf(), source })?;
        Self::from_json(&raw)
    }

    pub fn with_matcher(mut self, matcher: FuzzyMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn sections(&self) -> &[MenuSection] {
        &self.sections
    }

    pub fn items(&self) -> impl Iterator<Item = &MenuItem> {
        self.sections.iter().flat_map(|section| section.items.iter())
    }

    pub fn items_in(&self, category: MenuCategory) -> Vec<&MenuItem> {
        self.items().filter(|item| item.category == category).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Exact, case-insensitive lookup by canonical name.
    pub fn find(&self, name: &str) -> Option<&MenuItem> {
        let key = name.trim().to_lowercase();
        self.items().find(|item| item.name.to_lowercase() == key)
    }

    /// Resolves a free-text name to at most one menu item.
    pub fn resolve(&self, name: &str) -> Option<&MenuItem> {
        let found =
            self.matcher.best_match(name, self.candidates.iter().map(|c| c.key.as_str()))?;
        let candidate = self.candidates.iter().find(|c| c.key == found.candidate)?;
        self.sections.get(candidate.section)?.items.get(candidate.item)
    }

    /// Every item whose canonical name or any alias occurs verbatim in `text`,
    /// one entry per item, in menu order.
    pub fn mentioned_in(&self, text: &str) -> Vec<&MenuItem> {
        let haystack = text.to_lowercase();
        self.items()
            .filter(|item| {
                std::iter::once(&item.name)
                    .chain(item.aliases.iter())
                    .map(|term| term.trim().to_lowercase())
                    .any(|term| !term.is_empty() && haystack.contains(&term))
            })
            .collect()
    }
}
