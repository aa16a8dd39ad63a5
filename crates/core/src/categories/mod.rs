//! Category directory - the two-level immutable category hierarchy.
//!
//! Loaded once from the store and kept in memory; backs validation of the
//! `main_sub` category filter and label rendering for listings.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::{ItemStore, StoreError};

/// A top-level category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainCategory {
    pub id: u32,
    pub name: String,
}

/// A sub category. Ids are scoped per main category, so a reference is
/// always the `(main_category_id, id)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubCategory {
    pub id: u32,
    pub main_category_id: u32,
    pub name: String,
}

/// Default category tree, used when initializing an empty store.
pub const DEFAULT_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Anime",
        &[
            "Anime Music Video",
            "English-translated",
            "Non-English-translated",
            "Raw",
        ],
    ),
    ("Audio", &["Lossless", "Lossy"]),
    (
        "Literature",
        &["English-translated", "Non-English-translated", "Raw"],
    ),
    (
        "Live Action",
        &[
            "English-translated",
            "Idol/Promotional Video",
            "Non-English-translated",
            "Raw",
        ],
    ),
    ("Pictures", &["Graphics", "Photos"]),
    ("Software", &["Applications", "Games"]),
];

/// Read-only lookup over the category hierarchy.
pub struct CategoryDirectory {
    mains: BTreeMap<u32, MainCategory>,
    subs: BTreeMap<(u32, u32), SubCategory>,
}

impl CategoryDirectory {
    /// Build a directory from already-materialized rows.
    pub fn new(mains: Vec<MainCategory>, subs: Vec<SubCategory>) -> Self {
        let mains = mains.into_iter().map(|m| (m.id, m)).collect();
        let subs = subs
            .into_iter()
            .map(|s| ((s.main_category_id, s.id), s))
            .collect();
        Self { mains, subs }
    }

    /// Load the directory from the store.
    pub fn load(store: &Arc<dyn ItemStore>) -> Result<Self, StoreError> {
        let (mains, subs) = store.load_categories()?;
        info!(
            main_categories = mains.len(),
            sub_categories = subs.len(),
            "loaded category directory"
        );
        Ok(Self::new(mains, subs))
    }

    pub fn main_by_id(&self, id: u32) -> Option<&MainCategory> {
        self.mains.get(&id)
    }

    pub fn sub_by_ids(&self, main_id: u32, sub_id: u32) -> Option<&SubCategory> {
        self.subs.get(&(main_id, sub_id))
    }

    /// All main categories in id order.
    pub fn mains(&self) -> impl Iterator<Item = &MainCategory> {
        self.mains.values()
    }

    /// Sub categories of a main category, in id order.
    pub fn subs_of(&self, main_id: u32) -> impl Iterator<Item = &SubCategory> {
        self.subs
            .range((main_id, 0)..(main_id, u32::MAX))
            .map(|(_, s)| s)
    }

    /// Human-readable label chain, e.g. `Anime - English-translated`.
    /// Returns the main category name alone when `sub_id` is 0.
    pub fn label(&self, main_id: u32, sub_id: u32) -> Option<String> {
        let main = self.main_by_id(main_id)?;
        if sub_id == 0 {
            return Some(main.name.clone());
        }
        let sub = self.sub_by_ids(main_id, sub_id)?;
        Some(format!("{} - {}", main.name, sub.name))
    }
}
