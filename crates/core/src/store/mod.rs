//! Persistent item store.
//!
//! The search engine consumes the store through the [`ItemStore`] trait: a
//! query-builder capability (run a typed plan as a page query or a scalar
//! count), reference lookups and schema introspection for index hints.
//! Write operations used by the upload/moderation/tracker-sync
//! collaborators live on the concrete [`SqliteStore`].

mod sqlite;

pub use sqlite::SqliteStore;

use std::collections::HashMap;

use thiserror::Error;

use crate::categories::{MainCategory, SubCategory};
use crate::models::{ListedItem, User};
use crate::search::plan::QueryPlan;

/// Errors for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Read capability consumed by the search engine.
pub trait ItemStore: Send + Sync {
    /// Execute the plan's page query: filters, join, order, limit/offset.
    /// Rows come back with their statistics joined.
    fn fetch_page(&self, plan: &QueryPlan) -> Result<Vec<ListedItem>, StoreError>;

    /// Execute the plan's scalar count query (filters only).
    fn count(&self, plan: &QueryPlan) -> Result<u64, StoreError>;

    /// Look up a user by id.
    fn user_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;

    /// Load the full category hierarchy.
    fn load_categories(&self) -> Result<(Vec<MainCategory>, Vec<SubCategory>), StoreError>;

    /// Introspect single-column indexes on a table, as a column -> index
    /// name map. Multi-column indexes are ignored. An unknown table yields
    /// an empty map.
    fn single_column_indexes(&self, table: &str) -> Result<HashMap<String, String>, StoreError>;
}
