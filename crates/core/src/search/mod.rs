//! Search/listing query engine.
//!
//! Translates raw search parameters into access-controlled, paginated
//! store queries: validation and normalization in [`spec`], visibility
//! predicates in [`policy`], typed plans in [`plan`], execution with index
//! hints and a count cache in [`executor`].

pub mod cache;
pub mod executor;
pub mod plan;
pub mod policy;
pub mod spec;
mod types;

pub use cache::ShoddyLru;
pub use executor::QueryExecutor;
pub use plan::{Filter, QueryPlan, SortDirection, SortKey};
pub use spec::{query_params, QualityFilter, SearchRequest, SearchSpec};
pub use types::{PaginationResult, SearchError, Viewer};

use std::sync::Arc;

use crate::categories::CategoryDirectory;
use crate::config::SearchConfig;
use crate::models::ListedItem;
use crate::store::ItemStore;

/// The search engine facade: owns the store handle, the category
/// directory and the executor with its caches.
pub struct SearchEngine {
    store: Arc<dyn ItemStore>,
    categories: CategoryDirectory,
    executor: QueryExecutor,
    config: SearchConfig,
}

impl SearchEngine {
    /// Build an engine over a store, loading the category directory once.
    pub fn new(store: Arc<dyn ItemStore>, config: SearchConfig) -> Result<Self, SearchError> {
        let categories = CategoryDirectory::load(&store)?;
        let executor = QueryExecutor::new(Arc::clone(&store), &config);
        Ok(Self {
            store,
            categories,
            executor,
            config,
        })
    }

    pub fn categories(&self) -> &CategoryDirectory {
        &self.categories
    }

    /// Run a paginated search. The sole browse entry point: validates the
    /// request, derives visibility predicates and executes page + count
    /// queries.
    pub fn search(&self, req: &SearchRequest) -> Result<PaginationResult, SearchError> {
        let spec = spec::build(req, false, self.store.as_ref(), &self.categories, &self.config)?;
        self.executor.execute(&spec)
    }

    /// Run a feed (syndication) listing: forced `(id, desc)` sort, fixed
    /// size, no pagination.
    pub fn feed(&self, req: &SearchRequest) -> Result<Vec<ListedItem>, SearchError> {
        let spec = spec::build(req, true, self.store.as_ref(), &self.categories, &self.config)?;
        self.executor.feed(&spec)
    }
}
