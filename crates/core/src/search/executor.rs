//! Query executor.
//!
//! Applies a validated [`SearchSpec`] against the store: assembles the
//! plan, resolves the index hint for joined sort columns, amortizes the
//! count query through the bounded TTL cache and assembles the pagination
//! result. Feeds take a fast path with no count query.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use super::cache::ShoddyLru;
use super::plan::{Filter, QueryPlan, SortKey};
use super::policy::visibility_filters;
use super::spec::SearchSpec;
use super::types::{PaginationResult, SearchError};
use crate::config::SearchConfig;
use crate::models::ListedItem;
use crate::store::{ItemStore, StoreError};

const STATISTICS_TABLE: &str = "statistics";

pub struct QueryExecutor {
    store: Arc<dyn ItemStore>,
    /// Memoizes total counts per fully-resolved query identity.
    count_cache: ShoddyLru<String, u64>,
    /// Zero disables count caching entirely.
    count_cache_ttl: Duration,
    /// Table -> (column -> single-column index name). Populated lazily on
    /// first use and never evicted: the schema is assumed static for the
    /// process lifetime, and the table is a handful of entries.
    index_names: Mutex<HashMap<String, HashMap<String, String>>>,
    fulltext: bool,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn ItemStore>, config: &SearchConfig) -> Self {
        let ttl = Duration::from_secs(config.count_cache_ttl_secs);
        Self {
            store,
            count_cache: ShoddyLru::new(config.count_cache_capacity, ttl.max(Duration::from_secs(1))),
            count_cache_ttl: ttl,
            index_names: Mutex::new(HashMap::new()),
            fulltext: config.fulltext_search,
        }
    }

    /// Execute a paginated search.
    pub fn execute(&self, spec: &SearchSpec) -> Result<PaginationResult, SearchError> {
        let (filters, term_skipped) = self.filters_for(spec);
        let plan = QueryPlan {
            filters,
            sort: spec.sort,
            direction: spec.direction,
            index_hint: self.index_hint(spec.sort)?,
            limit: spec.per_page,
            offset: (spec.page as u64 - 1) * spec.per_page as u64,
        };

        let mut total = self.count(&plan)?;
        let items = self.store.fetch_page(&plan)?;

        if spec.max_pages > 0 {
            total = total.min(spec.max_pages as u64 * spec.per_page as u64);
        }
        // The cached count can lag behind concurrent writes; never report
        // fewer results than the page we are actually returning.
        total = total.max(items.len() as u64);

        if items.is_empty() && spec.page != 1 {
            return Err(SearchError::NotFound(format!("page {}", spec.page)));
        }

        Ok(PaginationResult {
            page: spec.page,
            per_page: spec.per_page,
            total,
            term_skipped,
            items,
        })
    }

    /// Execute a feed listing: first `per_page` rows, no count query, no
    /// pagination wrapper.
    pub fn feed(&self, spec: &SearchSpec) -> Result<Vec<ListedItem>, SearchError> {
        let (filters, _) = self.filters_for(spec);
        let plan = QueryPlan {
            filters,
            sort: spec.sort,
            direction: spec.direction,
            index_hint: self.index_hint(spec.sort)?,
            limit: spec.per_page,
            offset: 0,
        };
        Ok(self.store.fetch_page(&plan)?)
    }

    /// Accumulate the plan's filter list: visibility, category, quality,
    /// then term tokens. Returns whether term filtering had to be skipped.
    fn filters_for(&self, spec: &SearchSpec) -> (Vec<Filter>, bool) {
        let mut filters = visibility_filters(spec);

        if spec.sub_category > 0 {
            filters.push(Filter::Category(spec.main_category, spec.sub_category));
        } else if spec.main_category > 0 {
            filters.push(Filter::MainCategory(spec.main_category));
        }

        if let Some(filter) = spec.quality.filter() {
            filters.push(filter);
        }

        let mut term_skipped = false;
        if !spec.tokens.is_empty() {
            if self.fulltext {
                for token in &spec.tokens {
                    filters.push(Filter::NameToken(token.clone()));
                }
            } else {
                // Quality/category filters above still apply; only the
                // term portion degrades.
                term_skipped = true;
                warn!("term filtering skipped: full-text backend unavailable");
            }
        }

        (filters, term_skipped)
    }

    /// Resolve the index hint for a joined sort column, introspecting the
    /// store's schema once per table.
    fn index_hint(&self, sort: SortKey) -> Result<Option<String>, StoreError> {
        let Some(column) = sort.statistic_column() else {
            return Ok(None);
        };

        {
            let cache = self.index_names.lock().unwrap();
            if let Some(table_indexes) = cache.get(STATISTICS_TABLE) {
                return Ok(table_indexes.get(column).cloned());
            }
        }

        // Introspect outside the lock; a racing request at worst repeats
        // the same lookup.
        let table_indexes = self.store.single_column_indexes(STATISTICS_TABLE)?;
        debug!(
            table = STATISTICS_TABLE,
            indexes = table_indexes.len(),
            "cached single-column index names"
        );

        let mut cache = self.index_names.lock().unwrap();
        let table_indexes = cache
            .entry(STATISTICS_TABLE.to_string())
            .or_insert(table_indexes);
        Ok(table_indexes.get(column).cloned())
    }

    /// Total count for a plan, through the cache when enabled.
    fn count(&self, plan: &QueryPlan) -> Result<u64, SearchError> {
        if self.count_cache_ttl.is_zero() {
            return Ok(self.store.count(plan)?);
        }

        let key = plan.count_key();
        if let Some(total) = self.count_cache.get(&key) {
            debug!(total, "count cache hit");
            return Ok(total);
        }

        let total = self.store.count(plan)?;
        self.count_cache.put(key, total, Some(self.count_cache_ttl));
        Ok(total)
    }
}
