//! Result and error types for the search engine.

use serde::Serialize;
use thiserror::Error;

use crate::models::ListedItem;
use crate::store::StoreError;

/// Who is asking, for access-policy purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewer {
    /// Logged-in user id, if any.
    pub user_id: Option<i64>,
    /// Admins see everything and bypass the page ceiling.
    pub admin: bool,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn logged_in(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            admin: false,
        }
    }

    pub fn admin(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            admin: true,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.user_id.is_some()
    }
}

/// A stable page of search results. Read-only view: page geometry, the
/// (possibly clamped) total and the rows themselves.
#[derive(Debug, Clone, Serialize)]
pub struct PaginationResult {
    pub page: u32,
    pub per_page: u32,
    /// Total matching items. May be clamped to the configured page
    /// ceiling, and may be stale by up to the count-cache TTL.
    pub total: u64,
    /// Set when a search term was supplied but the full-text backend is
    /// unavailable, so term filtering was skipped rather than silently
    /// treated as "no matches".
    pub term_skipped: bool,
    pub items: Vec<ListedItem>,
}

impl PaginationResult {
    pub fn total_pages(&self) -> u64 {
        (self.total).div_ceil(self.per_page as u64)
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        (self.page as u64) < self.total_pages()
    }

    /// 1-based inclusive range of result positions on this page, for
    /// "Displaying results X-Y out of Z" rendering. `None` when the page
    /// is empty.
    pub fn result_range(&self) -> Option<(u64, u64)> {
        if self.items.is_empty() {
            return None;
        }
        let start = (self.page as u64 - 1) * self.per_page as u64 + 1;
        Some((start, start + self.items.len() as u64 - 1))
    }
}

/// Errors surfaced by the search engine.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Malformed or out-of-range input, rejected before any store access.
    #[error("invalid {field}: {reason}")]
    Validation {
        field: &'static str,
        reason: String,
    },

    /// A referenced owner/category does not exist, or the requested page
    /// lies beyond the available results.
    #[error("not found: {0}")]
    NotFound(String),

    /// Page beyond the configured maximum for this viewer. A policy
    /// rejection with an explanatory message, distinct from NotFound.
    #[error("page {page} exceeds the maximum of {max_pages} pages; please make your search query less broad")]
    CeilingExceeded { page: u32, max_pages: u32 },

    /// Store-level failure, propagated unmodified.
    #[error(transparent)]
    Store(#[from] StoreError),
}
