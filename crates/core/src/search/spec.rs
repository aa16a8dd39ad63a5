//! Query specification builder.
//!
//! Pure translation layer turning raw, user-supplied search parameters
//! into a validated [`SearchSpec`]. All rejection happens here, before any
//! page or count query runs against the store.

use std::sync::OnceLock;

use regex_lite::Regex;

use super::plan::{Filter, SortDirection, SortKey};
use super::types::{SearchError, Viewer};
use crate::categories::CategoryDirectory;
use crate::config::SearchConfig;
use crate::models::ItemFlags;
use crate::store::ItemStore;

/// Raw search parameters as they arrive from the caller (query-string
/// shaped: enumerated fields are still strings).
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Free-text term; tokenized shell-style.
    pub term: String,
    /// Restrict to one uploader's items (profile view).
    pub owner: Option<i64>,
    /// Category path `main_sub`, e.g. `"1_2"`; `"0_0"`, empty or absent
    /// means all categories.
    pub category: Option<String>,
    /// Quality filter selector: `"0"` none, `"1"` exclude remakes, `"2"`
    /// trusted only, `"3"` complete only.
    pub quality_filter: String,
    pub sort: String,
    pub order: String,
    pub page: u64,
    /// Page size override; falls back to the configured default.
    pub per_page: Option<u32>,
    pub viewer: Viewer,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            term: String::new(),
            owner: None,
            category: None,
            quality_filter: "0".to_string(),
            sort: "id".to_string(),
            order: "desc".to_string(),
            page: 1,
            per_page: None,
            viewer: Viewer::anonymous(),
        }
    }
}

/// Enumerated quality filters over the flag bitfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityFilter {
    None,
    NoRemakes,
    TrustedOnly,
    CompleteOnly,
}

impl QualityFilter {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "0" => Some(QualityFilter::None),
            "1" => Some(QualityFilter::NoRemakes),
            "2" => Some(QualityFilter::TrustedOnly),
            "3" => Some(QualityFilter::CompleteOnly),
            _ => None,
        }
    }

    /// The predicate this filter contributes, if any.
    pub fn filter(&self) -> Option<Filter> {
        match self {
            QualityFilter::None => None,
            QualityFilter::NoRemakes => Some(Filter::FlagsCleared(ItemFlags::REMAKE)),
            QualityFilter::TrustedOnly => Some(Filter::FlagsSet(ItemFlags::TRUSTED)),
            QualityFilter::CompleteOnly => Some(Filter::FlagsSet(ItemFlags::COMPLETE)),
        }
    }
}

/// Validated, normalized query intent. Engine-internal; never persisted.
#[derive(Debug, Clone)]
pub struct SearchSpec {
    pub tokens: Vec<String>,
    pub owner: Option<i64>,
    pub main_category: u32,
    pub sub_category: u32,
    pub quality: QualityFilter,
    pub sort: SortKey,
    pub direction: SortDirection,
    pub page: u32,
    pub per_page: u32,
    pub viewer: Viewer,
    pub feed: bool,
    /// Effective page ceiling for this request. 0 means none, either by
    /// configuration or because the viewer bypasses it (admin, or owner
    /// viewing their own listing).
    pub max_pages: u32,
}

fn category_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)_(\d+)$").unwrap())
}

/// Validate and normalize a raw request into a [`SearchSpec`].
///
/// Feeds force sort to `(id, desc)` and use the feed page size; this is a
/// documented caller-visible override, not an error.
pub fn build(
    req: &SearchRequest,
    feed: bool,
    store: &dyn ItemStore,
    categories: &CategoryDirectory,
    config: &SearchConfig,
) -> Result<SearchSpec, SearchError> {
    if req.page > u32::MAX as u64 {
        return Err(SearchError::NotFound(format!("page {}", req.page)));
    }
    let page = req.page as u32;
    if page == 0 {
        return Err(SearchError::Validation {
            field: "page",
            reason: "must be at least 1".to_string(),
        });
    }

    let mut sort = SortKey::parse(&req.sort).ok_or_else(|| SearchError::Validation {
        field: "sort",
        reason: format!("unknown sort key {:?}", req.sort),
    })?;
    let mut direction =
        SortDirection::parse(&req.order).ok_or_else(|| SearchError::Validation {
            field: "order",
            reason: format!("unknown sort order {:?}", req.order),
        })?;

    let quality =
        QualityFilter::parse(&req.quality_filter).ok_or_else(|| SearchError::Validation {
            field: "filter",
            reason: format!("unknown quality filter {:?}", req.quality_filter),
        })?;

    let owner = match req.owner {
        None => None,
        Some(user_id) => {
            let user = store
                .user_by_id(user_id)?
                .ok_or_else(|| SearchError::NotFound(format!("user {user_id}")))?;
            Some(user.id)
        }
    };

    let (main_category, sub_category) = parse_category(req.category.as_deref())?;
    if sub_category > 0 {
        categories
            .sub_by_ids(main_category, sub_category)
            .ok_or_else(|| {
                SearchError::NotFound(format!("category {main_category}_{sub_category}"))
            })?;
    } else if main_category > 0 {
        categories
            .main_by_id(main_category)
            .ok_or_else(|| SearchError::NotFound(format!("category {main_category}")))?;
    }

    // Owners viewing their own listing and admins bypass the ceiling.
    let same_user = owner.is_some() && req.viewer.user_id == owner;
    let max_pages = if same_user || req.viewer.admin {
        0
    } else {
        config.max_pages
    };
    if max_pages > 0 && page > max_pages {
        return Err(SearchError::CeilingExceeded { page, max_pages });
    }

    let per_page = if feed {
        config.feed_per_page
    } else {
        req.per_page.unwrap_or(config.per_page)
    };
    if per_page == 0 {
        return Err(SearchError::Validation {
            field: "per_page",
            reason: "must be at least 1".to_string(),
        });
    }

    // Feeds are always newest-first.
    if feed {
        sort = SortKey::Id;
        direction = SortDirection::Desc;
    }

    Ok(SearchSpec {
        tokens: tokenize(&req.term),
        owner,
        main_category,
        sub_category,
        quality,
        sort,
        direction,
        page,
        per_page,
        viewer: req.viewer,
        feed,
        max_pages,
    })
}

fn parse_category(raw: Option<&str>) -> Result<(u32, u32), SearchError> {
    let raw = match raw {
        None | Some("") => return Ok((0, 0)),
        Some(raw) => raw,
    };

    let invalid = || SearchError::Validation {
        field: "category",
        reason: format!("expected main_sub, got {raw:?}"),
    };

    let captures = category_regex().captures(raw).ok_or_else(invalid)?;
    let main: u32 = captures[1].parse().map_err(|_| invalid())?;
    let sub: u32 = captures[2].parse().map_err(|_| invalid())?;
    Ok((main, sub))
}

/// Split the term shell-style (quoted phrases stay together) and drop
/// tokens shorter than two characters. Unbalanced quotes degrade to plain
/// whitespace splitting rather than rejecting the term.
fn tokenize(term: &str) -> Vec<String> {
    let tokens = shell_words::split(term)
        .unwrap_or_else(|_| term.split_whitespace().map(str::to_string).collect());
    tokens
        .into_iter()
        .filter(|token| token.chars().count() >= 2)
        .collect()
}

/// Rebuild the canonical query parameters for a request, for pagination
/// links. Defaults are omitted.
pub fn query_params(req: &SearchRequest) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if !req.term.is_empty() {
        params.push(("q", req.term.clone()));
    }
    if let Some(category) = req.category.as_deref() {
        if !category.is_empty() && category != "0_0" {
            params.push(("c", category.to_string()));
        }
    }
    if req.quality_filter != "0" {
        params.push(("f", req.quality_filter.clone()));
    }
    if let Some(owner) = req.owner {
        params.push(("u", owner.to_string()));
    }
    params
}
