//! Typed query plans.
//!
//! A plan is an accumulated list of predicate operations plus sort and
//! window, executed once against the store. Plans with identical filters
//! and bound parameters render the same count key, so equivalent count
//! queries collide in the cache regardless of the order filters were
//! accumulated in.

use crate::models::ItemFlags;

/// A bound query parameter, kept store-agnostic.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Int(i64),
    Text(String),
}

/// A single filter predicate over the item relation.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `uploader_id = ?`
    UploaderIs(i64),
    /// `(flags & mask) = 0` - none of the masked flags set.
    FlagsCleared(ItemFlags),
    /// `(flags & mask) != 0` - at least one masked flag set.
    FlagsSet(ItemFlags),
    /// `(flags & mask) = 0 OR uploader_id = ?` - visible, or owned by the
    /// viewer.
    FlagsClearedOrUploader(ItemFlags, i64),
    /// `main_category_id = ?`
    MainCategory(u32),
    /// Exact `(main_category_id, sub_category_id)` match.
    Category(u32, u32),
    /// Binary match of one search token against the display-name
    /// projection.
    NameToken(String),
}

impl Filter {
    /// Render the predicate as a SQL fragment plus its bound parameters.
    pub fn sql(&self) -> (String, Vec<Param>) {
        match self {
            Filter::UploaderIs(user_id) => (
                "items.uploader_id = ?".to_string(),
                vec![Param::Int(*user_id)],
            ),
            Filter::FlagsCleared(mask) => (
                "(items.flags & ?) = 0".to_string(),
                vec![Param::Int(mask.bits() as i64)],
            ),
            Filter::FlagsSet(mask) => (
                "(items.flags & ?) != 0".to_string(),
                vec![Param::Int(mask.bits() as i64)],
            ),
            Filter::FlagsClearedOrUploader(mask, user_id) => (
                "((items.flags & ?) = 0 OR items.uploader_id = ?)".to_string(),
                vec![Param::Int(mask.bits() as i64), Param::Int(*user_id)],
            ),
            Filter::MainCategory(main_id) => (
                "items.main_category_id = ?".to_string(),
                vec![Param::Int(*main_id as i64)],
            ),
            Filter::Category(main_id, sub_id) => (
                "(items.main_category_id = ? AND items.sub_category_id = ?)".to_string(),
                vec![Param::Int(*main_id as i64), Param::Int(*sub_id as i64)],
            ),
            Filter::NameToken(token) => (
                "items.display_name LIKE ? ESCAPE '\\'".to_string(),
                vec![Param::Text(format!("%{}%", escape_like(token)))],
            ),
        }
    }
}

/// Escape LIKE wildcards in a user-supplied token.
fn escape_like(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    for c in token.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Enumerated sort keys. Keys on the joined statistics relation require a
/// join plus an index hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    Id,
    Size,
    Comments,
    Seeders,
    Leechers,
    Downloads,
}

impl SortKey {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "id" => Some(SortKey::Id),
            "size" => Some(SortKey::Size),
            "comments" => Some(SortKey::Comments),
            "seeders" => Some(SortKey::Seeders),
            "leechers" => Some(SortKey::Leechers),
            "downloads" => Some(SortKey::Downloads),
            _ => None,
        }
    }

    /// Fully-qualified sort column.
    pub fn column(&self) -> &'static str {
        match self {
            SortKey::Id => "items.id",
            SortKey::Size => "items.filesize",
            SortKey::Comments => "items.comment_count",
            SortKey::Seeders => "statistics.seed_count",
            SortKey::Leechers => "statistics.leech_count",
            SortKey::Downloads => "statistics.download_count",
        }
    }

    /// Bare column name on the statistics relation, if the key lives there.
    pub fn statistic_column(&self) -> Option<&'static str> {
        match self {
            SortKey::Seeders => Some("seed_count"),
            SortKey::Leechers => Some("leech_count"),
            SortKey::Downloads => Some("download_count"),
            _ => None,
        }
    }

    /// Whether sorting on this key requires the statistics join.
    pub fn is_joined(&self) -> bool {
        self.statistic_column().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "asc" => Some(SortDirection::Asc),
            "desc" => Some(SortDirection::Desc),
            _ => None,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// An executable query plan: filters, sort, window and an optional index
/// hint for the joined sort column.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub filters: Vec<Filter>,
    pub sort: SortKey,
    pub direction: SortDirection,
    /// Planner hint naming the single-column index backing a joined sort
    /// column, when one was found by schema introspection.
    pub index_hint: Option<String>,
    pub limit: u32,
    pub offset: u64,
}

impl QueryPlan {
    /// Render the combined WHERE clause. Returns `None` when no filters
    /// apply.
    pub fn where_clause(&self) -> Option<(String, Vec<Param>)> {
        if self.filters.is_empty() {
            return None;
        }
        let mut fragments = Vec::with_capacity(self.filters.len());
        let mut params = Vec::new();
        for filter in &self.filters {
            let (fragment, mut bound) = filter.sql();
            fragments.push(fragment);
            params.append(&mut bound);
        }
        Some((fragments.join(" AND "), params))
    }

    /// ORDER BY terms. Non-id sort keys get the item id as a tie-break in
    /// the same direction, so ties are deterministic across calls.
    pub fn order_terms(&self) -> Vec<String> {
        let primary = format!("{} {}", self.sort.column(), self.direction.sql());
        if self.sort == SortKey::Id {
            vec![primary]
        } else {
            vec![primary, format!("items.id {}", self.direction.sql())]
        }
    }

    /// Cache key identifying the count query for this plan: every rendered
    /// predicate with its bound parameters, order-normalized so that
    /// equivalent filter sets produce the same key.
    pub fn count_key(&self) -> String {
        let mut parts: Vec<String> = self
            .filters
            .iter()
            .map(|filter| {
                let (fragment, params) = filter.sql();
                let rendered: Vec<String> = params
                    .iter()
                    .map(|p| match p {
                        Param::Int(i) => i.to_string(),
                        Param::Text(t) => format!("'{t}'"),
                    })
                    .collect();
                format!("{}[{}]", fragment, rendered.join(","))
            })
            .collect();
        parts.sort();
        parts.join("|")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(filters: Vec<Filter>) -> QueryPlan {
        QueryPlan {
            filters,
            sort: SortKey::Id,
            direction: SortDirection::Desc,
            index_hint: None,
            limit: 75,
            offset: 0,
        }
    }

    #[test]
    fn test_filter_sql_fragments() {
        let (sql, params) = Filter::UploaderIs(7).sql();
        assert_eq!(sql, "items.uploader_id = ?");
        assert_eq!(params, vec![Param::Int(7)]);

        let (sql, params) = Filter::FlagsCleared(ItemFlags::DELETED).sql();
        assert_eq!(sql, "(items.flags & ?) = 0");
        assert_eq!(params, vec![Param::Int(32)]);

        let (sql, params) =
            Filter::FlagsClearedOrUploader(ItemFlags::HIDDEN, 3).sql();
        assert_eq!(sql, "((items.flags & ?) = 0 OR items.uploader_id = ?)");
        assert_eq!(params, vec![Param::Int(2), Param::Int(3)]);

        let (sql, params) = Filter::Category(5, 3).sql();
        assert_eq!(
            sql,
            "(items.main_category_id = ? AND items.sub_category_id = ?)"
        );
        assert_eq!(params, vec![Param::Int(5), Param::Int(3)]);
    }

    #[test]
    fn test_name_token_escapes_wildcards() {
        let (_, params) = Filter::NameToken("50%_off\\now".to_string()).sql();
        assert_eq!(
            params,
            vec![Param::Text("%50\\%\\_off\\\\now%".to_string())]
        );
    }

    #[test]
    fn test_sort_key_parse() {
        assert_eq!(SortKey::parse("id"), Some(SortKey::Id));
        assert_eq!(SortKey::parse("SEEDERS"), Some(SortKey::Seeders));
        assert_eq!(SortKey::parse("name"), None);
        assert_eq!(SortKey::parse(""), None);
    }

    #[test]
    fn test_sort_key_join() {
        assert!(!SortKey::Id.is_joined());
        assert!(!SortKey::Size.is_joined());
        assert!(!SortKey::Comments.is_joined());
        assert!(SortKey::Seeders.is_joined());
        assert_eq!(SortKey::Leechers.statistic_column(), Some("leech_count"));
    }

    #[test]
    fn test_where_clause_empty() {
        assert!(plan(vec![]).where_clause().is_none());
    }

    #[test]
    fn test_where_clause_joins_with_and() {
        let p = plan(vec![
            Filter::FlagsCleared(ItemFlags::DELETED),
            Filter::MainCategory(2),
        ]);
        let (sql, params) = p.where_clause().unwrap();
        assert_eq!(sql, "(items.flags & ?) = 0 AND items.main_category_id = ?");
        assert_eq!(params, vec![Param::Int(32), Param::Int(2)]);
    }

    #[test]
    fn test_order_terms_tie_break() {
        let mut p = plan(vec![]);
        assert_eq!(p.order_terms(), vec!["items.id DESC"]);

        p.sort = SortKey::Seeders;
        assert_eq!(
            p.order_terms(),
            vec!["statistics.seed_count DESC", "items.id DESC"]
        );

        p.direction = SortDirection::Asc;
        p.sort = SortKey::Size;
        assert_eq!(p.order_terms(), vec!["items.filesize ASC", "items.id ASC"]);
    }

    #[test]
    fn test_count_key_is_order_normalized() {
        let a = plan(vec![
            Filter::MainCategory(2),
            Filter::FlagsCleared(ItemFlags::DELETED),
        ]);
        let b = plan(vec![
            Filter::FlagsCleared(ItemFlags::DELETED),
            Filter::MainCategory(2),
        ]);
        assert_eq!(a.count_key(), b.count_key());

        let c = plan(vec![
            Filter::FlagsCleared(ItemFlags::DELETED),
            Filter::MainCategory(3),
        ]);
        assert_ne!(a.count_key(), c.count_key());
    }
}
