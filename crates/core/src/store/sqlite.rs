//! SQLite-backed item store implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::ToSqlOutput;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};
use tracing::info;

use super::{ItemStore, StoreError};
use crate::categories::{MainCategory, SubCategory};
use crate::models::{unpack_ip, pack_ip, Item, ItemFlags, ListedItem, NewItem, Statistic, User};
use crate::search::plan::{Param, QueryPlan};

impl ToSql for Param {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Param::Int(i) => Ok(ToSqlOutput::from(*i)),
            Param::Text(t) => Ok(ToSqlOutput::from(t.as_str())),
        }
    }
}

/// SQLite-backed item store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and initialize the schema.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                admin INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS main_categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL
            );

            -- Sub category ids are scoped per main category, hence the
            -- composite key.
            CREATE TABLE IF NOT EXISTS sub_categories (
                main_category_id INTEGER NOT NULL REFERENCES main_categories(id),
                id INTEGER NOT NULL,
                name TEXT NOT NULL,
                PRIMARY KEY (main_category_id, id)
            );

            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                display_name TEXT NOT NULL,
                uploader_id INTEGER REFERENCES users(id),
                uploader_ip BLOB,
                filesize INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                flags INTEGER NOT NULL DEFAULT 0,
                main_category_id INTEGER NOT NULL,
                sub_category_id INTEGER NOT NULL,
                comment_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS ix_items_display_name ON items(display_name);
            CREATE INDEX IF NOT EXISTS ix_items_uploader_id ON items(uploader_id);
            CREATE INDEX IF NOT EXISTS ix_items_main_category_id ON items(main_category_id);

            -- Counters updated by the tracker-sync collaborator; one row
            -- per item. The single-column indexes back the sort hints.
            CREATE TABLE IF NOT EXISTS statistics (
                item_id INTEGER PRIMARY KEY REFERENCES items(id) ON DELETE CASCADE,
                seed_count INTEGER NOT NULL DEFAULT 0,
                leech_count INTEGER NOT NULL DEFAULT 0,
                download_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS ix_statistics_seed_count ON statistics(seed_count);
            CREATE INDEX IF NOT EXISTS ix_statistics_leech_count ON statistics(leech_count);
            CREATE INDEX IF NOT EXISTS ix_statistics_download_count ON statistics(download_count);
            "#,
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    /// Create a user, returning its id.
    pub fn create_user(&self, username: &str, admin: bool) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO users (username, admin) VALUES (?, ?)",
            params![username, admin],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(conn.last_insert_rowid())
    }

    /// Create an item with a zeroed statistics row, returning the item id.
    pub fn create_item(&self, item: &NewItem) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let now_str = Utc::now().to_rfc3339();
        let packed_ip = item.uploader_ip.map(pack_ip);

        conn.execute(
            "INSERT INTO items (display_name, uploader_id, uploader_ip, filesize,
                                created_at, flags, main_category_id, sub_category_id,
                                comment_count)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)",
            params![
                &item.display_name,
                item.uploader_id,
                packed_ip,
                item.filesize,
                &now_str,
                item.flags.bits(),
                item.main_category_id,
                item.sub_category_id,
            ],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        let item_id = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO statistics (item_id) VALUES (?)",
            params![item_id],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(item_id)
    }

    /// Replace an item's flag bitfield (moderation actions).
    pub fn update_flags(&self, item_id: i64, flags: ItemFlags) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn
            .execute(
                "UPDATE items SET flags = ? WHERE id = ?",
                params![flags.bits(), item_id],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if affected == 0 {
            return Err(StoreError::NotFound(format!("item {item_id}")));
        }
        Ok(())
    }

    /// Overwrite an item's transfer counters (tracker sync).
    pub fn record_stats(&self, item_id: i64, stats: Statistic) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn
            .execute(
                "UPDATE statistics SET seed_count = ?, leech_count = ?, download_count = ?
                 WHERE item_id = ?",
                params![
                    stats.seed_count,
                    stats.leech_count,
                    stats.download_count,
                    item_id
                ],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if affected == 0 {
            return Err(StoreError::NotFound(format!("item {item_id}")));
        }
        Ok(())
    }

    /// Adjust the denormalized comment count, clamped at zero.
    pub fn adjust_comment_count(&self, item_id: i64, delta: i32) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn
            .execute(
                "UPDATE items SET comment_count = MAX(comment_count + ?, 0) WHERE id = ?",
                params![delta, item_id],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if affected == 0 {
            return Err(StoreError::NotFound(format!("item {item_id}")));
        }
        Ok(())
    }

    /// Fetch a single item with its statistics.
    pub fn item_by_id(&self, item_id: i64) -> Result<Option<ListedItem>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("{ITEM_COLUMNS} FROM items JOIN statistics ON statistics.item_id = items.id WHERE items.id = ?"),
            params![item_id],
            Self::row_to_listed_item,
        )
        .optional()
        .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Insert the category tree if the directory is empty. Sub category
    /// ids are assigned manually (1-indexed) since composite keys can't
    /// autoincrement. Returns whether anything was inserted.
    pub fn seed_categories(&self, categories: &[(&str, &[&str])]) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let existing: u64 = conn
            .query_row("SELECT COUNT(*) FROM main_categories", [], |row| row.get(0))
            .map_err(|e| StoreError::Database(e.to_string()))?;
        if existing > 0 {
            return Ok(false);
        }

        for (main_name, sub_names) in categories {
            conn.execute(
                "INSERT INTO main_categories (name) VALUES (?)",
                params![main_name],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;
            let main_id = conn.last_insert_rowid();

            for (i, sub_name) in sub_names.iter().enumerate() {
                conn.execute(
                    "INSERT INTO sub_categories (main_category_id, id, name) VALUES (?, ?, ?)",
                    params![main_id, i as i64 + 1, sub_name],
                )
                .map_err(|e| StoreError::Database(e.to_string()))?;
            }
        }

        info!(main_categories = categories.len(), "seeded category tree");
        Ok(true)
    }

    fn row_to_listed_item(row: &rusqlite::Row) -> rusqlite::Result<ListedItem> {
        let created_at_str: String = row.get(5)?;
        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let packed_ip: Option<Vec<u8>> = row.get(3)?;
        let flags_bits: u32 = row.get(6)?;

        Ok(ListedItem {
            item: Item {
                id: row.get(0)?,
                display_name: row.get(1)?,
                uploader_id: row.get(2)?,
                uploader_ip: packed_ip.as_deref().and_then(unpack_ip),
                filesize: row.get(4)?,
                created_at,
                flags: ItemFlags::from_bits_truncate(flags_bits),
                main_category_id: row.get(7)?,
                sub_category_id: row.get(8)?,
                comment_count: row.get(9)?,
            },
            stats: Statistic {
                seed_count: row.get(10)?,
                leech_count: row.get(11)?,
                download_count: row.get(12)?,
            },
        })
    }
}

const ITEM_COLUMNS: &str = "SELECT items.id, items.display_name, items.uploader_id, \
     items.uploader_ip, items.filesize, items.created_at, items.flags, \
     items.main_category_id, items.sub_category_id, items.comment_count, \
     statistics.seed_count, statistics.leech_count, statistics.download_count";

/// Identifiers interpolated into SQL (index and table names) are not
/// bindable, so restrict them to a safe character set.
fn safe_identifier(name: &str) -> Result<&str, StoreError> {
    if !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Ok(name)
    } else {
        Err(StoreError::Database(format!("invalid identifier: {name}")))
    }
}

impl ItemStore for SqliteStore {
    fn fetch_page(&self, plan: &QueryPlan) -> Result<Vec<ListedItem>, StoreError> {
        let mut sql = format!("{ITEM_COLUMNS} FROM items JOIN statistics");
        if let Some(hint) = &plan.index_hint {
            sql.push_str(" INDEXED BY ");
            sql.push_str(safe_identifier(hint)?);
        }
        sql.push_str(" ON statistics.item_id = items.id");

        let mut bound = Vec::new();
        if let Some((where_sql, params)) = plan.where_clause() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
            bound = params;
        }

        sql.push_str(" ORDER BY ");
        sql.push_str(&plan.order_terms().join(", "));
        sql.push_str(" LIMIT ? OFFSET ?");
        bound.push(Param::Int(plan.limit as i64));
        bound.push(Param::Int(plan.offset as i64));

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params_from_iter(bound.iter()), Self::row_to_listed_item)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row.map_err(|e| StoreError::Database(e.to_string()))?);
        }
        Ok(items)
    }

    fn count(&self, plan: &QueryPlan) -> Result<u64, StoreError> {
        let mut sql = String::from("SELECT COUNT(*) FROM items");
        let mut bound = Vec::new();
        if let Some((where_sql, params)) = plan.where_clause() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
            bound = params;
        }

        let conn = self.conn.lock().unwrap();
        conn.query_row(&sql, params_from_iter(bound.iter()), |row| row.get(0))
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, username, admin FROM users WHERE id = ?",
            params![id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    admin: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn load_categories(&self) -> Result<(Vec<MainCategory>, Vec<SubCategory>), StoreError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare("SELECT id, name FROM main_categories ORDER BY id")
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let main_rows = stmt
            .query_map([], |row| {
                Ok(MainCategory {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let mut mains = Vec::new();
        for row in main_rows {
            mains.push(row.map_err(|e| StoreError::Database(e.to_string()))?);
        }

        let mut stmt = conn
            .prepare(
                "SELECT id, main_category_id, name FROM sub_categories
                 ORDER BY main_category_id, id",
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let sub_rows = stmt
            .query_map([], |row| {
                Ok(SubCategory {
                    id: row.get(0)?,
                    main_category_id: row.get(1)?,
                    name: row.get(2)?,
                })
            })
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let mut subs = Vec::new();
        for row in sub_rows {
            subs.push(row.map_err(|e| StoreError::Database(e.to_string()))?);
        }

        Ok((mains, subs))
    }

    fn single_column_indexes(&self, table: &str) -> Result<HashMap<String, String>, StoreError> {
        let table = safe_identifier(table)?;
        let conn = self.conn.lock().unwrap();

        // An unknown table yields no rows here, matching the trait contract.
        let mut stmt = conn
            .prepare(&format!("PRAGMA index_list({table})"))
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let name_rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let mut index_names = Vec::new();
        for row in name_rows {
            index_names.push(row.map_err(|e| StoreError::Database(e.to_string()))?);
        }

        let mut indexes = HashMap::new();
        for index_name in index_names {
            // Skip the implicit indexes SQLite creates for PRIMARY KEY and
            // UNIQUE constraints.
            if index_name.starts_with("sqlite_autoindex") {
                continue;
            }

            let mut stmt = conn
                .prepare(&format!("PRAGMA index_info({index_name})"))
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let column_rows = stmt
                .query_map([], |row| row.get::<_, Option<String>>(2))
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let mut columns = Vec::new();
            for row in column_rows {
                columns.push(row.map_err(|e| StoreError::Database(e.to_string()))?);
            }

            // Only single-column indexes qualify as hint targets.
            if let [Some(column)] = columns.as_slice() {
                indexes.insert(column.clone(), index_name);
            }
        }

        Ok(indexes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::DEFAULT_CATEGORIES;
    use crate::search::plan::{Filter, SortDirection, SortKey};

    fn create_test_store() -> SqliteStore {
        SqliteStore::in_memory().unwrap()
    }

    fn new_item(name: &str, uploader: Option<i64>) -> NewItem {
        NewItem {
            display_name: name.to_string(),
            uploader_id: uploader,
            uploader_ip: Some("10.0.0.1".parse().unwrap()),
            filesize: 1024,
            flags: ItemFlags::empty(),
            main_category_id: 1,
            sub_category_id: 2,
        }
    }

    fn plain_plan() -> QueryPlan {
        QueryPlan {
            filters: Vec::new(),
            sort: SortKey::Id,
            direction: SortDirection::Desc,
            index_hint: None,
            limit: 75,
            offset: 0,
        }
    }

    #[test]
    fn test_create_and_fetch_item() {
        let store = create_test_store();
        let user_id = store.create_user("alice", false).unwrap();
        let item_id = store.create_item(&new_item("Test Upload", Some(user_id))).unwrap();

        let listed = store.item_by_id(item_id).unwrap().unwrap();
        assert_eq!(listed.item.display_name, "Test Upload");
        assert_eq!(listed.item.uploader_id, Some(user_id));
        assert_eq!(
            listed.item.uploader_ip,
            Some("10.0.0.1".parse().unwrap())
        );
        assert_eq!(listed.stats.seed_count, 0);
    }

    #[test]
    fn test_item_by_id_missing() {
        let store = create_test_store();
        assert!(store.item_by_id(42).unwrap().is_none());
    }

    #[test]
    fn test_update_flags() {
        let store = create_test_store();
        let item_id = store.create_item(&new_item("x", None)).unwrap();

        store
            .update_flags(item_id, ItemFlags::TRUSTED | ItemFlags::HIDDEN)
            .unwrap();
        let listed = store.item_by_id(item_id).unwrap().unwrap();
        assert_eq!(listed.item.flags, ItemFlags::TRUSTED | ItemFlags::HIDDEN);

        let result = store.update_flags(999, ItemFlags::DELETED);
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_record_stats() {
        let store = create_test_store();
        let item_id = store.create_item(&new_item("x", None)).unwrap();

        store
            .record_stats(
                item_id,
                Statistic {
                    seed_count: 12,
                    leech_count: 3,
                    download_count: 400,
                },
            )
            .unwrap();

        let listed = store.item_by_id(item_id).unwrap().unwrap();
        assert_eq!(listed.stats.seed_count, 12);
        assert_eq!(listed.stats.download_count, 400);

        let result = store.record_stats(999, Statistic::default());
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_adjust_comment_count_clamps_at_zero() {
        let store = create_test_store();
        let item_id = store.create_item(&new_item("x", None)).unwrap();

        store.adjust_comment_count(item_id, 2).unwrap();
        store.adjust_comment_count(item_id, -5).unwrap();

        let listed = store.item_by_id(item_id).unwrap().unwrap();
        assert_eq!(listed.item.comment_count, 0);
    }

    #[test]
    fn test_user_by_id() {
        let store = create_test_store();
        let id = store.create_user("bob", true).unwrap();

        let user = store.user_by_id(id).unwrap().unwrap();
        assert_eq!(user.username, "bob");
        assert!(user.admin);

        assert!(store.user_by_id(id + 1).unwrap().is_none());
    }

    #[test]
    fn test_seed_categories_once() {
        let store = create_test_store();
        assert!(store.seed_categories(DEFAULT_CATEGORIES).unwrap());
        // Second call is a no-op.
        assert!(!store.seed_categories(DEFAULT_CATEGORIES).unwrap());

        let (mains, subs) = store.load_categories().unwrap();
        assert_eq!(mains.len(), 6);
        assert_eq!(mains[0].name, "Anime");
        assert_eq!(subs.iter().filter(|s| s.main_category_id == 1).count(), 4);
        // Sub ids are 1-indexed within their main category.
        assert_eq!(subs[0].id, 1);
    }

    #[test]
    fn test_fetch_page_filters_and_orders() {
        let store = create_test_store();
        for i in 0..5 {
            let mut item = new_item(&format!("item {i}"), None);
            item.main_category_id = if i < 3 { 1 } else { 2 };
            store.create_item(&item).unwrap();
        }

        let mut plan = plain_plan();
        plan.filters.push(Filter::MainCategory(1));
        let page = store.fetch_page(&plan).unwrap();

        assert_eq!(page.len(), 3);
        let ids: Vec<i64> = page.iter().map(|l| l.item.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_fetch_page_window() {
        let store = create_test_store();
        for i in 0..10 {
            store.create_item(&new_item(&format!("item {i}"), None)).unwrap();
        }

        let mut plan = plain_plan();
        plan.limit = 3;
        plan.offset = 4;
        let page = store.fetch_page(&plan).unwrap();

        let ids: Vec<i64> = page.iter().map(|l| l.item.id).collect();
        assert_eq!(ids, vec![6, 5, 4]);
    }

    #[test]
    fn test_fetch_page_with_index_hint() {
        let store = create_test_store();
        for i in 0..4 {
            let id = store.create_item(&new_item(&format!("item {i}"), None)).unwrap();
            store
                .record_stats(
                    id,
                    Statistic {
                        seed_count: (i * 10) as u32,
                        ..Default::default()
                    },
                )
                .unwrap();
        }

        let mut plan = plain_plan();
        plan.sort = SortKey::Seeders;
        plan.direction = SortDirection::Asc;
        plan.index_hint = Some("ix_statistics_seed_count".to_string());
        let page = store.fetch_page(&plan).unwrap();

        let seeds: Vec<u32> = page.iter().map(|l| l.stats.seed_count).collect();
        assert_eq!(seeds, vec![0, 10, 20, 30]);
    }

    #[test]
    fn test_fetch_page_rejects_bad_hint() {
        let store = create_test_store();
        let mut plan = plain_plan();
        plan.index_hint = Some("bad name; DROP TABLE items".to_string());
        assert!(store.fetch_page(&plan).is_err());
    }

    #[test]
    fn test_count_ignores_window() {
        let store = create_test_store();
        for i in 0..7 {
            store.create_item(&new_item(&format!("item {i}"), None)).unwrap();
        }

        let mut plan = plain_plan();
        plan.limit = 2;
        assert_eq!(store.count(&plan).unwrap(), 7);
    }

    #[test]
    fn test_count_with_flag_filter() {
        let store = create_test_store();
        let a = store.create_item(&new_item("a", None)).unwrap();
        store.create_item(&new_item("b", None)).unwrap();
        store.update_flags(a, ItemFlags::DELETED).unwrap();

        let mut plan = plain_plan();
        plan.filters.push(Filter::FlagsCleared(ItemFlags::DELETED));
        assert_eq!(store.count(&plan).unwrap(), 1);
    }

    #[test]
    fn test_single_column_indexes() {
        let store = create_test_store();
        let indexes = store.single_column_indexes("statistics").unwrap();

        assert_eq!(
            indexes.get("seed_count").map(String::as_str),
            Some("ix_statistics_seed_count")
        );
        assert_eq!(
            indexes.get("leech_count").map(String::as_str),
            Some("ix_statistics_leech_count")
        );
        assert_eq!(
            indexes.get("download_count").map(String::as_str),
            Some("ix_statistics_download_count")
        );
    }

    #[test]
    fn test_single_column_indexes_unknown_table() {
        let store = create_test_store();
        let indexes = store.single_column_indexes("nonexistent").unwrap();
        assert!(indexes.is_empty());
    }

    #[test]
    fn test_single_column_indexes_rejects_bad_identifier() {
        let store = create_test_store();
        assert!(store.single_column_indexes("items; DROP TABLE items").is_err());
    }
}
