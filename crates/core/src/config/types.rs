use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("filedex.db")
}

/// Search engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Maximum number of result pages a non-privileged viewer may request.
    /// 0 disables the ceiling. Owners viewing their own listing and admins
    /// always bypass it.
    #[serde(default)]
    pub max_pages: u32,
    /// Default results per page.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// Results per feed request.
    #[serde(default = "default_per_page")]
    pub feed_per_page: u32,
    /// How long total-count results are cached, in seconds. 0 disables
    /// the count cache.
    #[serde(default = "default_count_cache_ttl")]
    pub count_cache_ttl_secs: u64,
    /// Maximum number of cached counts.
    #[serde(default = "default_count_cache_capacity")]
    pub count_cache_capacity: usize,
    /// Whether the store supports full-text term matching. When false,
    /// term filtering is skipped and results are flagged accordingly.
    #[serde(default)]
    pub fulltext_search: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_pages: 0,
            per_page: default_per_page(),
            feed_per_page: default_per_page(),
            count_cache_ttl_secs: default_count_cache_ttl(),
            count_cache_capacity: default_count_cache_capacity(),
            fulltext_search: false,
        }
    }
}

fn default_per_page() -> u32 {
    75
}

fn default_count_cache_ttl() -> u64 {
    60
}

fn default_count_cache_capacity() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.database.path.to_str().unwrap(), "filedex.db");
        assert_eq!(config.search.max_pages, 0);
        assert_eq!(config.search.per_page, 75);
        assert_eq!(config.search.feed_per_page, 75);
        assert_eq!(config.search.count_cache_ttl_secs, 60);
        assert_eq!(config.search.count_cache_capacity, 256);
        assert!(!config.search.fulltext_search);
    }

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.search.per_page, 75);
    }

    #[test]
    fn test_deserialize_partial_search_section() {
        let toml = r#"
[search]
max_pages = 100
fulltext_search = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.search.max_pages, 100);
        assert!(config.search.fulltext_search);
        // Unspecified fields keep their defaults.
        assert_eq!(config.search.count_cache_ttl_secs, 60);
    }

    #[test]
    fn test_deserialize_with_custom_database_path() {
        let toml = r#"
[database]
path = "/data/my-db.sqlite"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.database.path.to_str().unwrap(), "/data/my-db.sqlite");
    }
}
