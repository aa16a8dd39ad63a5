pub mod categories;
pub mod config;
pub mod models;
pub mod search;
pub mod store;

pub use categories::{CategoryDirectory, MainCategory, SubCategory, DEFAULT_CATEGORIES};
pub use config::{load_config, load_config_from_str, Config, ConfigError, SearchConfig};
pub use models::{Item, ItemFlags, ListedItem, NewItem, Statistic, User};
pub use search::{
    PaginationResult, QualityFilter, SearchEngine, SearchError, SearchRequest, Viewer,
};
pub use store::{ItemStore, SqliteStore, StoreError};
