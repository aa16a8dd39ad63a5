//! Core data model for the catalog: items, per-item transfer statistics
//! and the users that upload items.
//!
//! Items are never physically deleted - moderation sets the `DELETED` flag
//! and the search layer treats it as a filterable state.

mod types;

pub use types::*;
