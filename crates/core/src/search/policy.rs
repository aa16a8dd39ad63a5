//! Access policy filter.
//!
//! Derives the visibility predicates to AND into a query from the viewer
//! context. The asymmetry is deliberate privacy design: owners see their
//! own hidden and anonymous items, other viewers never see another user's
//! anonymous items, and feeds always get the public view.

use super::plan::Filter;
use super::spec::SearchSpec;
use crate::models::ItemFlags;

/// Visibility predicates for a validated spec.
///
/// | Context                                             | Predicates                              |
/// |-----------------------------------------------------|-----------------------------------------|
/// | General view, admin                                 | none                                    |
/// | General view, logged in, not feed                   | not DELETED; not HIDDEN or own item     |
/// | General view, anonymous or feed                     | not DELETED; not HIDDEN                 |
/// | Owner view, admin                                   | none (owner filter only)                |
/// | Owner view, viewer == owner, not feed               | owner; not DELETED                      |
/// | Owner view, viewer != owner, or feed                | owner; not DELETED; not HIDDEN/ANONYMOUS|
pub fn visibility_filters(spec: &SearchSpec) -> Vec<Filter> {
    let mut filters = Vec::new();

    match spec.owner {
        // Owner-profile view.
        Some(owner) => {
            filters.push(Filter::UploaderIs(owner));

            if !spec.viewer.admin {
                filters.push(Filter::FlagsCleared(ItemFlags::DELETED));

                let same_user = spec.viewer.user_id == Some(owner);
                if !same_user || spec.feed {
                    filters.push(Filter::FlagsCleared(
                        ItemFlags::HIDDEN | ItemFlags::ANONYMOUS,
                    ));
                }
            }
        }
        // General view (homepage, general search).
        None => {
            if !spec.viewer.admin {
                filters.push(Filter::FlagsCleared(ItemFlags::DELETED));

                match spec.viewer.user_id {
                    Some(viewer_id) if !spec.feed => {
                        filters.push(Filter::FlagsClearedOrUploader(
                            ItemFlags::HIDDEN,
                            viewer_id,
                        ));
                    }
                    _ => filters.push(Filter::FlagsCleared(ItemFlags::HIDDEN)),
                }
            }
        }
    }

    filters
}
