//! Postgres persistence: schema, unit of work and per-entity repositories
//!
//! Repositories are stateless namespaces; every operation takes the
//! connection it runs on, so operations issued through one [`UnitOfWork`]
//! share its transaction and operations on different units of work do not.

mod chunks;
mod collections;
mod configurations;
mod documents;
mod packs;
mod permissions;
mod properties;
mod roles;
mod schema;
mod uow;

pub use chunks::{ChunkRepo, SearchParams, SearchRow};
pub use collections::CollectionRepo;
pub use configurations::ConfigurationRepo;
pub use documents::DocumentRepo;
pub use packs::{PackFilter, PackRepo};
pub use permissions::PermissionRepo;
pub use properties::{PropertyRepo, PropertySchemaItem};
pub use roles::RoleRepo;
pub use schema::initialize_schema;
pub use uow::{connect_pool, UnitOfWork};

use uuid::Uuid;

/// Default page size for listings
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Hard cap on page size accepted from clients
pub const MAX_PAGE_SIZE: i64 = 100;

/// Turn a `limit + 1` row fetch into a page and an optional next cursor.
///
/// The cursor is the id of the last returned row, present only when an extra
/// row proved another page exists.
pub(crate) fn paginate<T>(mut rows: Vec<T>, limit: i64, id_of: impl Fn(&T) -> Uuid) -> (Vec<T>, Option<Uuid>) {
    let limit = limit.max(0) as usize;
    if rows.len() > limit {
        rows.truncate(limit);
        let next = rows.last().map(id_of);
        (rows, next)
    } else {
        (rows, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_full_page_yields_cursor() {
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let (page, next) = paginate(ids.clone(), 3, |id| *id);
        assert_eq!(page, ids[..3]);
        assert_eq!(next, Some(ids[2]));
    }

    #[test]
    fn test_paginate_short_page_has_no_cursor() {
        let ids: Vec<Uuid> = (0..2).map(|_| Uuid::new_v4()).collect();
        let (page, next) = paginate(ids.clone(), 3, |id| *id);
        assert_eq!(page, ids);
        assert_eq!(next, None);
    }

    #[test]
    fn test_paginate_exact_limit_has_no_cursor() {
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let (_, next) = paginate(ids, 3, |id| *id);
        assert_eq!(next, None);
    }
}
