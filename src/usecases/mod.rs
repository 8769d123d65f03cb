//! Application services
//!
//! Each service authorizes the caller first, then runs all repository work
//! inside one unit of work. The chunker, embedding provider and permission
//! checker are injected so the pipelines stay testable.

mod collections;
mod configurations;
mod documents;
mod permissions;
mod properties;
mod search;

pub use collections::CollectionService;
pub use configurations::{ConfigurationService, NewConfiguration};
pub use documents::{DocumentService, IngestDocument, IngestProperty};
pub use permissions::PermissionService;
pub use properties::{property_key_label, PropertySchemaService};
pub use search::{
    SearchHit, SearchRequest, SearchService, DEFAULT_FTS_WEIGHT, DEFAULT_SEARCH_LIMIT,
    DEFAULT_VECTOR_WEIGHT,
};
