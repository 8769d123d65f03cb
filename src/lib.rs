//! RagStore: multi-tenant RAG indexing and search service
//!
//! A retrieval service that integrates:
//! - Deduplicating document ingestion (chunk, embed, persist)
//! - Hybrid retrieval combining pgvector cosine similarity and Postgres full-text rank
//! - Collection migration (re-chunk and re-embed under a new configuration)
//! - Role-based access control with per-collection permissions
//!
//! # Example
//!
//! ```rust,no_run
//! use ragstore::api::{start_server, AppState};
//! use ragstore::config::Settings;
//! use ragstore::store::connect_pool;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::from_env()?;
//!     let pool = connect_pool(&settings).await?;
//!     let state = AppState::new(settings.clone(), pool);
//!     start_server(state, &settings.server_host, settings.server_port).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod chunker;
pub mod config;
pub mod domain;
pub mod embedding;
pub mod error;
pub mod parser;
pub mod rbac;
pub mod store;
pub mod usecases;

// Re-export main types
pub use auth::{AuthenticatedUser, IdentityProvider, KeycloakIdentityProvider};
pub use chunker::{Chunker, ChunkingParams, RecursiveChunker};
pub use config::Settings;
pub use domain::{
    Chunk, ChunkingStrategy, Collection, Configuration, Document, Pack, Permission,
    PermissionAction, Property, PropertyType, Role, SearchFilter,
};
pub use embedding::{EmbeddingProvider, ModelInfo, OpenAiEmbeddingClient};
pub use error::{RagError, Result};
pub use rbac::{DbPermissionChecker, PermissionChecker};
pub use store::{connect_pool, initialize_schema, UnitOfWork};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.starts_with(char::is_numeric));
    }
}
