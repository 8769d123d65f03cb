//! Configuration creation and listing

use crate::domain::{ChunkingStrategy, Configuration};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::store::{ConfigurationRepo, UnitOfWork};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Inputs for creating a configuration
#[derive(Debug, Clone)]
pub struct NewConfiguration {
    pub chunking_strategy: ChunkingStrategy,
    pub embedding_model: String,
    /// Expected vector width; taken from the probe when absent
    pub embedding_dimensions: Option<i32>,
    pub chunk_size: i32,
    pub chunk_overlap: i32,
    pub name: Option<String>,
}

/// Configuration creation (with model probing) and listing
pub struct ConfigurationService {
    pool: PgPool,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl ConfigurationService {
    pub fn new(pool: PgPool, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { pool, embedder }
    }

    /// Create an immutable configuration.
    ///
    /// The embedding model is probed once; declared dimensions that disagree
    /// with the model's actual output are rejected here rather than failing
    /// later at chunk insert.
    pub async fn create(&self, input: NewConfiguration) -> Result<Configuration> {
        if input.chunk_size <= 0 {
            return Err(RagError::Validation("chunk_size must be positive".to_string()));
        }
        if input.chunk_overlap < 0 {
            return Err(RagError::Validation(
                "chunk_overlap must not be negative".to_string(),
            ));
        }
        if input.chunk_overlap >= input.chunk_size {
            return Err(RagError::Validation(
                "chunk_overlap must be smaller than chunk_size".to_string(),
            ));
        }
        if input.embedding_model.trim().is_empty() {
            return Err(RagError::Validation("embedding_model is required".to_string()));
        }
        if let Some(dimensions) = input.embedding_dimensions {
            if dimensions <= 0 {
                return Err(RagError::Validation(
                    "embedding_dimensions must be positive".to_string(),
                ));
            }
        }

        let probed = self.probe_dimensions().await?;
        let embedding_dimensions = match input.embedding_dimensions {
            Some(declared) if declared as usize != probed => {
                return Err(RagError::Validation(format!(
                    "embedding_dimensions {} does not match the model's output ({})",
                    declared, probed
                )));
            }
            Some(declared) => declared,
            None => probed as i32,
        };

        let configuration = Configuration {
            id: Uuid::new_v4(),
            chunking_strategy: input.chunking_strategy,
            embedding_model: input.embedding_model,
            embedding_dimensions,
            chunk_size: input.chunk_size,
            chunk_overlap: input.chunk_overlap,
            name: input.name.filter(|n| !n.is_empty()),
        };

        let mut uow = UnitOfWork::begin(&self.pool).await?;
        ConfigurationRepo::create(uow.conn(), &configuration).await?;
        uow.commit().await?;

        info!(
            configuration_id = %configuration.id,
            model = %configuration.embedding_model,
            dimensions = configuration.embedding_dimensions,
            "configuration created"
        );
        Ok(configuration)
    }

    async fn probe_dimensions(&self) -> Result<usize> {
        let vectors = self.embedder.embed(&["dimension probe".to_string()]).await?;
        let vector = vectors
            .first()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| RagError::Upstream("embedding model returned no vector".to_string()))?;
        Ok(vector.len())
    }

    pub async fn list(
        &self,
        cursor: Option<Uuid>,
        limit: i64,
    ) -> Result<(Vec<Configuration>, Option<Uuid>)> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let page = ConfigurationRepo::list(uow.conn(), cursor, limit).await?;
        uow.commit().await?;
        Ok(page)
    }
}
