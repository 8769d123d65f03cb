//! Document ingestion and retrieval

use crate::chunker::{Chunker, ChunkingParams};
use crate::domain::{Chunk, Document, Pack, PermissionAction, Property, PropertyType};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::rbac::PermissionChecker;
use crate::store::{
    ChunkRepo, ConfigurationRepo, DocumentRepo, PackFilter, PackRepo, PropertyRepo, UnitOfWork,
};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// One typed property supplied with an ingest request
#[derive(Debug, Clone)]
pub struct IngestProperty {
    pub key: String,
    pub value: String,
    pub property_type: PropertyType,
}

/// Ingest request: one document into one collection
#[derive(Debug, Clone)]
pub struct IngestDocument {
    pub collection_id: Uuid,
    pub content: String,
    pub properties: Vec<IngestProperty>,
    /// Precomputed content hash; derived from the content when absent
    pub source_hash: Option<Vec<u8>>,
}

/// Document ingestion and lookup
pub struct DocumentService {
    pool: PgPool,
    permissions: Arc<dyn PermissionChecker>,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl DocumentService {
    pub fn new(
        pool: PgPool,
        permissions: Arc<dyn PermissionChecker>,
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            pool,
            permissions,
            chunker,
            embedder,
        }
    }

    /// Ingest a document into a collection.
    ///
    /// Content already present anywhere in the store (matched by hash) is not
    /// re-chunked or re-embedded; its pack is attached to the collection and
    /// the existing document is returned. Two concurrent ingests of the same
    /// content race on the live-hash unique index; the loser retries once and
    /// takes the dedup fast path.
    pub async fn load(&self, subject: &str, input: IngestDocument) -> Result<Document> {
        if !self
            .permissions
            .check(subject, input.collection_id, PermissionAction::Write)
            .await?
        {
            return Err(RagError::permission_denied(PermissionAction::Write));
        }

        let source_hash = match &input.source_hash {
            Some(hash) => hash.clone(),
            None => md5::compute(input.content.as_bytes()).0.to_vec(),
        };

        match self.try_load(&input, &source_hash).await {
            Err(err) if err.is_unique_violation() => {
                debug!(collection_id = %input.collection_id, "lost ingest race, retrying dedup probe");
                self.try_load(&input, &source_hash).await
            }
            other => other,
        }
    }

    async fn try_load(&self, input: &IngestDocument, source_hash: &[u8]) -> Result<Document> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;

        // Dedup probe: hashes span the whole store, not one collection.
        if let Some(existing) = DocumentRepo::get_by_source_hash(uow.conn(), source_hash).await? {
            let (packs, _) = PackRepo::list(
                uow.conn(),
                PackFilter {
                    document_id: Some(existing.id),
                    ..PackFilter::default()
                },
                None,
                1,
            )
            .await?;
            if let Some(pack) = packs.first() {
                PackRepo::add_to_collection(uow.conn(), pack.id, input.collection_id).await?;
            }
            uow.commit().await?;
            debug!(document_id = %existing.id, "deduplicated ingest");
            return Ok(existing);
        }

        let config = ConfigurationRepo::get_by_collection_id(uow.conn(), input.collection_id)
            .await?
            .ok_or_else(|| {
                RagError::Validation("collection has no configuration".to_string())
            })?;

        let params = ChunkingParams::from_configuration(&config);
        let texts = self.chunker.chunk(&input.content, &params)?;
        let vectors = self.embedder.embed(&texts).await?;
        if texts.len() != vectors.len() {
            return Err(RagError::Upstream(format!(
                "embedding count mismatch: {} chunks, {} vectors",
                texts.len(),
                vectors.len()
            )));
        }
        for vector in &vectors {
            if vector.len() != config.embedding_dimensions as usize {
                return Err(RagError::Validation(format!(
                    "embedding has {} dimensions, configuration expects {}",
                    vector.len(),
                    config.embedding_dimensions
                )));
            }
        }

        let now = Utc::now();
        let document = Document {
            id: Uuid::new_v4(),
            content: input.content.clone(),
            source_hash: source_hash.to_vec(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let pack = Pack {
            id: Uuid::new_v4(),
            document_id: document.id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        DocumentRepo::create(uow.conn(), &document).await?;
        PackRepo::create(uow.conn(), &pack).await?;

        let chunks: Vec<Chunk> = texts
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(position, (content, embedding))| Chunk {
                id: Uuid::new_v4(),
                pack_id: pack.id,
                content,
                embedding,
                position: position as i32,
            })
            .collect();
        ChunkRepo::create_batch(uow.conn(), &chunks).await?;

        let properties: Vec<Property> = input
            .properties
            .iter()
            .map(|p| Property {
                document_id: document.id,
                key: p.key.clone(),
                value: p.value.clone(),
                property_type: p.property_type,
            })
            .collect();
        PropertyRepo::create_batch(uow.conn(), &properties).await?;

        PackRepo::add_to_collection(uow.conn(), pack.id, input.collection_id).await?;
        uow.commit().await?;

        info!(
            document_id = %document.id,
            chunks = chunks.len(),
            collection_id = %input.collection_id,
            "document ingested"
        );
        Ok(document)
    }

    /// Get a document by id within a collection the caller can read.
    ///
    /// The document must have a pack attached to that collection; membership
    /// elsewhere is not enough.
    pub async fn get(
        &self,
        subject: &str,
        document_id: Uuid,
        collection_id: Uuid,
    ) -> Result<Document> {
        if !self
            .permissions
            .check(subject, collection_id, PermissionAction::Read)
            .await?
        {
            return Err(RagError::permission_denied(PermissionAction::Read));
        }

        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let document = DocumentRepo::get_by_id(uow.conn(), document_id, false)
            .await?
            .ok_or_else(|| RagError::not_found("Document", document_id))?;

        let (packs, _) = PackRepo::list(
            uow.conn(),
            PackFilter {
                document_id: Some(document_id),
                collection_id: Some(collection_id),
                ..PackFilter::default()
            },
            None,
            1,
        )
        .await?;
        if packs.is_empty() {
            return Err(RagError::not_found("Document", document_id));
        }
        uow.commit().await?;

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_md5_source_hash_is_16_bytes() {
        let hash = md5::compute("some document content".as_bytes()).0.to_vec();
        assert_eq!(hash.len(), 16);
        // deterministic across calls
        assert_eq!(hash, md5::compute("some document content".as_bytes()).0.to_vec());
    }
}
