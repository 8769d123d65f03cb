//! Collection lifecycle: creation and configuration migration

use crate::chunker::{Chunker, ChunkingParams};
use crate::domain::{Chunk, Collection, Permission, PermissionAction};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::rbac::PermissionChecker;
use crate::store::{
    ChunkRepo, CollectionRepo, ConfigurationRepo, DocumentRepo, PackFilter, PackRepo, RoleRepo,
    UnitOfWork,
};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Packs migrated in one transaction. The whole migration is atomic: readers
/// see either the old configuration with the old chunks or the new ones,
/// never a mix. Collections above the cap are rejected up front.
const MIGRATION_PACK_LIMIT: i64 = 10_000;

/// Collection creation, listing and migration
pub struct CollectionService {
    pool: PgPool,
    permissions: Arc<dyn PermissionChecker>,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl CollectionService {
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

    /// Create a collection pinned to a configuration; the creator becomes its
    /// first admin in the same transaction.
    pub async fn create(
        &self,
        subject: &str,
        configuration_id: Uuid,
        name: Option<String>,
    ) -> Result<Collection> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;

        ConfigurationRepo::get_by_id(uow.conn(), configuration_id)
            .await?
            .ok_or_else(|| RagError::not_found("Configuration", configuration_id))?;

        let now = Utc::now();
        let collection = Collection {
            id: Uuid::new_v4(),
            configuration_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            name: name.filter(|n| !n.is_empty()),
        };
        CollectionRepo::create(uow.conn(), &collection).await?;

        let admin_role = RoleRepo::get_by_name(uow.conn(), "admin")
            .await?
            .ok_or_else(|| RagError::not_found("Role", "admin"))?;
        let permission = Permission {
            id: Uuid::new_v4(),
            collection_id: collection.id,
            subject: subject.to_string(),
            role_id: admin_role.id,
            actions_override: None,
            created_at: now,
            created_by: Some(subject.to_string()),
        };
        crate::store::PermissionRepo::create(uow.conn(), &permission).await?;

        uow.commit().await?;
        info!(collection_id = %collection.id, subject, "collection created");
        Ok(collection)
    }

    /// Get a collection the caller can read
    pub async fn get(&self, subject: &str, collection_id: Uuid) -> Result<Collection> {
        if !self
            .permissions
            .check(subject, collection_id, PermissionAction::Read)
            .await?
        {
            return Err(RagError::permission_denied(PermissionAction::Read));
        }
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let collection = CollectionRepo::get_by_id(uow.conn(), collection_id, false)
            .await?
            .ok_or_else(|| RagError::not_found("Collection", collection_id))?;
        uow.commit().await?;
        Ok(collection)
    }

    /// Collections on which the subject holds any permission
    pub async fn list_mine(
        &self,
        subject: &str,
        cursor: Option<Uuid>,
        limit: i64,
    ) -> Result<(Vec<Collection>, Option<Uuid>)> {
        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let page = CollectionRepo::list_by_subject(uow.conn(), subject, cursor, limit).await?;
        uow.commit().await?;
        Ok(page)
    }

    /// Re-chunk and re-embed every pack of the collection under a new
    /// configuration, atomically. Returns the number of packs migrated.
    pub async fn migrate(
        &self,
        subject: &str,
        collection_id: Uuid,
        new_configuration_id: Uuid,
    ) -> Result<u64> {
        if !self
            .permissions
            .check(subject, collection_id, PermissionAction::Migrate)
            .await?
        {
            return Err(RagError::permission_denied(PermissionAction::Migrate));
        }

        let mut uow = UnitOfWork::begin(&self.pool).await?;

        let new_config = ConfigurationRepo::get_by_id(uow.conn(), new_configuration_id)
            .await?
            .ok_or_else(|| RagError::not_found("Configuration", new_configuration_id))?;

        let mut collection = CollectionRepo::get_by_id(uow.conn(), collection_id, false)
            .await?
            .ok_or_else(|| RagError::not_found("Collection", collection_id))?;

        let (packs, more) = PackRepo::list(
            uow.conn(),
            PackFilter {
                collection_id: Some(collection_id),
                ..PackFilter::default()
            },
            None,
            MIGRATION_PACK_LIMIT,
        )
        .await?;
        if more.is_some() {
            return Err(RagError::Validation(format!(
                "collection has more than {} packs; migration limit exceeded",
                MIGRATION_PACK_LIMIT
            )));
        }

        let params = ChunkingParams::from_configuration(&new_config);
        let mut migrated = 0u64;

        for pack in &packs {
            let Some(document) = DocumentRepo::get_by_id(uow.conn(), pack.document_id, false).await?
            else {
                continue;
            };
            if document.content.is_empty() {
                continue;
            }

            let texts = self.chunker.chunk(&document.content, &params)?;
            let vectors = self.embedder.embed(&texts).await?;
            if texts.len() != vectors.len() {
                return Err(RagError::Upstream(format!(
                    "embedding count mismatch: {} chunks, {} vectors",
                    texts.len(),
                    vectors.len()
                )));
            }
            for vector in &vectors {
                if vector.len() != new_config.embedding_dimensions as usize {
                    return Err(RagError::Validation(format!(
                        "embedding has {} dimensions, configuration expects {}",
                        vector.len(),
                        new_config.embedding_dimensions
                    )));
                }
            }

            ChunkRepo::delete_by_pack_id(uow.conn(), pack.id).await?;
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

            migrated += 1;
        }

        collection.configuration_id = new_configuration_id;
        collection.updated_at = Utc::now();
        CollectionRepo::update(uow.conn(), &collection).await?;

        uow.commit().await?;
        info!(
            %collection_id,
            %new_configuration_id,
            migrated,
            "collection migrated"
        );
        Ok(migrated)
    }
}
