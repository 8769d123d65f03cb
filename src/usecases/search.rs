//! Hybrid search: vector similarity fused with full-text rank

use crate::domain::{PermissionAction, SearchFilter};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::rbac::PermissionChecker;
use crate::store::{ChunkRepo, SearchParams, SearchRow, UnitOfWork};
use serde_json::{Map, Value};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_VECTOR_WEIGHT: f64 = 0.7;
pub const DEFAULT_FTS_WEIGHT: f64 = 0.3;
pub const DEFAULT_SEARCH_LIMIT: i64 = 10;

/// One search request against a collection
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub collection_id: Uuid,
    pub query: String,
    pub vector_weight: f64,
    pub fts_weight: f64,
    pub limit: i64,
    pub filters: Vec<(String, SearchFilter)>,
}

impl SearchRequest {
    pub fn new(collection_id: Uuid, query: impl Into<String>) -> Self {
        Self {
            collection_id,
            query: query.into(),
            vector_weight: DEFAULT_VECTOR_WEIGHT,
            fts_weight: DEFAULT_FTS_WEIGHT,
            limit: DEFAULT_SEARCH_LIMIT,
            filters: vec![],
        }
    }
}

/// One ranked search result
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk_id: Uuid,
    pub pack_id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub vector_score: f64,
    pub fts_score: f64,
    pub score: f64,
    /// The document's `title` property, when present
    pub document_title: Option<String>,
    /// Remaining per-document properties
    pub metadata: Map<String, Value>,
}

/// Hybrid retrieval over a collection's chunks
pub struct SearchService {
    pool: PgPool,
    permissions: Arc<dyn PermissionChecker>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SearchService {
    pub fn new(
        pool: PgPool,
        permissions: Arc<dyn PermissionChecker>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            pool,
            permissions,
            embedder,
        }
    }

    pub async fn execute(&self, subject: &str, request: SearchRequest) -> Result<Vec<SearchHit>> {
        if !self
            .permissions
            .check(subject, request.collection_id, PermissionAction::Read)
            .await?
        {
            return Err(RagError::permission_denied(PermissionAction::Read));
        }

        // An empty query skips the embedding call entirely; the statement
        // then ranks on the (zero) FTS contribution alone.
        let query_embedding = if request.query.trim().is_empty() {
            None
        } else {
            self.embedder
                .embed(std::slice::from_ref(&request.query))
                .await?
                .into_iter()
                .next()
                .filter(|v| !v.is_empty())
        };

        let params = SearchParams {
            collection_id: request.collection_id,
            query_embedding,
            query_fts: request.query.clone(),
            vector_weight: request.vector_weight,
            fts_weight: request.fts_weight,
            limit: request.limit,
            property_filters: request.filters,
        };

        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let rows = ChunkRepo::search(uow.conn(), &params).await?;
        uow.commit().await?;

        debug!(
            collection_id = %request.collection_id,
            results = rows.len(),
            "hybrid search"
        );
        Ok(rows.into_iter().map(split_title).collect())
    }
}

/// Pull the `title` property out of the aggregated document properties; the
/// rest become the hit's metadata.
fn split_title(row: SearchRow) -> SearchHit {
    let mut metadata = match row.properties {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let document_title = metadata
        .remove("title")
        .and_then(|v| v.as_str().map(|s| s.to_string()));

    SearchHit {
        chunk_id: row.chunk_id,
        pack_id: row.pack_id,
        document_id: row.document_id,
        content: row.content,
        vector_score: row.vector_score,
        fts_score: row.fts_score,
        score: row.score,
        document_title,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(properties: Value) -> SearchRow {
        SearchRow {
            chunk_id: Uuid::new_v4(),
            pack_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            content: "chunk text".to_string(),
            vector_score: 0.9,
            fts_score: 0.1,
            score: 0.66,
            properties,
        }
    }

    #[test]
    fn test_split_title_extracts_title() {
        let hit = split_title(row(json!({"title": "Report", "author": "kim"})));
        assert_eq!(hit.document_title.as_deref(), Some("Report"));
        assert_eq!(hit.metadata.get("author"), Some(&json!("kim")));
        assert!(!hit.metadata.contains_key("title"));
    }

    #[test]
    fn test_split_title_without_title() {
        let hit = split_title(row(json!({"author": "kim"})));
        assert!(hit.document_title.is_none());
        assert_eq!(hit.metadata.len(), 1);
    }

    #[test]
    fn test_split_title_handles_non_object_properties() {
        let hit = split_title(row(Value::Null));
        assert!(hit.document_title.is_none());
        assert!(hit.metadata.is_empty());
    }

    #[test]
    fn test_request_defaults() {
        let req = SearchRequest::new(Uuid::new_v4(), "q");
        assert_eq!(req.vector_weight, DEFAULT_VECTOR_WEIGHT);
        assert_eq!(req.fts_weight, DEFAULT_FTS_WEIGHT);
        assert_eq!(req.limit, DEFAULT_SEARCH_LIMIT);
    }
}
