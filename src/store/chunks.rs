//! Chunk repository: batch persistence and the hybrid search statement

use crate::domain::{Chunk, SearchFilter};
use crate::error::Result;
use pgvector::Vector;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct ChunkRow {
    id: Uuid,
    pack_id: Uuid,
    content: String,
    embedding: Vector,
    position: i32,
}

impl From<ChunkRow> for Chunk {
    fn from(r: ChunkRow) -> Self {
        Chunk {
            id: r.id,
            pack_id: r.pack_id,
            content: r.content,
            embedding: r.embedding.to_vec(),
            position: r.position,
        }
    }
}

/// Inputs for the hybrid search statement
#[derive(Debug, Clone)]
pub struct SearchParams {
    pub collection_id: Uuid,
    /// Query embedding; `None` yields a zero vector contribution
    pub query_embedding: Option<Vec<f32>>,
    /// Full-text query; an empty string yields a zero FTS contribution
    pub query_fts: String,
    pub vector_weight: f64,
    pub fts_weight: f64,
    pub limit: i64,
    pub property_filters: Vec<(String, SearchFilter)>,
}

/// One row of the hybrid search result, scores already combined
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SearchRow {
    pub chunk_id: Uuid,
    pub pack_id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub vector_score: f64,
    pub fts_score: f64,
    pub score: f64,
    /// All properties of the owning document as a JSON object
    pub properties: serde_json::Value,
}

pub struct ChunkRepo;

impl ChunkRepo {
    /// Insert chunks preserving their positions. No-op on an empty batch.
    pub async fn create_batch(conn: &mut PgConnection, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO chunk (id, pack_id, content, embedding, position) ");
        qb.push_values(chunks, |mut b, chunk| {
            b.push_bind(chunk.id)
                .push_bind(chunk.pack_id)
                .push_bind(chunk.content.clone())
                .push_bind(Vector::from(chunk.embedding.clone()))
                .push_bind(chunk.position);
        });
        qb.build().execute(conn).await?;
        Ok(())
    }

    pub async fn get_by_pack_id(conn: &mut PgConnection, pack_id: Uuid) -> Result<Vec<Chunk>> {
        let rows: Vec<ChunkRow> = sqlx::query_as(
            "SELECT id, pack_id, content, embedding, position \
             FROM chunk WHERE pack_id = $1 ORDER BY position",
        )
        .bind(pack_id)
        .fetch_all(conn)
        .await?;
        Ok(rows.into_iter().map(Chunk::from).collect())
    }

    pub async fn delete_by_pack_id(conn: &mut PgConnection, pack_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM chunk WHERE pack_id = $1")
            .bind(pack_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Hybrid search over a collection's packs.
    ///
    /// One statement joins vector distance, full-text rank and the property
    /// filter predicates; results come back ordered by the combined score.
    pub async fn search(conn: &mut PgConnection, params: &SearchParams) -> Result<Vec<SearchRow>> {
        let mut qb = build_search_query(params);
        let rows: Vec<SearchRow> = qb.build_query_as().fetch_all(conn).await?;
        Ok(rows)
    }
}

fn build_search_query(params: &SearchParams) -> QueryBuilder<'static, Postgres> {
    let query_vec = params
        .query_embedding
        .as_ref()
        .filter(|v| !v.is_empty())
        .map(|v| Vector::from(v.clone()));

    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT q.chunk_id, q.pack_id, q.document_id, q.content, \
         q.vector_score, q.fts_score, ",
    );
    qb.push("(q.vector_score * ")
        .push_bind(params.vector_weight)
        .push(" + q.fts_score * ")
        .push_bind(params.fts_weight)
        .push(")::float8 AS score, q.properties FROM (");

    qb.push("SELECT c.id AS chunk_id, c.pack_id, p.document_id, c.content, ");

    qb.push("(CASE WHEN ")
        .push_bind(query_vec.clone())
        .push("::vector IS NULL THEN 0 ELSE 1 - (c.embedding <=> ")
        .push_bind(query_vec)
        .push("::vector) END)::float8 AS vector_score, ");

    qb.push("(CASE WHEN ")
        .push_bind(params.query_fts.clone())
        .push(" = '' THEN 0 ELSE ts_rank(to_tsvector('simple', c.content), plainto_tsquery('simple', ")
        .push_bind(params.query_fts.clone())
        .push(")) END)::float8 AS fts_score, ");

    qb.push(
        "(SELECT COALESCE(jsonb_object_agg(pr.key, pr.value), '{}'::jsonb) \
         FROM property pr WHERE pr.document_id = p.document_id) AS properties ",
    );

    qb.push(
        "FROM chunk c \
         JOIN pack p ON p.id = c.pack_id \
         JOIN pack_collection pc ON pc.pack_id = p.id AND pc.collection_id = ",
    )
    .push_bind(params.collection_id)
    .push(" WHERE p.deleted_at IS NULL");

    push_property_filters(&mut qb, &params.property_filters);

    qb.push(") q ORDER BY score DESC LIMIT ")
        .push_bind(params.limit);

    qb
}

/// Append one `EXISTS` subquery per property filter, ANDed together
fn push_property_filters(qb: &mut QueryBuilder<'static, Postgres>, filters: &[(String, SearchFilter)]) {
    for (key, filter) in filters {
        qb.push(
            " AND EXISTS (SELECT 1 FROM property pr \
             WHERE pr.document_id = p.document_id AND pr.key = ",
        )
        .push_bind(key.clone());

        match filter {
            SearchFilter::Eq(value) => {
                qb.push(" AND pr.value = ").push_bind(value.clone());
            }
            SearchFilter::OneOf(values) => {
                qb.push(" AND pr.value = ANY(").push_bind(values.clone()).push(")");
            }
            SearchFilter::Range { gte, lte } => {
                let cast = range_cast(gte.as_deref(), lte.as_deref());
                if let Some(gte) = gte {
                    qb.push(format!(" AND (pr.value)::{cast} >= ("))
                        .push_bind(gte.clone())
                        .push(format!(")::{cast}"));
                }
                if let Some(lte) = lte {
                    qb.push(format!(" AND (pr.value)::{cast} <= ("))
                        .push_bind(lte.clone())
                        .push(format!(")::{cast}"));
                }
            }
        }
        qb.push(")");
    }
}

/// Range endpoints compare as numbers when every provided endpoint parses as
/// one, and as dates otherwise.
fn range_cast(gte: Option<&str>, lte: Option<&str>) -> &'static str {
    let numeric = [gte, lte]
        .iter()
        .all(|v| v.is_none_or(|s| s.parse::<f64>().is_ok()));
    if numeric {
        "numeric"
    } else {
        "date"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_params() -> SearchParams {
        SearchParams {
            collection_id: Uuid::new_v4(),
            query_embedding: Some(vec![0.1, 0.2]),
            query_fts: "test".to_string(),
            vector_weight: 0.7,
            fts_weight: 0.3,
            limit: 10,
            property_filters: vec![],
        }
    }

    #[test]
    fn test_search_sql_shape() {
        let sql = build_search_query(&base_params()).into_sql();
        assert!(sql.contains("c.embedding <=>"));
        assert!(sql.contains("ts_rank(to_tsvector('simple', c.content)"));
        assert!(sql.contains("jsonb_object_agg"));
        assert!(sql.contains("ORDER BY score DESC"));
        assert!(sql.contains("p.deleted_at IS NULL"));
    }

    #[test]
    fn test_eq_filter_becomes_exists_subquery() {
        let mut params = base_params();
        params.property_filters = vec![(
            "status".to_string(),
            SearchFilter::Eq("open".to_string()),
        )];
        let sql = build_search_query(&params).into_sql();
        assert!(sql.contains("EXISTS (SELECT 1 FROM property pr"));
        assert!(sql.contains("pr.value = "));
    }

    #[test]
    fn test_one_of_filter_uses_any() {
        let mut params = base_params();
        params.property_filters = vec![(
            "status".to_string(),
            SearchFilter::OneOf(vec!["open".to_string(), "closed".to_string()]),
        )];
        let sql = build_search_query(&params).into_sql();
        assert!(sql.contains("pr.value = ANY("));
    }

    #[test]
    fn test_multiple_filters_are_anded() {
        let mut params = base_params();
        params.property_filters = vec![
            ("a".to_string(), SearchFilter::Eq("1".to_string())),
            ("b".to_string(), SearchFilter::Eq("2".to_string())),
        ];
        let sql = build_search_query(&params).into_sql();
        assert_eq!(sql.matches("EXISTS (SELECT 1 FROM property pr").count(), 2);
    }

    #[test]
    fn test_numeric_range_cast() {
        let mut params = base_params();
        params.property_filters = vec![(
            "pages".to_string(),
            SearchFilter::Range {
                gte: Some("10".to_string()),
                lte: Some("200".to_string()),
            },
        )];
        let sql = build_search_query(&params).into_sql();
        assert!(sql.contains("(pr.value)::numeric >="));
        assert!(sql.contains("(pr.value)::numeric <="));
    }

    #[test]
    fn test_date_range_cast_when_not_numeric() {
        let mut params = base_params();
        params.property_filters = vec![(
            "created".to_string(),
            SearchFilter::Range {
                gte: Some("2024-01-01".to_string()),
                lte: None,
            },
        )];
        let sql = build_search_query(&params).into_sql();
        assert!(sql.contains("(pr.value)::date >="));
    }

    #[test]
    fn test_range_cast_mixed_endpoints_fall_back_to_date() {
        assert_eq!(range_cast(Some("1"), Some("2")), "numeric");
        assert_eq!(range_cast(Some("1"), Some("2024-01-01")), "date");
        assert_eq!(range_cast(None, Some("3.5")), "numeric");
        assert_eq!(range_cast(None, None), "numeric");
    }
}
