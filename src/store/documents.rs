//! Document repository

use crate::domain::Document;
use crate::error::Result;
use crate::store::paginate;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    content: String,
    source_hash: Vec<u8>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<DocumentRow> for Document {
    fn from(r: DocumentRow) -> Self {
        Document {
            id: r.id,
            content: r.content,
            source_hash: r.source_hash,
            created_at: r.created_at,
            updated_at: r.updated_at,
            deleted_at: r.deleted_at,
        }
    }
}

const COLUMNS: &str = "id, content, source_hash, created_at, updated_at, deleted_at";

pub struct DocumentRepo;

impl DocumentRepo {
    pub async fn get_by_id(
        conn: &mut PgConnection,
        document_id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<Document>> {
        let mut q = format!("SELECT {} FROM document WHERE id = $1", COLUMNS);
        if !include_deleted {
            q.push_str(" AND deleted_at IS NULL");
        }
        let row: Option<DocumentRow> = sqlx::query_as(&q)
            .bind(document_id)
            .fetch_optional(conn)
            .await?;
        Ok(row.map(Document::from))
    }

    /// The unique live document with this content hash, if any
    pub async fn get_by_source_hash(
        conn: &mut PgConnection,
        source_hash: &[u8],
    ) -> Result<Option<Document>> {
        let row: Option<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM document WHERE source_hash = $1 AND deleted_at IS NULL",
            COLUMNS
        ))
        .bind(source_hash)
        .fetch_optional(conn)
        .await?;
        Ok(row.map(Document::from))
    }

    pub async fn list(
        conn: &mut PgConnection,
        cursor: Option<Uuid>,
        limit: i64,
        include_deleted: bool,
    ) -> Result<(Vec<Document>, Option<Uuid>)> {
        let mut conditions = Vec::new();
        if !include_deleted {
            conditions.push("deleted_at IS NULL".to_string());
        }
        if cursor.is_some() {
            conditions.push("id > $1".to_string());
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let q = format!(
            "SELECT {} FROM document{} ORDER BY id LIMIT {}",
            COLUMNS,
            where_clause,
            limit + 1
        );

        let query = sqlx::query_as::<_, DocumentRow>(&q);
        let rows = match cursor {
            Some(c) => query.bind(c).fetch_all(conn).await?,
            None => query.fetch_all(conn).await?,
        };
        let docs: Vec<Document> = rows.into_iter().map(Document::from).collect();
        Ok(paginate(docs, limit, |d| d.id))
    }

    pub async fn create(conn: &mut PgConnection, document: &Document) -> Result<()> {
        sqlx::query(
            "INSERT INTO document (id, content, source_hash, created_at, updated_at, deleted_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(document.id)
        .bind(&document.content)
        .bind(&document.source_hash)
        .bind(document.created_at)
        .bind(document.updated_at)
        .bind(document.deleted_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn soft_delete(conn: &mut PgConnection, document_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE document SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(document_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Removes the document row; packs, chunks and properties cascade
    pub async fn hard_delete(conn: &mut PgConnection, document_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM document WHERE id = $1")
            .bind(document_id)
            .execute(conn)
            .await?;
        Ok(())
    }
}
