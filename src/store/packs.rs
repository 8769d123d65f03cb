//! Pack repository, including collection membership

use crate::domain::Pack;
use crate::error::Result;
use crate::store::paginate;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct PackRow {
    id: Uuid,
    document_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<PackRow> for Pack {
    fn from(r: PackRow) -> Self {
        Pack {
            id: r.id,
            document_id: r.document_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
            deleted_at: r.deleted_at,
        }
    }
}

/// Filters for listing packs
#[derive(Debug, Clone, Copy, Default)]
pub struct PackFilter {
    /// Restrict to packs of this document
    pub document_id: Option<Uuid>,
    /// Restrict to packs attached to this collection
    pub collection_id: Option<Uuid>,
    pub include_deleted: bool,
}

pub struct PackRepo;

impl PackRepo {
    pub async fn get_by_id(
        conn: &mut PgConnection,
        pack_id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<Pack>> {
        let mut q = String::from(
            "SELECT id, document_id, created_at, updated_at, deleted_at FROM pack WHERE id = $1",
        );
        if !include_deleted {
            q.push_str(" AND deleted_at IS NULL");
        }
        let row: Option<PackRow> = sqlx::query_as(&q).bind(pack_id).fetch_optional(conn).await?;
        Ok(row.map(Pack::from))
    }

    pub async fn list(
        conn: &mut PgConnection,
        filter: PackFilter,
        cursor: Option<Uuid>,
        limit: i64,
    ) -> Result<(Vec<Pack>, Option<Uuid>)> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT p.id, p.document_id, p.created_at, p.updated_at, p.deleted_at FROM pack p WHERE 1=1",
        );
        if !filter.include_deleted {
            qb.push(" AND p.deleted_at IS NULL");
        }
        if let Some(document_id) = filter.document_id {
            qb.push(" AND p.document_id = ").push_bind(document_id);
        }
        if let Some(collection_id) = filter.collection_id {
            qb.push(
                " AND EXISTS (SELECT 1 FROM pack_collection pc \
                 WHERE pc.pack_id = p.id AND pc.collection_id = ",
            )
            .push_bind(collection_id)
            .push(")");
        }
        if let Some(cursor) = cursor {
            qb.push(" AND p.id > ").push_bind(cursor);
        }
        qb.push(" ORDER BY p.id LIMIT ").push_bind(limit + 1);

        let rows: Vec<PackRow> = qb.build_query_as().fetch_all(conn).await?;
        let packs: Vec<Pack> = rows.into_iter().map(Pack::from).collect();
        Ok(paginate(packs, limit, |p| p.id))
    }

    pub async fn create(conn: &mut PgConnection, pack: &Pack) -> Result<()> {
        sqlx::query(
            "INSERT INTO pack (id, document_id, created_at, updated_at, deleted_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(pack.id)
        .bind(pack.document_id)
        .bind(pack.created_at)
        .bind(pack.updated_at)
        .bind(pack.deleted_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn soft_delete(conn: &mut PgConnection, pack_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE pack SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(pack_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn hard_delete(conn: &mut PgConnection, pack_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM pack WHERE id = $1")
            .bind(pack_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Attach a pack to a collection. Idempotent: re-attaching is a no-op.
    pub async fn add_to_collection(
        conn: &mut PgConnection,
        pack_id: Uuid,
        collection_id: Uuid,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO pack_collection (pack_id, collection_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(pack_id)
        .bind(collection_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Detach a pack from a collection without touching the pack itself
    pub async fn remove_from_collection(
        conn: &mut PgConnection,
        pack_id: Uuid,
        collection_id: Uuid,
    ) -> Result<()> {
        sqlx::query("DELETE FROM pack_collection WHERE pack_id = $1 AND collection_id = $2")
            .bind(pack_id)
            .bind(collection_id)
            .execute(conn)
            .await?;
        Ok(())
    }
}
