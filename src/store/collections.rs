//! Collection repository

use crate::domain::Collection;
use crate::error::Result;
use crate::store::paginate;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct CollectionRow {
    id: Uuid,
    configuration_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    name: Option<String>,
}

impl From<CollectionRow> for Collection {
    fn from(r: CollectionRow) -> Self {
        Collection {
            id: r.id,
            configuration_id: r.configuration_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
            deleted_at: r.deleted_at,
            name: r.name,
        }
    }
}

const COLUMNS: &str = "id, configuration_id, created_at, updated_at, deleted_at, name";

pub struct CollectionRepo;

impl CollectionRepo {
    pub async fn get_by_id(
        conn: &mut PgConnection,
        collection_id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<Collection>> {
        let mut q = format!("SELECT {} FROM collection WHERE id = $1", COLUMNS);
        if !include_deleted {
            q.push_str(" AND deleted_at IS NULL");
        }
        let row: Option<CollectionRow> = sqlx::query_as(&q)
            .bind(collection_id)
            .fetch_optional(conn)
            .await?;
        Ok(row.map(Collection::from))
    }

    /// Collections on which the subject holds any permission
    pub async fn list_by_subject(
        conn: &mut PgConnection,
        subject: &str,
        cursor: Option<Uuid>,
        limit: i64,
    ) -> Result<(Vec<Collection>, Option<Uuid>)> {
        let mut q = String::from(
            "SELECT DISTINCT c.id, c.configuration_id, c.created_at, c.updated_at, \
             c.deleted_at, c.name \
             FROM collection c JOIN permission p ON p.collection_id = c.id \
             WHERE c.deleted_at IS NULL AND p.subject = $1",
        );
        if cursor.is_some() {
            q.push_str(" AND c.id > $2");
        }
        q.push_str(&format!(" ORDER BY c.id LIMIT {}", limit + 1));

        let query = sqlx::query_as::<_, CollectionRow>(&q).bind(subject);
        let rows = match cursor {
            Some(c) => query.bind(c).fetch_all(conn).await?,
            None => query.fetch_all(conn).await?,
        };
        let collections: Vec<Collection> = rows.into_iter().map(Collection::from).collect();
        Ok(paginate(collections, limit, |c| c.id))
    }

    pub async fn create(conn: &mut PgConnection, collection: &Collection) -> Result<()> {
        sqlx::query(
            "INSERT INTO collection (id, configuration_id, created_at, updated_at, deleted_at, name) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(collection.id)
        .bind(collection.configuration_id)
        .bind(collection.created_at)
        .bind(collection.updated_at)
        .bind(collection.deleted_at)
        .bind(&collection.name)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn update(conn: &mut PgConnection, collection: &Collection) -> Result<()> {
        sqlx::query(
            "UPDATE collection SET configuration_id = $1, updated_at = $2, name = $3 WHERE id = $4",
        )
        .bind(collection.configuration_id)
        .bind(collection.updated_at)
        .bind(&collection.name)
        .bind(collection.id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn soft_delete(conn: &mut PgConnection, collection_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE collection SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(collection_id)
            .execute(conn)
            .await?;
        Ok(())
    }
}
