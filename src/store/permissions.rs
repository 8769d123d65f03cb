//! Permission repository

use crate::domain::Permission;
use crate::error::Result;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct PermissionRow {
    id: Uuid,
    collection_id: Uuid,
    subject: String,
    role_id: Uuid,
    actions_override: Option<Json<Vec<String>>>,
    created_at: DateTime<Utc>,
    created_by: Option<String>,
}

impl From<PermissionRow> for Permission {
    fn from(r: PermissionRow) -> Self {
        Permission {
            id: r.id,
            collection_id: r.collection_id,
            subject: r.subject,
            role_id: r.role_id,
            actions_override: r.actions_override.map(|j| j.0),
            created_at: r.created_at,
            created_by: r.created_by,
        }
    }
}

const COLUMNS: &str =
    "id, collection_id, subject, role_id, actions_override, created_at, created_by";

pub struct PermissionRepo;

impl PermissionRepo {
    /// The unique permission of a subject on a collection, if any
    pub async fn get_for_collection(
        conn: &mut PgConnection,
        collection_id: Uuid,
        subject: &str,
    ) -> Result<Option<Permission>> {
        let row: Option<PermissionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM permission WHERE collection_id = $1 AND subject = $2",
            COLUMNS
        ))
        .bind(collection_id)
        .bind(subject)
        .fetch_optional(conn)
        .await?;
        Ok(row.map(Permission::from))
    }

    pub async fn list_by_collection(
        conn: &mut PgConnection,
        collection_id: Uuid,
    ) -> Result<Vec<Permission>> {
        let rows: Vec<PermissionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM permission WHERE collection_id = $1 ORDER BY created_at",
            COLUMNS
        ))
        .bind(collection_id)
        .fetch_all(conn)
        .await?;
        Ok(rows.into_iter().map(Permission::from).collect())
    }

    pub async fn list_by_subject(conn: &mut PgConnection, subject: &str) -> Result<Vec<Permission>> {
        let rows: Vec<PermissionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM permission WHERE subject = $1 ORDER BY created_at",
            COLUMNS
        ))
        .bind(subject)
        .fetch_all(conn)
        .await?;
        Ok(rows.into_iter().map(Permission::from).collect())
    }

    pub async fn create(conn: &mut PgConnection, permission: &Permission) -> Result<()> {
        sqlx::query(
            "INSERT INTO permission \
             (id, collection_id, subject, role_id, actions_override, created_at, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(permission.id)
        .bind(permission.collection_id)
        .bind(&permission.subject)
        .bind(permission.role_id)
        .bind(permission.actions_override.clone().map(Json))
        .bind(permission.created_at)
        .bind(&permission.created_by)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn update(conn: &mut PgConnection, permission: &Permission) -> Result<()> {
        sqlx::query("UPDATE permission SET role_id = $1, actions_override = $2 WHERE id = $3")
            .bind(permission.role_id)
            .bind(permission.actions_override.clone().map(Json))
            .bind(permission.id)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn delete(conn: &mut PgConnection, permission_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM permission WHERE id = $1")
            .bind(permission_id)
            .execute(conn)
            .await?;
        Ok(())
    }
}
