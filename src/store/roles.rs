//! Role repository

use crate::domain::Role;
use crate::error::Result;
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct RoleRow {
    id: Uuid,
    name: String,
    description: Option<String>,
}

impl From<RoleRow> for Role {
    fn from(r: RoleRow) -> Self {
        Role {
            id: r.id,
            name: r.name,
            description: r.description,
        }
    }
}

pub struct RoleRepo;

impl RoleRepo {
    pub async fn get_by_id(conn: &mut PgConnection, role_id: Uuid) -> Result<Option<Role>> {
        let row: Option<RoleRow> =
            sqlx::query_as("SELECT id, name, description FROM role WHERE id = $1")
                .bind(role_id)
                .fetch_optional(conn)
                .await?;
        Ok(row.map(Role::from))
    }

    pub async fn get_by_name(conn: &mut PgConnection, name: &str) -> Result<Option<Role>> {
        let row: Option<RoleRow> =
            sqlx::query_as("SELECT id, name, description FROM role WHERE name = $1")
                .bind(name)
                .fetch_optional(conn)
                .await?;
        Ok(row.map(Role::from))
    }

    pub async fn list_all(conn: &mut PgConnection) -> Result<Vec<Role>> {
        let rows: Vec<RoleRow> =
            sqlx::query_as("SELECT id, name, description FROM role ORDER BY name")
                .fetch_all(conn)
                .await?;
        Ok(rows.into_iter().map(Role::from).collect())
    }

    /// Default action set granted by a role
    pub async fn get_actions_for_role(
        conn: &mut PgConnection,
        role_id: Uuid,
    ) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT action FROM role_permission WHERE role_id = $1")
                .bind(role_id)
                .fetch_all(conn)
                .await?;
        Ok(rows.into_iter().map(|(action,)| action).collect())
    }
}
