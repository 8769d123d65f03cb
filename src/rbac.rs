//! Role-based access control

use crate::domain::PermissionAction;
use crate::error::Result;
use crate::store::{PermissionRepo, RoleRepo};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

/// Trait for authorization checks at use-case boundaries.
///
/// `check` answers yes/no; turning a "no" into a permission-denied error is
/// the caller's job.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    async fn check(
        &self,
        subject: &str,
        collection_id: Uuid,
        action: PermissionAction,
    ) -> Result<bool>;
}

/// Checker backed by the permission and role tables
pub struct DbPermissionChecker {
    pool: PgPool,
}

impl DbPermissionChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionChecker for DbPermissionChecker {
    async fn check(
        &self,
        subject: &str,
        collection_id: Uuid,
        action: PermissionAction,
    ) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;

        let Some(permission) =
            PermissionRepo::get_for_collection(&mut conn, collection_id, subject).await?
        else {
            debug!(subject, %collection_id, %action, "no permission row");
            return Ok(false);
        };

        let allowed = match &permission.actions_override {
            Some(_) => permission.allows(&[], action),
            None => {
                let role_actions =
                    RoleRepo::get_actions_for_role(&mut conn, permission.role_id).await?;
                permission.allows(&role_actions, action)
            }
        };

        debug!(subject, %collection_id, %action, allowed, "permission check");
        Ok(allowed)
    }
}
