//! Permission administration on collections

use crate::domain::{Permission, PermissionAction};
use crate::error::{RagError, Result};
use crate::rbac::PermissionChecker;
use crate::store::{PermissionRepo, RoleRepo, UnitOfWork};
use chrono::Utc;
use sqlx::PgConnection;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Assign, revoke and list permissions; every operation requires `admin`
pub struct PermissionService {
    pool: PgPool,
    permissions: Arc<dyn PermissionChecker>,
}

impl PermissionService {
    pub fn new(pool: PgPool, permissions: Arc<dyn PermissionChecker>) -> Self {
        Self { pool, permissions }
    }

    async fn require_admin(&self, actor: &str, collection_id: Uuid) -> Result<()> {
        if !self
            .permissions
            .check(actor, collection_id, PermissionAction::Admin)
            .await?
        {
            return Err(RagError::permission_denied(PermissionAction::Admin));
        }
        Ok(())
    }

    /// Bind a role to a subject on a collection. An existing binding is
    /// updated in place (new role, new override); otherwise one is inserted.
    pub async fn assign(
        &self,
        actor: &str,
        collection_id: Uuid,
        subject: &str,
        role_name: &str,
        actions_override: Option<Vec<String>>,
    ) -> Result<Permission> {
        self.require_admin(actor, collection_id).await?;

        let mut uow = UnitOfWork::begin(&self.pool).await?;

        let role = RoleRepo::get_by_name(uow.conn(), role_name)
            .await?
            .ok_or_else(|| RagError::not_found("Role", role_name))?;

        let existing =
            PermissionRepo::get_for_collection(uow.conn(), collection_id, subject).await?;
        let permission = match existing {
            Some(mut permission) => {
                permission.role_id = role.id;
                permission.actions_override = actions_override;
                PermissionRepo::update(uow.conn(), &permission).await?;
                permission
            }
            None => {
                let permission = Permission {
                    id: Uuid::new_v4(),
                    collection_id,
                    subject: subject.to_string(),
                    role_id: role.id,
                    actions_override,
                    created_at: Utc::now(),
                    created_by: Some(actor.to_string()),
                };
                PermissionRepo::create(uow.conn(), &permission).await?;
                permission
            }
        };

        uow.commit().await?;
        info!(%collection_id, subject, role = role_name, "permission assigned");
        Ok(permission)
    }

    /// Remove a subject's permission from a collection.
    ///
    /// Revoking the last permission whose effective action set contains
    /// `admin` is refused: an orphaned collection could only be recovered
    /// with out-of-band SQL.
    pub async fn revoke(&self, actor: &str, collection_id: Uuid, subject: &str) -> Result<()> {
        self.require_admin(actor, collection_id).await?;

        let mut uow = UnitOfWork::begin(&self.pool).await?;

        let target = PermissionRepo::get_for_collection(uow.conn(), collection_id, subject)
            .await?
            .ok_or_else(|| {
                RagError::not_found("Permission", format!("{}/{}", collection_id, subject))
            })?;

        if grants_admin(uow.conn(), &target).await? {
            let others = PermissionRepo::list_by_collection(uow.conn(), collection_id).await?;
            let mut another_admin = false;
            for other in others.iter().filter(|p| p.id != target.id) {
                if grants_admin(uow.conn(), other).await? {
                    another_admin = true;
                    break;
                }
            }
            if !another_admin {
                return Err(RagError::Validation(
                    "cannot revoke the last admin permission on a collection".to_string(),
                ));
            }
        }

        PermissionRepo::delete(uow.conn(), target.id).await?;
        uow.commit().await?;
        info!(%collection_id, subject, "permission revoked");
        Ok(())
    }

    pub async fn list(&self, actor: &str, collection_id: Uuid) -> Result<Vec<Permission>> {
        self.require_admin(actor, collection_id).await?;

        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let permissions = PermissionRepo::list_by_collection(uow.conn(), collection_id).await?;
        uow.commit().await?;
        Ok(permissions)
    }
}

/// Whether a permission's effective action set contains `admin`
async fn grants_admin(conn: &mut PgConnection, permission: &Permission) -> Result<bool> {
    Ok(match &permission.actions_override {
        Some(_) => permission.allows(&[], PermissionAction::Admin),
        None => {
            let role_actions = RoleRepo::get_actions_for_role(conn, permission.role_id).await?;
            permission.allows(&role_actions, PermissionAction::Admin)
        }
    })
}
