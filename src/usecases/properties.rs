//! Property schema inspection for filter UIs

use crate::domain::PermissionAction;
use crate::error::{RagError, Result};
use crate::rbac::PermissionChecker;
use crate::store::{PropertyRepo, PropertySchemaItem, UnitOfWork};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Display labels for well-known property keys; unknown keys fall back to
/// the key itself.
const PROPERTY_KEY_LABELS: &[(&str, &str)] = &[
    ("title", "Title"),
    ("author", "Author"),
    ("created_date", "Created date"),
    ("modified_date", "Modified date"),
    ("page_count", "Page count"),
    ("language", "Language"),
    ("source_file_name", "File name"),
    ("source_file_type", "File type"),
];

/// Human-readable label for a property key
pub fn property_key_label(key: &str) -> &str {
    PROPERTY_KEY_LABELS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, label)| *label)
        .unwrap_or(key)
}

/// Lists the distinct property keys, types and sample values of a collection
pub struct PropertySchemaService {
    pool: PgPool,
    permissions: Arc<dyn PermissionChecker>,
}

impl PropertySchemaService {
    pub fn new(pool: PgPool, permissions: Arc<dyn PermissionChecker>) -> Self {
        Self { pool, permissions }
    }

    pub async fn schema(
        &self,
        subject: &str,
        collection_id: Uuid,
    ) -> Result<Vec<PropertySchemaItem>> {
        if !self
            .permissions
            .check(subject, collection_id, PermissionAction::Read)
            .await?
        {
            return Err(RagError::permission_denied(PermissionAction::Read));
        }

        let mut uow = UnitOfWork::begin(&self.pool).await?;
        let schema = PropertyRepo::list_schema_by_collection(uow.conn(), collection_id).await?;
        uow.commit().await?;
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_key_labels() {
        assert_eq!(property_key_label("title"), "Title");
        assert_eq!(property_key_label("source_file_name"), "File name");
    }

    #[test]
    fn test_unknown_key_falls_back_to_key() {
        assert_eq!(property_key_label("department"), "department");
    }
}
