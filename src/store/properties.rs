//! Property repository and the filter-schema inspector

use crate::domain::{Property, PropertyType};
use crate::error::Result;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use std::str::FromStr;
use uuid::Uuid;

/// Distinct values returned per string/bool key in the schema listing
const SCHEMA_VALUES_CAP: i64 = 500;

/// Key, declared type and (for enumerable types) distinct values of one
/// property across a collection. Drives filter UIs.
#[derive(Debug, Clone)]
pub struct PropertySchemaItem {
    pub key: String,
    pub property_type: PropertyType,
    pub values: Vec<String>,
}

pub struct PropertyRepo;

impl PropertyRepo {
    pub async fn list_by_document(
        conn: &mut PgConnection,
        document_id: Uuid,
    ) -> Result<Vec<Property>> {
        let rows: Vec<(Uuid, String, String, String)> = sqlx::query_as(
            "SELECT document_id, key, value, property_type \
             FROM property WHERE document_id = $1 ORDER BY key",
        )
        .bind(document_id)
        .fetch_all(conn)
        .await?;

        rows.into_iter()
            .map(|(document_id, key, value, property_type)| {
                Ok(Property {
                    document_id,
                    key,
                    value,
                    property_type: PropertyType::from_str(&property_type)?,
                })
            })
            .collect()
    }

    /// Insert properties in one statement. No-op on an empty batch.
    pub async fn create_batch(conn: &mut PgConnection, properties: &[Property]) -> Result<()> {
        if properties.is_empty() {
            return Ok(());
        }
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO property (document_id, key, value, property_type) ");
        qb.push_values(properties, |mut b, p| {
            b.push_bind(p.document_id)
                .push_bind(p.key.clone())
                .push_bind(p.value.clone())
                .push_bind(p.property_type.as_str());
        });
        qb.build().execute(conn).await?;
        Ok(())
    }

    pub async fn delete_by_document(conn: &mut PgConnection, document_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM property WHERE document_id = $1")
            .bind(document_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Distinct `(key, type)` pairs across the non-deleted documents whose
    /// packs are attached to the collection; string and bool keys also carry
    /// their distinct values, sorted ascending and capped.
    pub async fn list_schema_by_collection(
        conn: &mut PgConnection,
        collection_id: Uuid,
    ) -> Result<Vec<PropertySchemaItem>> {
        let pairs: Vec<(String, String)> = sqlx::query_as(
            "SELECT DISTINCT pr.key, pr.property_type \
             FROM property pr \
             JOIN document d ON d.id = pr.document_id AND d.deleted_at IS NULL \
             JOIN pack p ON p.document_id = d.id AND p.deleted_at IS NULL \
             JOIN pack_collection pc ON pc.pack_id = p.id \
             WHERE pc.collection_id = $1 \
             ORDER BY pr.key, pr.property_type",
        )
        .bind(collection_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut items = Vec::with_capacity(pairs.len());
        for (key, raw_type) in pairs {
            let property_type = PropertyType::from_str(&raw_type)?;
            let values = match property_type {
                PropertyType::String | PropertyType::Bool => {
                    Self::distinct_values(conn, collection_id, &key, property_type).await?
                }
                _ => vec![],
            };
            items.push(PropertySchemaItem {
                key,
                property_type,
                values,
            });
        }
        Ok(items)
    }

    async fn distinct_values(
        conn: &mut PgConnection,
        collection_id: Uuid,
        key: &str,
        property_type: PropertyType,
    ) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT pr.value \
             FROM property pr \
             JOIN document d ON d.id = pr.document_id AND d.deleted_at IS NULL \
             JOIN pack p ON p.document_id = d.id AND p.deleted_at IS NULL \
             JOIN pack_collection pc ON pc.pack_id = p.id \
             WHERE pc.collection_id = $1 AND pr.key = $2 AND pr.property_type = $3 \
             ORDER BY pr.value ASC LIMIT $4",
        )
        .bind(collection_id)
        .bind(key)
        .bind(property_type.as_str())
        .bind(SCHEMA_VALUES_CAP)
        .fetch_all(conn)
        .await?;
        Ok(rows.into_iter().map(|(v,)| v).collect())
    }
}
