//! Schema initialization and role seeding
//!
//! Everything here is idempotent so the server can run it on every startup.

use crate::error::Result;
use sqlx::PgPool;
use tracing::info;

/// Create tables, indexes and seed roles.
///
/// `embedding_dimensions` fixes the width of the chunk embedding column;
/// configurations with a different width are rejected at creation time and
/// would otherwise fail on insert.
pub async fn initialize_schema(pool: &PgPool, embedding_dimensions: u32) -> Result<()> {
    info!(embedding_dimensions, "initializing database schema");

    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS role (
            id UUID PRIMARY KEY,
            name VARCHAR(50) NOT NULL UNIQUE,
            description VARCHAR(255)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS role_permission (
            role_id UUID NOT NULL REFERENCES role(id) ON DELETE CASCADE,
            action VARCHAR(50) NOT NULL,
            PRIMARY KEY (role_id, action)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS configuration (
            id UUID PRIMARY KEY,
            chunking_strategy VARCHAR(50) NOT NULL,
            embedding_model VARCHAR(255) NOT NULL,
            embedding_dimensions INTEGER NOT NULL,
            chunk_size INTEGER NOT NULL,
            chunk_overlap INTEGER NOT NULL,
            name VARCHAR(255)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document (
            id UUID PRIMARY KEY,
            content TEXT NOT NULL,
            source_hash BYTEA NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            deleted_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Enforces dedup under concurrent ingestion: at most one live document
    // per content hash. Soft-deleted rows do not participate.
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_document_source_hash_live \
         ON document (source_hash) WHERE deleted_at IS NULL",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collection (
            id UUID PRIMARY KEY,
            configuration_id UUID NOT NULL REFERENCES configuration(id),
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            deleted_at TIMESTAMPTZ,
            name VARCHAR(255)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pack (
            id UUID PRIMARY KEY,
            document_id UUID NOT NULL REFERENCES document(id) ON DELETE CASCADE,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            deleted_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS chunk (
            id UUID PRIMARY KEY,
            pack_id UUID NOT NULL REFERENCES pack(id) ON DELETE CASCADE,
            content TEXT NOT NULL,
            embedding VECTOR({}) NOT NULL,
            position INTEGER NOT NULL
        )
        "#,
        embedding_dimensions
    ))
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS ix_chunk_pack_id ON chunk (pack_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS property (
            document_id UUID NOT NULL REFERENCES document(id) ON DELETE CASCADE,
            key VARCHAR(255) NOT NULL,
            value TEXT NOT NULL,
            property_type VARCHAR(50) NOT NULL,
            PRIMARY KEY (document_id, key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS permission (
            id UUID PRIMARY KEY,
            collection_id UUID NOT NULL REFERENCES collection(id) ON DELETE CASCADE,
            subject VARCHAR(255) NOT NULL,
            role_id UUID NOT NULL REFERENCES role(id),
            actions_override JSONB,
            created_at TIMESTAMPTZ NOT NULL,
            created_by VARCHAR(255)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS ux_permission_collection_subject \
         ON permission (collection_id, subject)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pack_collection (
            pack_id UUID NOT NULL REFERENCES pack(id) ON DELETE CASCADE,
            collection_id UUID NOT NULL REFERENCES collection(id) ON DELETE CASCADE,
            PRIMARY KEY (pack_id, collection_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    seed_roles(pool).await?;

    info!("database schema ready");
    Ok(())
}

/// Seeded roles and their action sets
const ROLE_SEEDS: &[(&str, &str, &[&str])] = &[
    ("viewer", "Read-only access", &["read"]),
    ("editor", "Read and write access", &["read", "write"]),
    (
        "admin",
        "Full access including migrate",
        &["read", "write", "delete", "admin", "migrate"],
    ),
];

async fn seed_roles(pool: &PgPool) -> Result<()> {
    for (name, description, actions) in ROLE_SEEDS {
        sqlx::query(
            "INSERT INTO role (id, name, description) VALUES (gen_random_uuid(), $1, $2) \
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(name)
        .bind(description)
        .execute(pool)
        .await?;

        for action in *actions {
            sqlx::query(
                "INSERT INTO role_permission (role_id, action) \
                 SELECT id, $2 FROM role WHERE name = $1 \
                 ON CONFLICT DO NOTHING",
            )
            .bind(name)
            .bind(action)
            .execute(pool)
            .await?;
        }
    }
    Ok(())
}
