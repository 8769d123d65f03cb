//! Configuration repository

use crate::domain::{ChunkingStrategy, Configuration};
use crate::error::Result;
use crate::store::paginate;
use sqlx::PgConnection;
use std::str::FromStr;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct ConfigurationRow {
    id: Uuid,
    chunking_strategy: String,
    embedding_model: String,
    embedding_dimensions: i32,
    chunk_size: i32,
    chunk_overlap: i32,
    name: Option<String>,
}

impl ConfigurationRow {
    fn into_entity(self) -> crate::error::Result<Configuration> {
        Ok(Configuration {
            id: self.id,
            chunking_strategy: ChunkingStrategy::from_str(&self.chunking_strategy)?,
            embedding_model: self.embedding_model,
            embedding_dimensions: self.embedding_dimensions,
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            name: self.name,
        })
    }
}

const COLUMNS: &str = "id, chunking_strategy, embedding_model, embedding_dimensions, \
                       chunk_size, chunk_overlap, name";

pub struct ConfigurationRepo;

impl ConfigurationRepo {
    pub async fn get_by_id(
        conn: &mut PgConnection,
        configuration_id: Uuid,
    ) -> Result<Option<Configuration>> {
        let row: Option<ConfigurationRow> =
            sqlx::query_as(&format!("SELECT {} FROM configuration WHERE id = $1", COLUMNS))
                .bind(configuration_id)
                .fetch_optional(conn)
                .await?;
        row.map(ConfigurationRow::into_entity).transpose()
    }

    /// The configuration a collection is pinned to
    pub async fn get_by_collection_id(
        conn: &mut PgConnection,
        collection_id: Uuid,
    ) -> Result<Option<Configuration>> {
        let row: Option<ConfigurationRow> = sqlx::query_as(
            "SELECT c.id, c.chunking_strategy, c.embedding_model, c.embedding_dimensions, \
             c.chunk_size, c.chunk_overlap, c.name \
             FROM configuration c JOIN collection col ON col.configuration_id = c.id \
             WHERE col.id = $1",
        )
        .bind(collection_id)
        .fetch_optional(conn)
        .await?;
        row.map(ConfigurationRow::into_entity).transpose()
    }

    pub async fn list(
        conn: &mut PgConnection,
        cursor: Option<Uuid>,
        limit: i64,
    ) -> Result<(Vec<Configuration>, Option<Uuid>)> {
        let mut q = format!("SELECT {} FROM configuration", COLUMNS);
        if cursor.is_some() {
            q.push_str(" WHERE id > $1");
        }
        q.push_str(&format!(" ORDER BY id LIMIT {}", limit + 1));

        let query = sqlx::query_as::<_, ConfigurationRow>(&q);
        let rows = match cursor {
            Some(c) => query.bind(c).fetch_all(conn).await?,
            None => query.fetch_all(conn).await?,
        };
        let configs: Vec<Configuration> = rows
            .into_iter()
            .map(ConfigurationRow::into_entity)
            .collect::<Result<_>>()?;
        Ok(paginate(configs, limit, |c| c.id))
    }

    pub async fn create(conn: &mut PgConnection, configuration: &Configuration) -> Result<()> {
        sqlx::query(
            "INSERT INTO configuration (id, chunking_strategy, embedding_model, \
             embedding_dimensions, chunk_size, chunk_overlap, name) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(configuration.id)
        .bind(configuration.chunking_strategy.as_str())
        .bind(&configuration.embedding_model)
        .bind(configuration.embedding_dimensions)
        .bind(configuration.chunk_size)
        .bind(configuration.chunk_overlap)
        .bind(&configuration.name)
        .execute(conn)
        .await?;
        Ok(())
    }
}
