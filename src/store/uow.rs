//! Connection pool and transactional unit of work

use crate::config::Settings;
use crate::error::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::info;

/// Open the shared connection pool.
///
/// Acquisition beyond the configured timeout surfaces as a retriable
/// unavailable error rather than blocking the request indefinitely.
pub async fn connect_pool(settings: &Settings) -> Result<PgPool> {
    info!(
        max_connections = settings.pool_max_connections,
        "connecting to database"
    );
    let pool = PgPoolOptions::new()
        .max_connections(settings.pool_max_connections)
        .acquire_timeout(Duration::from_secs(settings.pool_acquire_timeout_secs))
        .connect(&settings.database_url)
        .await?;
    Ok(pool)
}

/// One unit of work: one connection, one transaction.
///
/// All repository operations issued through [`UnitOfWork::conn`] run on the
/// same transaction. [`UnitOfWork::commit`] consumes the unit of work; if it
/// is dropped instead (error paths, cancellation), the transaction rolls
/// back. Nesting is not supported.
pub struct UnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl UnitOfWork {
    pub async fn begin(pool: &PgPool) -> Result<Self> {
        let tx = pool.begin().await?;
        Ok(Self { tx })
    }

    /// The transaction's connection, for repository operations
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
