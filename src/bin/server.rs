//! RagStore server binary: composition root

use ragstore::api::{start_server, AppState};
use ragstore::config::Settings;
use ragstore::store::{connect_pool, initialize_schema};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;

    let filter = EnvFilter::try_new(&settings.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(version = ragstore::VERSION, "starting ragstore");

    let pool = connect_pool(&settings).await?;
    initialize_schema(&pool, settings.embedding_dimensions).await?;

    let state = AppState::new(settings.clone(), pool);
    start_server(state, &settings.server_host, settings.server_port).await?;

    Ok(())
}
