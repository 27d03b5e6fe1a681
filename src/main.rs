mod config;
mod db;
mod delivery;
mod frame;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use config::{AppConfig, ConfigError};
use services::history::PgMessageStore;
use services::ticket::PgTicketVerifier;

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database init failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("server io: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "chat-relay failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let config = AppConfig::from_env()?;
    let port = config.port;

    let pool = db::init_pool(&config.database_url, config.db_max_connections).await?;
    let store = Arc::new(PgMessageStore::new(pool.clone()));
    let tickets = Arc::new(PgTicketVerifier::new(pool));
    let state = state::AppState::new(config, store, tickets);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;

    tracing::info!(%port, "chat-relay listening");
    axum::serve(listener, app).await?;
    Ok(())
}
