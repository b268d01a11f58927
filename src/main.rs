//! waxmatch - playlist import and vinyl inventory matching service

use std::path::Path;

use anyhow::Result;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use waxmatch::config::AppConfig;
use waxmatch::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting waxmatch playlist matching service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load()?;

    let db_pool = waxmatch::db::init_database_pool(Path::new(&config.database_path)).await?;
    info!("Database connection established");

    let listen_addr = config.listen_addr.clone();
    let state = AppState::new(db_pool, config)?;
    let app = waxmatch::build_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!("Listening on http://{listen_addr}");
    info!("Health check: http://{listen_addr}/health");

    axum::serve(listener, app).await?;

    Ok(())
}
