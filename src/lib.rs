//! waxmatch library interface
//!
//! Playlist import and inventory matching: exposes the matching engine,
//! index cache, import orchestrator, and the HTTP surface over them.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod matching;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::cache::{IndexCache, SystemClock};
use crate::config::AppConfig;
use crate::services::PlaylistApiClient;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    /// Upstream playlist API client
    pub source: Arc<PlaylistApiClient>,
    /// Per-caller inventory index cache
    pub index_cache: IndexCache,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last import error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: AppConfig) -> Result<Self> {
        let source = PlaylistApiClient::new(&config.source_api_base_url, config.page_timeout())
            .map_err(|e| anyhow::anyhow!("failed to build playlist API client: {e}"))?;
        let index_cache = IndexCache::new(config.matching.index_ttl(), Arc::new(SystemClock));
        Ok(Self {
            db,
            config: Arc::new(config),
            source: Arc::new(source),
            index_cache,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        })
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::import_routes())
        .merge(api::search_routes())
        .merge(api::health_routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
