//! SQLite access for waxmatch
//!
//! Inventory tables are read-only from this service's point of view (they
//! are owned by the collection manager); playlists and playlist items are
//! the only tables this service writes.

pub mod inventory;
pub mod playlists;

use std::path::Path;

use anyhow::Result;
use sqlx::SqlitePool;

/// Initialize database connection pool
///
/// Connects with mode=rwc (read, write, create) and ensures this service's
/// tables exist.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create tables if they don't exist.
pub(crate) async fn init_tables(pool: &SqlitePool) -> Result<()> {
    // Collection-side tables. Normally pre-populated by the collection
    // manager; created here so a fresh database still opens.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS releases (
            id INTEGER PRIMARY KEY,
            artist TEXT,
            title TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recordings (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            track_artist TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS release_tracks (
            release_id INTEGER NOT NULL,
            recording_id INTEGER NOT NULL,
            position TEXT,
            side TEXT,
            title_override TEXT,
            PRIMARY KEY (release_id, recording_id, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS inventory (
            id INTEGER PRIMARY KEY,
            release_id INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Tables owned by this service.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS playlists (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS playlist_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            playlist_id INTEGER NOT NULL REFERENCES playlists(id),
            track_key TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            UNIQUE (playlist_id, track_key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
