//! Playlist persistence
//!
//! A playlist and its items are written in one transaction: a failed import
//! must never leave an empty or half-filled playlist behind.

use anyhow::Result;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Create a playlist and its items atomically, appending the playlist after
/// all existing ones. Returns the new playlist id.
///
/// `track_keys` must already be deduplicated; the unique constraint on
/// (playlist_id, track_key) turns a duplicate into a rollback.
pub async fn create_playlist_with_items(
    pool: &SqlitePool,
    name: &str,
    track_keys: &[String],
) -> Result<i64> {
    let mut tx = pool.begin().await?;
    let sort_order = next_playlist_sort_order(&mut tx).await?;
    let playlist_id = insert_playlist(&mut tx, name, sort_order).await?;
    for (position, track_key) in track_keys.iter().enumerate() {
        insert_playlist_item(&mut tx, playlist_id, track_key, position as i64).await?;
    }
    tx.commit().await?;
    Ok(playlist_id)
}

/// Next append position across all playlists.
async fn next_playlist_sort_order(conn: &mut SqliteConnection) -> Result<i64> {
    let row = sqlx::query("SELECT COALESCE(MAX(sort_order), -1) + 1 AS next FROM playlists")
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.get("next"))
}

async fn insert_playlist(conn: &mut SqliteConnection, name: &str, sort_order: i64) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO playlists (name, sort_order, created_at) VALUES (?, ?, CURRENT_TIMESTAMP)",
    )
    .bind(name)
    .bind(sort_order)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

async fn insert_playlist_item(
    conn: &mut SqliteConnection,
    playlist_id: i64,
    track_key: &str,
    sort_order: i64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO playlist_items (playlist_id, track_key, sort_order) VALUES (?, ?, ?)",
    )
    .bind(playlist_id)
    .bind(track_key)
    .bind(sort_order)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
