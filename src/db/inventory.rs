//! Inventory track queries
//!
//! Flattens the collection schema (inventory copies -> releases -> tracks ->
//! recordings) into the denormalized rows the index builder consumes.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::models::InventoryTrack;

/// Load every owned track, one row per distinct (release, track) pair.
///
/// Owning multiple copies of a release must not duplicate its tracks in
/// match results, so copies collapse to the lowest inventory id. The artist
/// falls back from the per-track credit to the release artist, then to a
/// placeholder so the row still indexes by title.
pub async fn fetch_inventory_tracks(pool: &SqlitePool) -> Result<Vec<InventoryTrack>> {
    let rows = sqlx::query(
        r#"
        SELECT
            MIN(inv.id) AS inventory_id,
            rec.id AS recording_id,
            COALESCE(NULLIF(rt.title_override, ''), rec.title) AS title,
            COALESCE(NULLIF(rec.track_artist, ''), NULLIF(rel.artist, ''), 'Unknown Artist') AS artist,
            rt.side AS side,
            rt.position AS position
        FROM inventory inv
        JOIN releases rel ON rel.id = inv.release_id
        JOIN release_tracks rt ON rt.release_id = rel.id
        JOIN recordings rec ON rec.id = rt.recording_id
        GROUP BY inv.release_id, rt.recording_id, rt.position
        ORDER BY inventory_id, position
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| InventoryTrack {
            inventory_id: row.get("inventory_id"),
            recording_id: row.get("recording_id"),
            title: row.get("title"),
            artist: row.get("artist"),
            side: row.get("side"),
            position: row.get("position"),
        })
        .collect())
}
