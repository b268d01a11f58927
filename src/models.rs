//! Core records shared across the matching engine and import pipeline

use serde::{Deserialize, Serialize};

/// One track on one owned physical copy.
///
/// Derived transiently from the inventory data source on each index build;
/// not a standalone persisted aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryTrack {
    pub inventory_id: Option<i64>,
    pub recording_id: Option<i64>,
    pub title: String,
    pub artist: String,
    pub side: Option<String>,
    pub position: Option<String>,
}

impl InventoryTrack {
    /// Opaque key addressing this track: `"<inventory_id>:<position>"`.
    /// Empty when either half is missing; such tracks can still be matched
    /// but cannot become playlist items.
    pub fn track_key(&self) -> String {
        match (self.inventory_id, self.position.as_deref()) {
            (Some(id), Some(position)) if !position.is_empty() => format!("{id}:{position}"),
            _ => String::new(),
        }
    }
}

/// One row of an external playlist, known only by free text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalTrackRow {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
}

/// A scored inventory candidate for one external row or search query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub track_key: String,
    pub inventory_id: Option<i64>,
    pub title: String,
    pub artist: String,
    pub side: Option<String>,
    pub position: Option<String>,
    /// Confidence in [0, 1], rounded to three decimals.
    pub score: f64,
}

/// An external row the matcher could not resolve, with its ranked candidates
/// for manual disambiguation.
#[derive(Debug, Clone, Serialize)]
pub struct MissingRow {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    pub candidates: Vec<MatchCandidate>,
}

/// Result of matching a batch of external rows against the inventory index.
#[derive(Debug, Default)]
pub struct MatchOutcome {
    /// Resolved tracks, one per matched row, in row order. Cross-row
    /// deduplication is the import orchestrator's responsibility.
    pub matched: Vec<InventoryTrack>,
    pub missing: Vec<MissingRow>,
    /// How many of `matched` were resolved by scoring rather than an exact
    /// or unambiguous-title lookup.
    pub fuzzy_matched_count: usize,
}
