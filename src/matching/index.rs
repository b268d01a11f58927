//! Inventory lookup index
//!
//! Three lookup structures built in one pass over all owned tracks:
//! an exact composite-key map, title-only buckets, and an inverted token
//! index. Normalized forms are computed once per track at build time so the
//! scorer never re-normalizes inside a hot loop.

use std::collections::{HashMap, HashSet};

use crate::matching::normalize::{normalize, normalize_artist, normalize_title};
use crate::models::{InventoryTrack, MatchCandidate};

/// One inventory track with its precomputed normalized forms.
#[derive(Debug, Clone)]
pub struct IndexedEntry {
    pub track: InventoryTrack,
    /// Normalized title (noise-stripped); never empty for an indexed entry.
    pub norm_title: String,
    /// Normalized artist; may be empty.
    pub norm_artist: String,
    /// Base-normalized "title artist" concatenation, for combined search
    /// comparisons.
    pub norm_full: String,
    /// `"<inventory_id>:<position>"`, empty if unkeyable.
    pub track_key: String,
}

impl IndexedEntry {
    /// Build an entry from a raw track. Returns `None` when the title
    /// normalizes to empty; such tracks are unmatchable and never indexed.
    pub fn from_track(track: InventoryTrack) -> Option<Self> {
        let norm_title = normalize_title(&track.title);
        if norm_title.is_empty() {
            return None;
        }
        let norm_artist = normalize_artist(&track.artist);
        let norm_full = normalize(&format!("{} {}", track.title, track.artist));
        let track_key = track.track_key();
        Some(Self {
            track,
            norm_title,
            norm_artist,
            norm_full,
            track_key,
        })
    }

    /// Project this entry into a reportable candidate with its score rounded
    /// to three decimals.
    pub fn to_candidate(&self, score: f64) -> MatchCandidate {
        MatchCandidate {
            track_key: self.track_key.clone(),
            inventory_id: self.track.inventory_id,
            title: self.track.title.clone(),
            artist: self.track.artist.clone(),
            side: self.track.side.clone(),
            position: self.track.position.clone(),
            score: (score * 1000.0).round() / 1000.0,
        }
    }
}

/// Composite exact-lookup key: `"<normTitle>::<normArtist>"`.
pub fn full_key(title_key: &str, artist_key: &str) -> String {
    format!("{title_key}::{artist_key}")
}

/// The three lookup structures over all owned tracks.
///
/// Buckets hold indices into `entries`. `exact` keeps only the first-seen
/// track per key (a deliberate tie-break: duplicate (title, artist) pairs
/// should not overwrite each other in scan order); `title_only` and
/// `by_token` accumulate every track sharing a key, in scan order.
#[derive(Debug, Default)]
pub struct InventoryIndex {
    entries: Vec<IndexedEntry>,
    exact: HashMap<String, usize>,
    title_only: HashMap<String, Vec<usize>>,
    by_token: HashMap<String, Vec<usize>>,
}

impl InventoryIndex {
    /// Single pass over all owned tracks. Cost is O(tracks x avg tokens),
    /// acceptable because the index is rebuilt at most once per cache TTL
    /// per caller.
    pub fn build(tracks: &[InventoryTrack]) -> Self {
        let mut index = Self::default();
        for track in tracks {
            let Some(entry) = IndexedEntry::from_track(track.clone()) else {
                continue;
            };
            let idx = index.entries.len();
            let key = full_key(&entry.norm_title, &entry.norm_artist);
            index.exact.entry(key).or_insert(idx);
            index
                .title_only
                .entry(entry.norm_title.clone())
                .or_default()
                .push(idx);

            let mut seen_tokens = HashSet::new();
            for token in entry
                .norm_title
                .split_whitespace()
                .chain(entry.norm_artist.split_whitespace())
            {
                if seen_tokens.insert(token.to_string()) {
                    index.by_token.entry(token.to_string()).or_default().push(idx);
                }
            }
            index.entries.push(entry);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, idx: usize) -> &IndexedEntry {
        &self.entries[idx]
    }

    /// First-seen track for a normalized (title, artist) composite key.
    pub fn exact_lookup(&self, title_key: &str, artist_key: &str) -> Option<&IndexedEntry> {
        self.exact
            .get(&full_key(title_key, artist_key))
            .map(|&idx| &self.entries[idx])
    }

    /// All tracks sharing a normalized title, in scan order.
    pub fn title_bucket(&self, title_key: &str) -> &[usize] {
        self.title_only.get(title_key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Posting list for one normalized token, in scan order.
    pub fn token_postings(&self, token: &str) -> &[usize] {
        self.by_token.get(token).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Title buckets whose key starts with `prefix`, for the sparse-pool
    /// fallback scan. Bucket visit order is unspecified.
    pub fn title_buckets_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = &'a [usize]> + 'a {
        self.title_only
            .iter()
            .filter(move |(key, _)| key.starts_with(prefix))
            .map(|(_, bucket)| bucket.as_slice())
    }
}
