//! Interactive inventory search
//!
//! Free-text candidate lookup for manual disambiguation: the operator types
//! a title (and maybe an artist) and picks from ranked suggestions. Reuses
//! the matcher's token pooling with a larger cap and a lower score floor,
//! since a human reviews every result.

use std::collections::HashSet;

use crate::config::MatchingConfig;
use crate::matching::index::InventoryIndex;
use crate::matching::matcher::collect_pool;
use crate::matching::normalize::{normalize_artist, normalize_title};
use crate::matching::similarity::score_search_candidate;
use crate::models::MatchCandidate;

/// Rank inventory candidates for a free-text query.
///
/// The candidate set is the exact title bucket merged with the token pool,
/// deduplicated by track key; only addressable tracks (non-empty key) are
/// returned. `limit` is clamped to `1..=search_limit_max`. A query whose
/// title normalizes to empty is unmatchable and yields no results, artist
/// input or not.
pub fn search_candidates(
    index: &InventoryIndex,
    title: &str,
    artist: &str,
    limit: usize,
    config: &MatchingConfig,
) -> Vec<MatchCandidate> {
    let title_key = normalize_title(title);
    if title_key.is_empty() {
        return Vec::new();
    }
    let artist_key = normalize_artist(artist);
    let limit = limit.clamp(1, config.search_limit_max);

    let mut pool: Vec<usize> = Vec::new();
    let mut seen_keys: HashSet<String> = HashSet::new();
    for &idx in index.title_bucket(&title_key) {
        let entry = index.entry(idx);
        if entry.track_key.is_empty() {
            continue;
        }
        if seen_keys.insert(entry.track_key.clone()) {
            pool.push(idx);
        }
    }
    for idx in collect_pool(
        index,
        &title_key,
        &artist_key,
        config.search_pool_cap,
        config.title_prefix_len,
    ) {
        let entry = index.entry(idx);
        if seen_keys.insert(entry.track_key.clone()) {
            pool.push(idx);
        }
    }

    let mut scored: Vec<(usize, f64)> = pool
        .into_iter()
        .map(|idx| {
            (
                idx,
                score_search_candidate(&title_key, &artist_key, index.entry(idx)),
            )
        })
        .filter(|&(_, score)| score >= config.min_search_score)
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    scored
        .into_iter()
        .take(limit)
        .map(|(idx, score)| index.entry(idx).to_candidate(score))
        .collect()
}
