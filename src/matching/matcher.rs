//! Tiered batch matching of external rows against the inventory index
//!
//! Per row, the first applicable tier wins:
//! 1. exact normalized (title, artist) key
//! 2. unambiguous title bucket (a single owner of the title)
//! 3. ambiguous title bucket, scored, with auto-accept thresholds
//! 4. token-pool search, scored, with stricter thresholds (the pool is
//!    noisier than a title bucket)
//!
//! Anything below threshold lands in `missing` with ranked candidates for
//! manual review: an ambiguous row is never silently guessed.

use std::collections::HashSet;

use crate::config::MatchingConfig;
use crate::matching::index::InventoryIndex;
use crate::matching::normalize::{normalize_artist, normalize_title};
use crate::matching::similarity::score_candidate;
use crate::models::{ExternalTrackRow, MatchCandidate, MatchOutcome, MissingRow};

/// Resolve a batch of external rows. Row order is preserved in both
/// `matched` and `missing`; a row resolves to at most one track, and
/// cross-row deduplication is left to the caller.
pub fn match_rows(
    rows: &[ExternalTrackRow],
    index: &InventoryIndex,
    config: &MatchingConfig,
) -> MatchOutcome {
    let mut outcome = MatchOutcome::default();

    for row in rows {
        let title_key = normalize_title(&row.title);
        if title_key.is_empty() {
            // Unmatchable, not an error.
            continue;
        }
        let artist_key = normalize_artist(row.artist.as_deref().unwrap_or(""));

        if let Some(entry) = index.exact_lookup(&title_key, &artist_key) {
            outcome.matched.push(entry.track.clone());
            continue;
        }

        let bucket = index.title_bucket(&title_key);
        if bucket.len() == 1 {
            // Sole owner of this title: accept even when the artist text
            // disagrees entirely.
            outcome.matched.push(index.entry(bucket[0]).track.clone());
            continue;
        }

        if bucket.len() > 1 {
            let scored = score_entries(index, bucket.iter().copied(), &title_key, &artist_key);
            let (best_idx, best_score) = scored[0];
            let margin = best_score - scored[1].1;
            if best_score >= config.title_bucket_accept
                || (best_score >= config.title_bucket_margin_accept
                    && margin >= config.accept_margin)
            {
                outcome.matched.push(index.entry(best_idx).track.clone());
                outcome.fuzzy_matched_count += 1;
            } else {
                outcome.missing.push(missing_row(row, index, &scored, config));
            }
            continue;
        }

        // No title-bucket hit at all: pool candidates by token overlap.
        let pool = collect_pool(
            index,
            &title_key,
            &artist_key,
            config.matcher_pool_cap,
            config.title_prefix_len,
        );
        let scored: Vec<(usize, f64)> =
            score_entries(index, pool.into_iter(), &title_key, &artist_key)
                .into_iter()
                .filter(|&(_, score)| score >= config.min_candidate_score)
                .take(config.max_candidates)
                .collect();

        if let Some(&(best_idx, best_score)) = scored.first() {
            let margin = scored
                .get(1)
                .map(|&(_, second)| best_score - second)
                .unwrap_or(best_score);
            if best_score >= config.pool_accept && margin >= config.accept_margin {
                outcome.matched.push(index.entry(best_idx).track.clone());
                outcome.fuzzy_matched_count += 1;
                continue;
            }
        }

        outcome.missing.push(MissingRow {
            title: row.title.clone(),
            artist: row.artist.clone(),
            candidates: scored
                .iter()
                .map(|&(idx, score)| index.entry(idx).to_candidate(score))
                .collect(),
        });
    }

    outcome
}

/// Score a set of entries against a normalized row and sort descending.
fn score_entries(
    index: &InventoryIndex,
    entries: impl Iterator<Item = usize>,
    title_key: &str,
    artist_key: &str,
) -> Vec<(usize, f64)> {
    let mut scored: Vec<(usize, f64)> = entries
        .map(|idx| (idx, score_candidate(title_key, artist_key, index.entry(idx))))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored
}

fn missing_row(
    row: &ExternalTrackRow,
    index: &InventoryIndex,
    scored: &[(usize, f64)],
    config: &MatchingConfig,
) -> MissingRow {
    let candidates: Vec<MatchCandidate> = scored
        .iter()
        .filter(|&&(_, score)| score >= config.min_candidate_score)
        .take(config.max_candidates)
        .map(|&(idx, score)| index.entry(idx).to_candidate(score))
        .collect();
    MissingRow {
        title: row.title.clone(),
        artist: row.artist.clone(),
        candidates,
    }
}

/// Union the posting lists for every token of the normalized row, capped and
/// deduplicated by track key. When no token hits at all, fall back to a
/// prefix scan over the title buckets so near-miss spellings still surface.
/// Unkeyable tracks are skipped: they could never become playlist items.
pub(crate) fn collect_pool(
    index: &InventoryIndex,
    title_key: &str,
    artist_key: &str,
    cap: usize,
    prefix_len: usize,
) -> Vec<usize> {
    let mut tokens: Vec<&str> = Vec::new();
    let mut seen_tokens = HashSet::new();
    for token in title_key
        .split_whitespace()
        .chain(artist_key.split_whitespace())
    {
        if seen_tokens.insert(token) {
            tokens.push(token);
        }
    }

    let mut pool: Vec<usize> = Vec::new();
    let mut seen_keys: HashSet<&str> = HashSet::new();
    'tokens: for token in tokens {
        for &idx in index.token_postings(token) {
            let entry = index.entry(idx);
            if entry.track_key.is_empty() {
                continue;
            }
            if seen_keys.insert(entry.track_key.as_str()) {
                pool.push(idx);
            }
            if pool.len() >= cap {
                break 'tokens;
            }
        }
    }

    if pool.is_empty() {
        let prefix: String = title_key.chars().take(prefix_len).collect();
        for bucket in index.title_buckets_with_prefix(&prefix) {
            for &idx in bucket {
                let entry = index.entry(idx);
                if entry.track_key.is_empty() {
                    continue;
                }
                if seen_keys.insert(entry.track_key.as_str()) {
                    pool.push(idx);
                }
            }
            if pool.len() >= cap {
                break;
            }
        }
    }

    pool
}
