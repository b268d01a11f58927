//! Bigram-overlap similarity scoring
//!
//! Confidence scores in [0, 1] over normalized strings. Titles are weighted
//! above artists because artist text varies far more across sources
//! ("Beatles", "The Beatles", "Beatles, The") than titles do; exact-equality
//! boosts reward clean hits without letting them drown out fuzzy candidates.

use std::collections::HashMap;

use crate::matching::index::IndexedEntry;

/// Weight of the artist score when the incoming row carries an artist.
const ARTIST_WEIGHT: f64 = 0.40;
/// Artist weight for open-ended search queries (slightly lower: search
/// artist input is even less reliable than playlist metadata).
const SEARCH_ARTIST_WEIGHT: f64 = 0.35;
/// Boost for exact normalized-title equality.
const EXACT_TITLE_BOOST: f64 = 0.15;
/// Boost for exact normalized-artist equality.
const EXACT_ARTIST_BOOST: f64 = 0.10;

/// Dice coefficient over character-bigram multisets.
///
/// Equal strings score 1.0 (including both empty); if exactly one side is
/// empty, or either side is too short to form a bigram, the score is 0.0.
pub fn dice(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let a_bigrams = bigram_counts(a);
    let b_bigrams = bigram_counts(b);

    let mut overlap = 0u32;
    for (gram, count_a) in &a_bigrams {
        let count_b = b_bigrams.get(gram).copied().unwrap_or(0);
        overlap += (*count_a).min(count_b);
    }

    let total: u32 = a_bigrams.values().sum::<u32>() + b_bigrams.values().sum::<u32>();
    if total == 0 {
        return 0.0;
    }
    f64::from(2 * overlap) / f64::from(total)
}

/// Score one inventory entry against a normalized import row.
///
/// `row_title` / `row_artist` must already be normalized. When the row has
/// no artist, the title carries the full weight.
pub fn score_candidate(row_title: &str, row_artist: &str, entry: &IndexedEntry) -> f64 {
    let title_score = dice(row_title, &entry.norm_title);
    let artist_score = if row_artist.is_empty() {
        0.0
    } else {
        dice(row_artist, &entry.norm_artist)
    };

    let artist_weight = if row_artist.is_empty() { 0.0 } else { ARTIST_WEIGHT };
    let title_weight = 1.0 - artist_weight;

    let mut score = title_score * title_weight + artist_score * artist_weight;
    if row_title == entry.norm_title {
        score += EXACT_TITLE_BOOST;
    }
    if !row_artist.is_empty() && row_artist == entry.norm_artist {
        score += EXACT_ARTIST_BOOST;
    }
    score.min(1.0)
}

/// Score one inventory entry against an interactive search query.
///
/// Same fielded formula as [`score_candidate`] with a fixed search artist
/// weight, plus a combined "title artist" comparison on both sides. The
/// combined pass recovers single-field pastes like "Hey Jude The Beatles"
/// typed into the title box.
pub fn score_search_candidate(query_title: &str, query_artist: &str, entry: &IndexedEntry) -> f64 {
    let title_score = if query_title.is_empty() {
        0.0
    } else {
        dice(query_title, &entry.norm_title)
    };
    let artist_score = if query_artist.is_empty() {
        0.0
    } else {
        dice(query_artist, &entry.norm_artist)
    };

    let artist_weight = if query_artist.is_empty() {
        0.0
    } else {
        SEARCH_ARTIST_WEIGHT
    };
    let title_weight = 1.0 - artist_weight;

    let mut fielded = title_score * title_weight + artist_score * artist_weight;
    if !query_title.is_empty() && query_title == entry.norm_title {
        fielded += EXACT_TITLE_BOOST;
    }
    if !query_artist.is_empty() && query_artist == entry.norm_artist {
        fielded += EXACT_ARTIST_BOOST;
    }
    let fielded = fielded.min(1.0);

    let combined_query = format!("{} {}", query_title, query_artist);
    let combined_query = combined_query.trim();
    let combined = if combined_query.is_empty() {
        0.0
    } else {
        dice(combined_query, &entry.norm_full)
    };

    fielded.max(combined)
}

fn bigram_counts(value: &str) -> HashMap<(char, char), u32> {
    let chars: Vec<char> = value.chars().collect();
    let mut counts = HashMap::with_capacity(chars.len().saturating_sub(1));
    for pair in chars.windows(2) {
        *counts.entry((pair[0], pair[1])).or_insert(0) += 1;
    }
    counts
}
