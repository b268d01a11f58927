//! Matching engine: normalization, similarity scoring, the inventory index,
//! the tiered batch matcher, and interactive candidate search.

pub mod index;
pub mod matcher;
pub mod normalize;
pub mod search;
pub mod similarity;

pub use index::{IndexedEntry, InventoryIndex};
pub use matcher::match_rows;
pub use search::search_candidates;
