//! Caller-partitioned caching of the inventory index.

pub mod identity;
pub mod index_cache;

pub use identity::caller_key;
pub use index_cache::{Clock, IndexCache, RebuildError, SystemClock};
