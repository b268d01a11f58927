//! HTTP API handlers for waxmatch

pub mod health;
pub mod import;
pub mod search;

pub use health::health_routes;
pub use import::import_routes;
pub use search::search_routes;
