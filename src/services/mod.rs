//! Service modules: the upstream playlist API client and the import
//! orchestrator that drives it.

pub mod importer;
pub mod playlist_api;

pub use importer::{
    import_playlist, sanitize_playlist_name, ImportError, ImportErrorKind, ImportOutcome,
    ImportRequest, ImportSource, ImportStep,
};
pub use playlist_api::{PlaylistApiClient, PlaylistSource, SourceApiError};
