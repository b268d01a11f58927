//! Playlist import endpoint

use axum::{
    extract::State,
    http::{header, HeaderMap},
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::services::{import_playlist, ImportOutcome, ImportRequest};
use crate::AppState;

/// POST /api/playlists/import request
#[derive(Debug, Deserialize)]
pub struct ImportPlaylistRequest {
    /// Upstream playlist id
    pub playlist_id: String,
    /// Optional name override for the created playlist
    pub playlist_name: Option<String>,
}

/// Bearer token from the Authorization header, if present.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// POST /api/playlists/import
///
/// Runs one full import. Degraded outcomes (partial import, unmatched rows)
/// still return 200 with the degradation spelled out in the body; failures
/// return the pipeline step and fetch diagnostics.
pub async fn import_playlist_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ImportPlaylistRequest>,
) -> ApiResult<Json<ImportOutcome>> {
    let playlist_id = request.playlist_id.trim();
    if playlist_id.is_empty() {
        return Err(ApiError::BadRequest("playlist_id is required".to_string()));
    }

    let import_request = ImportRequest {
        playlist_id: playlist_id.to_string(),
        playlist_name: request.playlist_name,
        credential: bearer_token(&headers).unwrap_or_default(),
    };

    tracing::info!(playlist = %import_request.playlist_id, "Import requested");

    match import_playlist(
        state.source.as_ref(),
        &state.db,
        &state.index_cache,
        &state.config,
        &import_request,
    )
    .await
    {
        Ok(outcome) => Ok(Json(outcome)),
        Err(error) => {
            *state.last_error.write().await = Some(error.to_string());
            Err(ApiError::Import(error))
        }
    }
}

/// Build import routes
pub fn import_routes() -> Router<AppState> {
    Router::new().route("/api/playlists/import", post(import_playlist_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def.ghi"));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("basic dXNlcg=="),
        );
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
