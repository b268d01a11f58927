//! Interactive inventory search endpoint

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::cache::identity;
use crate::db::inventory::fetch_inventory_tracks;
use crate::error::{ApiError, ApiResult};
use crate::matching::search_candidates;
use crate::models::MatchCandidate;
use crate::AppState;

/// GET /api/library/search query parameters
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    pub limit: Option<usize>,
}

/// GET /api/library/search response
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub candidates: Vec<MatchCandidate>,
}

/// GET /api/library/search
///
/// Ranked inventory candidates for a free-text query, served from the same
/// per-caller index the importer uses. A query without a usable title
/// returns an empty list.
pub async fn search_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<SearchResponse>> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let partition = identity::caller_key(authorization);

    let index = {
        let pool = state.db.clone();
        state
            .index_cache
            .get_or_build(&partition, move || async move {
                fetch_inventory_tracks(&pool).await
            })
            .await
            .map_err(|error| ApiError::Internal(error.to_string()))?
    };

    let limit = params.limit.unwrap_or(10);
    let candidates = search_candidates(
        &index,
        &params.title,
        &params.artist,
        limit,
        &state.config.matching,
    );

    Ok(Json(SearchResponse { candidates }))
}

/// Build search routes
pub fn search_routes() -> Router<AppState> {
    Router::new().route("/api/library/search", get(search_handler))
}
