//! External playlist API client
//!
//! Thin authenticated JSON client for the upstream playlist service. The
//! upstream is unreliable in specific ways: field-filtered queries are
//! rejected for some playlists (403, sometimes 400), item envelopes arrive
//! under either a `track` or an `item` node depending on query shape, and
//! rate limits carry a Retry-After hint. This module only classifies those
//! failures; the cascade/fallback policy lives in the importer.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::models::ExternalTrackRow;

const USER_AGENT: &str = "waxmatch/0.1.0";
/// Retry hint used when a 429 response omits Retry-After.
const DEFAULT_RETRY_AFTER_SECS: u64 = 3;

/// Playlist API errors, classified for the importer's continue/abort/degrade
/// decisions.
#[derive(Debug, Clone, Error)]
pub enum SourceApiError {
    /// Network communication error, timeouts included
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream rate limit; never retried at this layer
    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    /// Upstream returned a non-success status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body did not parse
    #[error("Parse error: {0}")]
    Parse(String),
}

impl SourceApiError {
    /// Permission-style failures are recoverable per fetch variant: the
    /// upstream rejects some query shapes for some playlists with 403, and
    /// occasionally 400 for the field filter itself.
    pub fn is_permission(&self) -> bool {
        match self {
            Self::Api { status, message } => {
                matches!(status, 400 | 403)
                    || message.to_lowercase().contains("forbidden")
                    || message.to_lowercase().contains("insufficient")
            }
            _ => false,
        }
    }
}

/// The caller's profile on the upstream service, for diagnostics.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub id: Option<String>,
}

/// Playlist metadata. The unfiltered query shapes return the first page of
/// items embedded under `tracks`, which the importer uses as a last-resort
/// row source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlaylistMeta {
    pub name: Option<String>,
    pub owner: Option<OwnerNode>,
    pub items: Option<TotalNode>,
    pub tracks: Option<EmbeddedTracks>,
}

impl PlaylistMeta {
    /// Reported track total, wherever the query shape surfaced it.
    pub fn reported_total(&self) -> Option<i64> {
        self.items
            .as_ref()
            .and_then(|node| node.total)
            .or_else(|| self.tracks.as_ref().and_then(|tracks| tracks.total))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OwnerNode {
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TotalNode {
    pub total: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddedTracks {
    pub total: Option<i64>,
    pub items: Vec<ItemEnvelope>,
    pub next: Option<String>,
}

/// One page of playlist items.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ItemsPage {
    pub items: Vec<ItemEnvelope>,
    pub next: Option<String>,
    pub total: Option<i64>,
}

/// One playlist entry. Which node is populated depends on the query shape;
/// `item` additionally carries a type discriminator because it can hold
/// non-track content.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ItemEnvelope {
    pub track: Option<TrackNode>,
    pub item: Option<TrackNode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrackNode {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub name: Option<String>,
    pub artists: Vec<ArtistNode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ArtistNode {
    pub name: Option<String>,
}

/// Project item envelopes onto matchable rows. Entries without a usable
/// track node or a non-empty title are dropped; the artist is the first
/// non-empty credited name.
pub fn extract_rows(items: &[ItemEnvelope]) -> Vec<ExternalTrackRow> {
    items
        .iter()
        .filter_map(|envelope| {
            let node = envelope.track.as_ref().or_else(|| {
                envelope
                    .item
                    .as_ref()
                    .filter(|item| item.kind.as_deref() == Some("track"))
            })?;
            let title = node.name.as_deref().unwrap_or("").trim();
            if title.is_empty() {
                return None;
            }
            let artist = node
                .artists
                .iter()
                .filter_map(|artist| artist.name.as_deref().map(str::trim))
                .find(|name| !name.is_empty())
                .map(str::to_string);
            Some(ExternalTrackRow {
                title: title.to_string(),
                artist,
            })
        })
        .collect()
}

/// The upstream operations the importer needs, abstracted so tests can run
/// the orchestrator against a scripted source. Methods return `Send`
/// futures so the importer stays spawnable from request handlers.
pub trait PlaylistSource: Send + Sync {
    fn fetch_current_user(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<UserProfile, SourceApiError>> + Send;
    fn fetch_meta(
        &self,
        token: &str,
        path: &str,
    ) -> impl Future<Output = Result<PlaylistMeta, SourceApiError>> + Send;
    fn fetch_items(
        &self,
        token: &str,
        path: &str,
    ) -> impl Future<Output = Result<ItemsPage, SourceApiError>> + Send;
    /// Follow an absolute pagination URL returned by the upstream.
    fn fetch_items_url(
        &self,
        token: &str,
        url: &str,
    ) -> impl Future<Output = Result<ItemsPage, SourceApiError>> + Send;
}

/// Playlist API client
pub struct PlaylistApiClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl PlaylistApiClient {
    /// Create a client against `base_url`. `timeout` bounds every page
    /// request; an elapsed timeout surfaces as a network error.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SourceApiError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| SourceApiError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        token: &str,
        url: &str,
    ) -> Result<T, SourceApiError> {
        debug!(url = %url, "Querying playlist API");

        let response = self
            .http_client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SourceApiError::Network(format!("request timed out: {url}"))
                } else {
                    SourceApiError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_seconds = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(SourceApiError::RateLimited {
                retry_after_seconds,
            });
        }

        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error)
                .and_then(|node| node.message)
                .unwrap_or_default();
            return Err(SourceApiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SourceApiError::Parse(e.to_string()))
    }
}

impl PlaylistSource for PlaylistApiClient {
    async fn fetch_current_user(&self, token: &str) -> Result<UserProfile, SourceApiError> {
        self.get_json(token, &format!("{}/me", self.base_url)).await
    }

    async fn fetch_meta(&self, token: &str, path: &str) -> Result<PlaylistMeta, SourceApiError> {
        self.get_json(token, &format!("{}{path}", self.base_url)).await
    }

    async fn fetch_items(&self, token: &str, path: &str) -> Result<ItemsPage, SourceApiError> {
        self.get_json(token, &format!("{}{path}", self.base_url)).await
    }

    async fn fetch_items_url(&self, token: &str, url: &str) -> Result<ItemsPage, SourceApiError> {
        self.get_json(token, url).await
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorNode>,
}

#[derive(Debug, Deserialize)]
struct ErrorNode {
    message: Option<String>,
}
