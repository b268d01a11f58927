//! Playlist import orchestrator
//!
//! Pulls a full external playlist through cascading query-shape variants,
//! matches the collected rows against the cached inventory index, and
//! persists the result as one playlist transaction.
//!
//! Failure policy per page:
//! - a variant that succeeds with parseable rows commits the page
//! - a variant that succeeds but yields no parseable rows is logged and the
//!   next variant is tried at the same offset
//! - a permission-style failure (403, and 400 on field filters) moves to the
//!   next variant
//! - a rate limit aborts immediately, surfacing the upstream retry hint
//! - anything else aborts the whole import
//!
//! When every variant at an offset fails permission-style, the import
//! degrades instead of failing: rows already collected become a partial
//! import, and if nothing was collected at all, the first page embedded in
//! the playlist metadata (plus its raw pagination link) is the last resort.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};

use crate::cache::index_cache::RebuildError;
use crate::cache::{identity, IndexCache};
use crate::config::AppConfig;
use crate::db;
use crate::matching::match_rows;
use crate::models::{ExternalTrackRow, MissingRow};
use crate::services::playlist_api::{
    extract_rows, PlaylistMeta, PlaylistSource, SourceApiError,
};

/// Playlist name fallback and length cap, applied to caller-supplied and
/// upstream-supplied names alike.
pub fn sanitize_playlist_name(value: Option<&str>) -> String {
    let cleaned = value.unwrap_or("").trim();
    if cleaned.is_empty() {
        return "Custom Playlist".to_string();
    }
    cleaned.chars().take(80).collect()
}

/// One import request.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    /// Upstream playlist id.
    pub playlist_id: String,
    /// Optional name override; otherwise the upstream playlist name is used.
    pub playlist_name: Option<String>,
    /// Bearer token for the upstream API, passed through opaquely.
    pub credential: String,
}

/// Pipeline step names, surfaced in failures so upstream denial is
/// distinguishable from internal defects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportStep {
    Token,
    User,
    Meta,
    Tracks,
    Index,
    CreatePlaylist,
    InsertItems,
}

impl fmt::Display for ImportStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Token => "token",
            Self::User => "user",
            Self::Meta => "meta",
            Self::Tracks => "tracks",
            Self::Index => "index",
            Self::CreatePlaylist => "create-playlist",
            Self::InsertItems => "insert-items",
        };
        f.write_str(name)
    }
}

/// One failed fetch attempt, kept for the failure diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptError {
    pub variant: String,
    pub error: String,
}

/// Per-variant fetch diagnostics accumulated across the import.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportDebug {
    pub meta_attempts: Vec<AttemptError>,
    pub track_attempts: Vec<AttemptError>,
}

impl ImportDebug {
    /// Bound the diagnostic payload to the most recent attempts.
    fn capped(&self) -> Self {
        let tail = |attempts: &[AttemptError], keep: usize| {
            attempts[attempts.len().saturating_sub(keep)..].to_vec()
        };
        Self {
            meta_attempts: tail(&self.meta_attempts, 10),
            track_attempts: tail(&self.track_attempts, 20),
        }
    }
}

#[derive(Debug, Error)]
pub enum ImportErrorKind {
    #[error("no playlist credential supplied")]
    MissingCredential,

    /// Never retried here; the retry decision belongs to the caller.
    #[error("upstream rate limit reached, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("upstream returned no importable rows (reported total {source_total:?})")]
    NoRows { source_total: Option<i64> },

    #[error(transparent)]
    Upstream(SourceApiError),

    #[error(transparent)]
    Index(RebuildError),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Import failure: the step that failed, why, and the fetch attempts that
/// led there.
#[derive(Debug, Error)]
#[error("import failed at step {step}: {kind}")]
pub struct ImportError {
    pub step: ImportStep,
    #[source]
    pub kind: ImportErrorKind,
    pub debug: ImportDebug,
}

fn fail(step: ImportStep, kind: ImportErrorKind, debug: &ImportDebug) -> ImportError {
    ImportError {
        step,
        kind,
        debug: debug.capped(),
    }
}

fn classify(error: SourceApiError) -> ImportErrorKind {
    match error {
        SourceApiError::RateLimited {
            retry_after_seconds,
        } => ImportErrorKind::RateLimited {
            retry_after_seconds,
        },
        other => ImportErrorKind::Upstream(other),
    }
}

/// Where the imported rows came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportSource {
    /// The regular paged items endpoint.
    PlaylistItems,
    /// Degraded path: rows collected before a universal permission failure,
    /// or the metadata-embedded first page and its raw link.
    PlaylistFallback,
}

/// Successful import summary. Degradation is always explicit:
/// `partial_import` and `unmatched_sample` are reported, never hidden.
#[derive(Debug, Serialize)]
pub struct ImportOutcome {
    pub playlist_id: i64,
    pub playlist_name: String,
    /// Rows collected from the upstream.
    pub source_count: usize,
    /// Track total the upstream claimed, if it reported one.
    pub source_total: Option<i64>,
    pub import_source: ImportSource,
    pub partial_import: bool,
    /// Distinct playlist items written.
    pub matched_count: usize,
    pub fuzzy_matched_count: usize,
    pub unmatched_count: usize,
    pub unmatched_sample: Vec<MissingRow>,
}

/// Page-state inputs to a fetch variant.
struct PageRequest<'a> {
    playlist_id: &'a str,
    offset: i64,
    limit: i64,
}

/// A named query shape: a pure function from page state to a request path.
struct FetchVariant {
    name: &'static str,
    path: fn(&PageRequest<'_>) -> String,
}

fn meta_filtered_market(req: &PageRequest<'_>) -> String {
    format!(
        "/playlists/{}?fields=name,owner(id),items(total),tracks(total)&market=from_token",
        req.playlist_id
    )
}

fn meta_filtered(req: &PageRequest<'_>) -> String {
    format!(
        "/playlists/{}?fields=name,owner(id),items(total),tracks(total)",
        req.playlist_id
    )
}

fn meta_market(req: &PageRequest<'_>) -> String {
    format!("/playlists/{}?market=from_token", req.playlist_id)
}

fn meta_bare(req: &PageRequest<'_>) -> String {
    format!("/playlists/{}", req.playlist_id)
}

fn items_filtered_market(req: &PageRequest<'_>) -> String {
    format!(
        "/playlists/{}/items?limit={}&offset={}&additional_types=track&market=from_token&fields=items(item(type,name,artists(name))),next,total",
        req.playlist_id, req.limit, req.offset
    )
}

fn items_filtered_both_shapes(req: &PageRequest<'_>) -> String {
    format!(
        "/playlists/{}/items?limit={}&offset={}&additional_types=track&fields=items(track(name,artists(name)),item(type,name,artists(name))),next,total",
        req.playlist_id, req.limit, req.offset
    )
}

fn items_market(req: &PageRequest<'_>) -> String {
    format!(
        "/playlists/{}/items?limit={}&offset={}&additional_types=track&market=from_token",
        req.playlist_id, req.limit, req.offset
    )
}

fn items_bare(req: &PageRequest<'_>) -> String {
    format!(
        "/playlists/{}/items?limit={}&offset={}&additional_types=track",
        req.playlist_id, req.limit, req.offset
    )
}

/// Metadata query shapes, most- to least-specific.
const META_VARIANTS: &[FetchVariant] = &[
    FetchVariant {
        name: "meta-filtered-market",
        path: meta_filtered_market,
    },
    FetchVariant {
        name: "meta-filtered",
        path: meta_filtered,
    },
    FetchVariant {
        name: "meta-market",
        path: meta_market,
    },
    FetchVariant {
        name: "meta-bare",
        path: meta_bare,
    },
];

/// Item-page query shapes, most- to least-specific.
const ITEM_VARIANTS: &[FetchVariant] = &[
    FetchVariant {
        name: "items-filtered-market",
        path: items_filtered_market,
    },
    FetchVariant {
        name: "items-filtered-both-shapes",
        path: items_filtered_both_shapes,
    },
    FetchVariant {
        name: "items-market",
        path: items_market,
    },
    FetchVariant {
        name: "items-bare",
        path: items_bare,
    },
];

/// Run one import end to end: fetch, match, persist.
pub async fn import_playlist<S: PlaylistSource>(
    source: &S,
    pool: &SqlitePool,
    cache: &IndexCache,
    config: &AppConfig,
    request: &ImportRequest,
) -> Result<ImportOutcome, ImportError> {
    let mut debug = ImportDebug::default();

    let token = request.credential.trim();
    if token.is_empty() {
        return Err(fail(
            ImportStep::Token,
            ImportErrorKind::MissingCredential,
            &debug,
        ));
    }

    let user = match source.fetch_current_user(token).await {
        Ok(user) => user,
        Err(error) => return Err(fail(ImportStep::User, classify(error), &debug)),
    };
    info!(
        user = user.id.as_deref().unwrap_or("unknown"),
        playlist = %request.playlist_id,
        "Starting playlist import"
    );

    let meta = match fetch_meta_cascade(source, token, &request.playlist_id, &mut debug).await {
        Ok(meta) => meta,
        Err(kind) => return Err(fail(ImportStep::Meta, kind, &debug)),
    };
    let playlist_name = sanitize_playlist_name(
        request
            .playlist_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .or(meta.name.as_deref()),
    );

    let mut source_total = meta.reported_total();
    let mut rows: Vec<ExternalTrackRow> = Vec::new();
    let mut offset: i64 = 0;
    let mut partial_import = false;
    let mut import_source = ImportSource::PlaylistItems;

    loop {
        let page_request = PageRequest {
            playlist_id: &request.playlist_id,
            offset,
            limit: config.page_limit,
        };
        match fetch_items_cascade(source, token, &page_request, &mut debug).await {
            Err(kind) => return Err(fail(ImportStep::Tracks, kind, &debug)),
            Ok(PageFetch::AllForbidden) => {
                if rows.is_empty() {
                    let (embedded, embedded_total) =
                        match collect_embedded_rows(source, token, &meta, &mut debug).await {
                            Ok(collected) => collected,
                            Err(kind) => return Err(fail(ImportStep::Tracks, kind, &debug)),
                        };
                    if source_total.is_none() {
                        source_total = embedded_total;
                    }
                    rows.extend(embedded);
                }
                if !rows.is_empty() {
                    warn!(
                        offset,
                        collected = rows.len(),
                        "Upstream denied further pages; continuing with partial import"
                    );
                    partial_import = true;
                    import_source = ImportSource::PlaylistFallback;
                }
                break;
            }
            Ok(PageFetch::Page {
                rows: page_rows,
                item_count,
                next,
                total,
            }) => {
                if source_total.is_none() {
                    source_total = total;
                }
                rows.extend(page_rows);
                if item_count == 0 {
                    break;
                }
                offset += item_count as i64;
                if let Some(total) = source_total {
                    if offset >= total {
                        break;
                    }
                }
                if next.is_none() {
                    break;
                }
            }
        }
    }

    if rows.is_empty() && source_total.map_or(true, |total| total > 0) {
        return Err(fail(
            ImportStep::Tracks,
            ImportErrorKind::NoRows { source_total },
            &debug,
        ));
    }

    let partition = identity::caller_key_from_token(token);
    let index = {
        let pool = pool.clone();
        cache
            .get_or_build(&partition, move || async move {
                db::inventory::fetch_inventory_tracks(&pool).await
            })
            .await
    };
    let index = match index {
        Ok(index) => index,
        Err(error) => return Err(fail(ImportStep::Index, ImportErrorKind::Index(error), &debug)),
    };

    let outcome = match_rows(&rows, &index, &config.matching);

    // One playlist item per distinct track key, in first-occurrence order.
    let mut track_keys: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for track in &outcome.matched {
        let key = track.track_key();
        if key.is_empty() {
            continue;
        }
        if seen.insert(key.clone()) {
            track_keys.push(key);
        }
    }

    let write_step = if track_keys.is_empty() {
        ImportStep::CreatePlaylist
    } else {
        ImportStep::InsertItems
    };
    let playlist_id = match db::playlists::create_playlist_with_items(pool, &playlist_name, &track_keys).await
    {
        Ok(id) => id,
        Err(error) => {
            return Err(fail(
                write_step,
                ImportErrorKind::Storage(error.to_string()),
                &debug,
            ))
        }
    };

    info!(
        playlist_id,
        source_count = rows.len(),
        matched = track_keys.len(),
        unmatched = outcome.missing.len(),
        partial = partial_import,
        "Playlist import complete"
    );

    let unmatched_sample: Vec<MissingRow> = outcome
        .missing
        .iter()
        .take(config.matching.unmatched_sample_max)
        .cloned()
        .collect();

    Ok(ImportOutcome {
        playlist_id,
        playlist_name,
        source_count: rows.len(),
        source_total,
        import_source,
        partial_import,
        matched_count: track_keys.len(),
        fuzzy_matched_count: outcome.fuzzy_matched_count,
        unmatched_count: outcome.missing.len(),
        unmatched_sample,
    })
}

async fn fetch_meta_cascade<S: PlaylistSource>(
    source: &S,
    token: &str,
    playlist_id: &str,
    debug: &mut ImportDebug,
) -> Result<PlaylistMeta, ImportErrorKind> {
    let request = PageRequest {
        playlist_id,
        offset: 0,
        limit: 0,
    };
    let mut last_permission: Option<SourceApiError> = None;
    for variant in META_VARIANTS {
        let path = (variant.path)(&request);
        match source.fetch_meta(token, &path).await {
            Ok(meta) => return Ok(meta),
            Err(error) => {
                debug.meta_attempts.push(AttemptError {
                    variant: variant.name.to_string(),
                    error: error.to_string(),
                });
                if matches!(error, SourceApiError::RateLimited { .. }) {
                    return Err(classify(error));
                }
                if error.is_permission() {
                    last_permission = Some(error);
                    continue;
                }
                return Err(classify(error));
            }
        }
    }
    // All metadata shapes rejected: without a name or total there is nothing
    // to degrade to, so this aborts (item-page denial is what degrades).
    Err(ImportErrorKind::Upstream(last_permission.unwrap_or(
        SourceApiError::Api {
            status: 403,
            message: "all playlist metadata variants rejected".to_string(),
        },
    )))
}

enum PageFetch {
    Page {
        rows: Vec<ExternalTrackRow>,
        item_count: usize,
        next: Option<String>,
        total: Option<i64>,
    },
    /// Every variant at this offset failed permission-style (or yielded no
    /// parseable rows); the import should degrade rather than abort.
    AllForbidden,
}

async fn fetch_items_cascade<S: PlaylistSource>(
    source: &S,
    token: &str,
    request: &PageRequest<'_>,
    debug: &mut ImportDebug,
) -> Result<PageFetch, ImportErrorKind> {
    for variant in ITEM_VARIANTS {
        let path = (variant.path)(request);
        match source.fetch_items(token, &path).await {
            Ok(page) => {
                let rows = extract_rows(&page.items);
                if !page.items.is_empty() && rows.is_empty() {
                    debug.track_attempts.push(AttemptError {
                        variant: variant.name.to_string(),
                        error: "page had items but no parseable tracks".to_string(),
                    });
                    continue;
                }
                return Ok(PageFetch::Page {
                    rows,
                    item_count: page.items.len(),
                    next: page.next,
                    total: page.total,
                });
            }
            Err(error) => {
                debug.track_attempts.push(AttemptError {
                    variant: variant.name.to_string(),
                    error: error.to_string(),
                });
                if matches!(error, SourceApiError::RateLimited { .. }) {
                    return Err(classify(error));
                }
                if error.is_permission() {
                    continue;
                }
                return Err(classify(error));
            }
        }
    }
    Ok(PageFetch::AllForbidden)
}

/// Last-resort row source: the first page embedded in the playlist metadata
/// and its raw pagination link. A rate limit still aborts; any other error
/// while following the link stops the walk and keeps what was collected.
async fn collect_embedded_rows<S: PlaylistSource>(
    source: &S,
    token: &str,
    meta: &PlaylistMeta,
    debug: &mut ImportDebug,
) -> Result<(Vec<ExternalTrackRow>, Option<i64>), ImportErrorKind> {
    let Some(tracks) = &meta.tracks else {
        return Ok((Vec::new(), None));
    };
    let mut rows = extract_rows(&tracks.items);
    let mut next = tracks.next.clone();
    while let Some(url) = next {
        match source.fetch_items_url(token, &url).await {
            Ok(page) => {
                rows.extend(extract_rows(&page.items));
                if page.items.is_empty() {
                    break;
                }
                next = page.next;
            }
            Err(SourceApiError::RateLimited {
                retry_after_seconds,
            }) => {
                return Err(ImportErrorKind::RateLimited {
                    retry_after_seconds,
                })
            }
            Err(error) => {
                debug.track_attempts.push(AttemptError {
                    variant: "raw-link".to_string(),
                    error: error.to_string(),
                });
                break;
            }
        }
    }
    Ok((rows, tracks.total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::Mutex;

    use sqlx::Row;

    use crate::cache::SystemClock;
    use crate::services::playlist_api::{
        ArtistNode, EmbeddedTracks, ItemEnvelope, ItemsPage, TotalNode, TrackNode, UserProfile,
    };

    /// Scripted upstream. Item-page responses are keyed by offset and
    /// consumed per call; the last response for an offset repeats once the
    /// script runs out, so "every variant fails the same way" needs only
    /// one entry.
    struct FakeSource {
        meta: Result<PlaylistMeta, SourceApiError>,
        pages: Mutex<HashMap<i64, Vec<Result<ItemsPage, SourceApiError>>>>,
        raw_pages: Mutex<HashMap<String, Result<ItemsPage, SourceApiError>>>,
    }

    impl FakeSource {
        fn new(meta: PlaylistMeta) -> Self {
            Self {
                meta: Ok(meta),
                pages: Mutex::new(HashMap::new()),
                raw_pages: Mutex::new(HashMap::new()),
            }
        }

        fn script_page(&self, offset: i64, responses: Vec<Result<ItemsPage, SourceApiError>>) {
            self.pages.lock().unwrap().insert(offset, responses);
        }

        fn script_raw(&self, url: &str, response: Result<ItemsPage, SourceApiError>) {
            self.raw_pages
                .lock()
                .unwrap()
                .insert(url.to_string(), response);
        }
    }

    fn offset_from_path(path: &str) -> i64 {
        path.split("offset=")
            .nth(1)
            .and_then(|rest| rest.split('&').next())
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0)
    }

    impl PlaylistSource for FakeSource {
        async fn fetch_current_user(&self, _token: &str) -> Result<UserProfile, SourceApiError> {
            Ok(UserProfile {
                id: Some("fake-user".to_string()),
            })
        }

        async fn fetch_meta(&self, _token: &str, _path: &str) -> Result<PlaylistMeta, SourceApiError> {
            self.meta.clone()
        }

        async fn fetch_items(&self, _token: &str, path: &str) -> Result<ItemsPage, SourceApiError> {
            let offset = offset_from_path(path);
            let mut pages = self.pages.lock().unwrap();
            let responses = pages.entry(offset).or_default();
            if responses.is_empty() {
                Ok(ItemsPage::default())
            } else if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses[0].clone()
            }
        }

        async fn fetch_items_url(&self, _token: &str, url: &str) -> Result<ItemsPage, SourceApiError> {
            self.raw_pages
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .unwrap_or_else(|| Ok(ItemsPage::default()))
        }
    }

    fn envelope(title: &str, artist: &str) -> ItemEnvelope {
        ItemEnvelope {
            track: Some(TrackNode {
                kind: None,
                name: Some(title.to_string()),
                artists: vec![ArtistNode {
                    name: Some(artist.to_string()),
                }],
            }),
            item: None,
        }
    }

    fn meta_named(name: &str, total: i64) -> PlaylistMeta {
        PlaylistMeta {
            name: Some(name.to_string()),
            items: Some(TotalNode { total: Some(total) }),
            ..Default::default()
        }
    }

    fn forbidden() -> SourceApiError {
        SourceApiError::Api {
            status: 403,
            message: "Forbidden".to_string(),
        }
    }

    async fn test_env() -> (SqlitePool, IndexCache, AppConfig) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::db::init_tables(&pool).await.unwrap();
        let config = AppConfig::default();
        let cache = IndexCache::new(config.matching.index_ttl(), Arc::new(SystemClock));
        (pool, cache, config)
    }

    async fn seed_inventory(pool: &SqlitePool) {
        sqlx::query("INSERT INTO releases (id, artist, title) VALUES (1, 'The Beatles', 'Past Masters')")
            .execute(pool)
            .await
            .unwrap();
        for (recording_id, position, title) in [(10, "A1", "Hey Jude"), (11, "A2", "Let It Be")] {
            sqlx::query("INSERT INTO recordings (id, title, track_artist) VALUES (?, ?, NULL)")
                .bind(recording_id)
                .bind(title)
                .execute(pool)
                .await
                .unwrap();
            sqlx::query(
                "INSERT INTO release_tracks (release_id, recording_id, position, side) VALUES (1, ?, ?, 'A')",
            )
            .bind(recording_id)
            .bind(position)
            .execute(pool)
            .await
            .unwrap();
        }
        sqlx::query("INSERT INTO inventory (id, release_id) VALUES (7, 1)")
            .execute(pool)
            .await
            .unwrap();
    }

    fn request() -> ImportRequest {
        ImportRequest {
            playlist_id: "ext-playlist".to_string(),
            playlist_name: None,
            credential: "token".to_string(),
        }
    }

    async fn item_count(pool: &SqlitePool, playlist_id: i64) -> i64 {
        sqlx::query("SELECT COUNT(*) AS n FROM playlist_items WHERE playlist_id = ?")
            .bind(playlist_id)
            .fetch_one(pool)
            .await
            .unwrap()
            .get::<i64, _>("n")
    }

    #[tokio::test]
    async fn test_import_happy_path() {
        let (pool, cache, config) = test_env().await;
        seed_inventory(&pool).await;

        let source = FakeSource::new(meta_named("Sixties Gold", 2));
        source.script_page(
            0,
            vec![Ok(ItemsPage {
                items: vec![
                    envelope("Hey Jude - Remastered 2009", "Beatles"),
                    envelope("Let It Be", "The Beatles"),
                ],
                next: None,
                total: Some(2),
            })],
        );

        let outcome = import_playlist(&source, &pool, &cache, &config, &request())
            .await
            .unwrap();
        assert_eq!(outcome.playlist_name, "Sixties Gold");
        assert_eq!(outcome.source_count, 2);
        assert_eq!(outcome.source_total, Some(2));
        assert_eq!(outcome.matched_count, 2);
        assert_eq!(outcome.unmatched_count, 0);
        assert!(!outcome.partial_import);
        assert_eq!(outcome.import_source, ImportSource::PlaylistItems);
        assert_eq!(item_count(&pool, outcome.playlist_id).await, 2);
    }

    #[tokio::test]
    async fn test_duplicate_rows_write_one_item() {
        let (pool, cache, config) = test_env().await;
        seed_inventory(&pool).await;

        let source = FakeSource::new(meta_named("Dupes", 2));
        source.script_page(
            0,
            vec![Ok(ItemsPage {
                items: vec![
                    envelope("Hey Jude", "The Beatles"),
                    envelope("Hey Jude - Remastered 2009", "Beatles"),
                ],
                next: None,
                total: Some(2),
            })],
        );

        let outcome = import_playlist(&source, &pool, &cache, &config, &request())
            .await
            .unwrap();
        assert_eq!(outcome.source_count, 2);
        assert_eq!(outcome.matched_count, 1);
        assert_eq!(item_count(&pool, outcome.playlist_id).await, 1);
    }

    #[tokio::test]
    async fn test_partial_import_when_later_page_denied() {
        let (pool, cache, config) = test_env().await;
        seed_inventory(&pool).await;

        let source = FakeSource::new(meta_named("Locked Tail", 150));
        let mut first_page_items = vec![envelope("Hey Jude", "The Beatles")];
        first_page_items
            .extend((0..99).map(|i| envelope(&format!("Filler {i}"), "Nobody")));
        source.script_page(
            0,
            vec![Ok(ItemsPage {
                items: first_page_items,
                next: Some("https://upstream/page2".to_string()),
                total: Some(150),
            })],
        );
        // Every variant at offset 100 is denied.
        source.script_page(100, vec![Err(forbidden())]);

        let outcome = import_playlist(&source, &pool, &cache, &config, &request())
            .await
            .unwrap();
        assert!(outcome.partial_import);
        assert_eq!(outcome.import_source, ImportSource::PlaylistFallback);
        assert_eq!(outcome.source_count, 100);
        assert_eq!(outcome.matched_count, 1);
    }

    #[tokio::test]
    async fn test_rate_limit_aborts_with_retry_hint() {
        let (pool, cache, config) = test_env().await;
        let source = FakeSource::new(meta_named("Busy", 5));
        source.script_page(
            0,
            vec![Err(SourceApiError::RateLimited {
                retry_after_seconds: 7,
            })],
        );

        let error = import_playlist(&source, &pool, &cache, &config, &request())
            .await
            .unwrap_err();
        assert_eq!(error.step, ImportStep::Tracks);
        assert!(matches!(
            error.kind,
            ImportErrorKind::RateLimited {
                retry_after_seconds: 7
            }
        ));
        // Nothing was persisted.
        let playlists: i64 = sqlx::query("SELECT COUNT(*) AS n FROM playlists")
            .fetch_one(&pool)
            .await
            .unwrap()
            .get("n");
        assert_eq!(playlists, 0);
    }

    #[tokio::test]
    async fn test_embedded_fallback_when_items_endpoint_denied() {
        let (pool, cache, config) = test_env().await;
        seed_inventory(&pool).await;

        let mut meta = meta_named("Embedded", 2);
        meta.tracks = Some(EmbeddedTracks {
            total: Some(2),
            items: vec![envelope("Hey Jude", "The Beatles")],
            next: Some("https://upstream/raw-page-2".to_string()),
        });
        let source = FakeSource::new(meta);
        source.script_page(0, vec![Err(forbidden())]);
        source.script_raw(
            "https://upstream/raw-page-2",
            Ok(ItemsPage {
                items: vec![envelope("Let It Be", "The Beatles")],
                next: None,
                total: None,
            }),
        );

        let outcome = import_playlist(&source, &pool, &cache, &config, &request())
            .await
            .unwrap();
        assert!(outcome.partial_import);
        assert_eq!(outcome.import_source, ImportSource::PlaylistFallback);
        assert_eq!(outcome.source_count, 2);
        assert_eq!(outcome.matched_count, 2);
    }

    #[tokio::test]
    async fn test_no_rows_anywhere_is_structured_failure() {
        let (pool, cache, config) = test_env().await;
        let source = FakeSource::new(meta_named("Denied", 9));
        source.script_page(0, vec![Err(forbidden())]);

        let error = import_playlist(&source, &pool, &cache, &config, &request())
            .await
            .unwrap_err();
        assert_eq!(error.step, ImportStep::Tracks);
        assert!(matches!(
            error.kind,
            ImportErrorKind::NoRows {
                source_total: Some(9)
            }
        ));
        assert!(!error.debug.track_attempts.is_empty());
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let (pool, cache, config) = test_env().await;
        let source = FakeSource::new(meta_named("Any", 1));
        let mut req = request();
        req.credential = "   ".to_string();

        let error = import_playlist(&source, &pool, &cache, &config, &req)
            .await
            .unwrap_err();
        assert_eq!(error.step, ImportStep::Token);
        assert!(matches!(error.kind, ImportErrorKind::MissingCredential));
    }

    #[tokio::test]
    async fn test_unparseable_page_falls_through_to_next_variant() {
        let (pool, cache, config) = test_env().await;
        seed_inventory(&pool).await;

        // First variant: items present but no usable track nodes. Second
        // variant: the same page in a parseable shape.
        let source = FakeSource::new(meta_named("Shapes", 1));
        source.script_page(
            0,
            vec![
                Ok(ItemsPage {
                    items: vec![ItemEnvelope::default()],
                    next: None,
                    total: Some(1),
                }),
                Ok(ItemsPage {
                    items: vec![envelope("Hey Jude", "The Beatles")],
                    next: None,
                    total: Some(1),
                }),
            ],
        );

        let outcome = import_playlist(&source, &pool, &cache, &config, &request())
            .await
            .unwrap();
        assert_eq!(outcome.source_count, 1);
        assert_eq!(outcome.matched_count, 1);
        assert!(!outcome.partial_import);
    }

    #[test]
    fn test_sanitize_playlist_name() {
        assert_eq!(sanitize_playlist_name(None), "Custom Playlist");
        assert_eq!(sanitize_playlist_name(Some("   ")), "Custom Playlist");
        assert_eq!(sanitize_playlist_name(Some("  Mix  ")), "Mix");
        let long = "x".repeat(120);
        assert_eq!(sanitize_playlist_name(Some(&long)).chars().count(), 80);
    }

    #[test]
    fn test_variant_paths_carry_page_state() {
        let request = PageRequest {
            playlist_id: "pl1",
            offset: 200,
            limit: 100,
        };
        for variant in ITEM_VARIANTS {
            let path = (variant.path)(&request);
            assert!(path.contains("/playlists/pl1/items"), "{path}");
            assert!(path.contains("offset=200"), "{path}");
            assert!(path.contains("limit=100"), "{path}");
        }
        for variant in META_VARIANTS {
            assert!((variant.path)(&request).starts_with("/playlists/pl1"));
        }
    }
}
