//! TTL cache for built inventory indexes, partitioned per caller
//!
//! Building an index means paging a caller's full inventory out of storage
//! and normalizing every track, so concurrent requests must not each pay
//! that cost: per partition key, at most one build runs at a time and every
//! concurrent caller awaits the same shared future (errors included). A
//! failed build is never cached.
//!
//! Invalidation is two-level: `invalidate` drops one caller's entry,
//! `invalidate_all` bumps a generation counter that makes every cached entry
//! stale at once, including entries whose build is still in flight when the
//! bump happens.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::matching::InventoryIndex;
use crate::models::InventoryTrack;

/// Index rebuild failure, shared verbatim with every caller that joined the
/// build. Carries the message only: the originating error is consumed by the
/// shared future, which must stay cloneable.
#[derive(Debug, Clone, Error)]
#[error("inventory index rebuild failed: {0}")]
pub struct RebuildError(pub String);

/// Time source for TTL checks, injected so tests can drive expiry without
/// sleeping.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall-clock time in milliseconds since the Unix epoch.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default()
    }
}

struct CacheEntry {
    index: Arc<InventoryIndex>,
    built_at_ms: u64,
    /// Generation at the time the build was registered. An `invalidate_all`
    /// during the build leaves this behind the current generation, so the
    /// entry lands already stale.
    generation: u64,
}

type BuildFuture = Shared<BoxFuture<'static, Result<Arc<InventoryIndex>, RebuildError>>>;

struct CacheInner {
    ttl_ms: u64,
    clock: Arc<dyn Clock>,
    generation: AtomicU64,
    entries: Mutex<HashMap<String, CacheEntry>>,
    in_flight: Mutex<HashMap<String, BuildFuture>>,
}

/// Shared handle to the cache; cloning is cheap.
#[derive(Clone)]
pub struct IndexCache {
    inner: Arc<CacheInner>,
}

impl IndexCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                ttl_ms: ttl.as_millis() as u64,
                clock,
                generation: AtomicU64::new(0),
                entries: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Return the cached index for `caller_key`, or build it via `load_rows`.
    ///
    /// `load_rows` is invoked only when this call actually starts a build;
    /// callers that join an in-flight build never run theirs.
    pub async fn get_or_build<F, Fut>(
        &self,
        caller_key: &str,
        load_rows: F,
    ) -> Result<Arc<InventoryIndex>, RebuildError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Vec<InventoryTrack>>> + Send + 'static,
    {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        {
            let entries = self.inner.entries.lock().await;
            if let Some(entry) = entries.get(caller_key) {
                let age_ms = self.inner.clock.now_ms().saturating_sub(entry.built_at_ms);
                if entry.generation == generation && age_ms < self.inner.ttl_ms {
                    debug!(caller = %caller_key, age_ms, "Inventory index cache hit");
                    return Ok(Arc::clone(&entry.index));
                }
            }
        }

        let build = {
            let mut in_flight = self.inner.in_flight.lock().await;
            if let Some(existing) = in_flight.get(caller_key) {
                debug!(caller = %caller_key, "Joining in-flight index build");
                existing.clone()
            } else {
                let inner = Arc::clone(&self.inner);
                let key = caller_key.to_string();
                let rows_future = load_rows();
                let build: BoxFuture<'static, Result<Arc<InventoryIndex>, RebuildError>> =
                    Box::pin(async move {
                        let built = match rows_future.await {
                            Ok(rows) => {
                                let index = Arc::new(InventoryIndex::build(&rows));
                                info!(
                                    caller = %key,
                                    rows = rows.len(),
                                    indexed = index.len(),
                                    "Inventory index rebuilt"
                                );
                                Ok(index)
                            }
                            Err(error) => {
                                warn!(caller = %key, error = %error, "Inventory index rebuild failed");
                                Err(RebuildError(error.to_string()))
                            }
                        };
                        // Deregister before the result propagates, so a
                        // caller arriving after completion starts fresh
                        // instead of joining a finished build.
                        inner.in_flight.lock().await.remove(&key);
                        if let Ok(index) = &built {
                            let built_at_ms = inner.clock.now_ms();
                            inner.entries.lock().await.insert(
                                key,
                                CacheEntry {
                                    index: Arc::clone(index),
                                    built_at_ms,
                                    generation,
                                },
                            );
                        }
                        built
                    });
                let shared = build.shared();
                in_flight.insert(caller_key.to_string(), shared.clone());
                shared
            }
        };

        build.await
    }

    /// Drop one caller's cached entry. An in-flight build for the key is
    /// left alone; its result will still land and serve later callers.
    pub async fn invalidate(&self, caller_key: &str) {
        if self.inner.entries.lock().await.remove(caller_key).is_some() {
            debug!(caller = %caller_key, "Inventory index invalidated");
        }
    }

    /// Make every cached entry stale at once, in-flight builds included.
    pub fn invalidate_all(&self) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, "All inventory indexes invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::{sleep, Duration as TokioDuration};

    struct ManualClock(AtomicU64);

    impl ManualClock {
        fn advance_ms(&self, ms: u64) {
            self.0.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn rows() -> Vec<InventoryTrack> {
        vec![InventoryTrack {
            inventory_id: Some(1),
            recording_id: None,
            title: "Hey Jude".to_string(),
            artist: "The Beatles".to_string(),
            side: None,
            position: Some("A1".to_string()),
        }]
    }

    fn cache_with_manual_clock(ttl: Duration) -> (IndexCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock(AtomicU64::new(0)));
        let cache = IndexCache::new(ttl, Arc::clone(&clock) as Arc<dyn Clock>);
        (cache, clock)
    }

    #[tokio::test]
    async fn test_cached_within_ttl_rebuilt_after() {
        let (cache, clock) = cache_with_manual_clock(Duration::from_secs(600));
        let builds = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let builds = Arc::clone(&builds);
            cache
                .get_or_build("user-a", move || async move {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Ok(rows())
                })
                .await
                .unwrap();
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        clock.advance_ms(600_001);
        let builds_clone = Arc::clone(&builds);
        cache
            .get_or_build("user-a", move || async move {
                builds_clone.fetch_add(1, Ordering::SeqCst);
                Ok(rows())
            })
            .await
            .unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_build() {
        let (cache, _clock) = cache_with_manual_clock(Duration::from_secs(600));
        let builds = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let builds = Arc::clone(&builds);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_build("user-a", move || async move {
                        builds.fetch_add(1, Ordering::SeqCst);
                        // Hold the build open so the other tasks join it.
                        sleep(TokioDuration::from_millis(50)).await;
                        Ok(rows())
                    })
                    .await
            }));
        }
        for handle in handles {
            let index = handle.await.unwrap().unwrap();
            assert_eq!(index.len(), 1);
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_partitions_are_isolated() {
        let (cache, _clock) = cache_with_manual_clock(Duration::from_secs(600));
        let builds = Arc::new(AtomicUsize::new(0));

        for key in ["user-a", "user-b", "user-a"] {
            let builds = Arc::clone(&builds);
            cache
                .get_or_build(key, move || async move {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Ok(rows())
                })
                .await
                .unwrap();
        }
        // One build per distinct key.
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_drops_only_that_key() {
        let (cache, _clock) = cache_with_manual_clock(Duration::from_secs(600));
        let builds = Arc::new(AtomicUsize::new(0));

        for key in ["user-a", "user-b"] {
            let builds = Arc::clone(&builds);
            cache
                .get_or_build(key, move || async move {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Ok(rows())
                })
                .await
                .unwrap();
        }
        cache.invalidate("user-a").await;

        for key in ["user-a", "user-b"] {
            let builds = Arc::clone(&builds);
            cache
                .get_or_build(key, move || async move {
                    builds.fetch_add(1, Ordering::SeqCst);
                    Ok(rows())
                })
                .await
                .unwrap();
        }
        // user-a rebuilt, user-b still cached.
        assert_eq!(builds.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invalidate_all_bumps_generation() {
        let (cache, _clock) = cache_with_manual_clock(Duration::from_secs(600));
        let builds = Arc::new(AtomicUsize::new(0));

        let builds_clone = Arc::clone(&builds);
        cache
            .get_or_build("user-a", move || async move {
                builds_clone.fetch_add(1, Ordering::SeqCst);
                Ok(rows())
            })
            .await
            .unwrap();
        cache.invalidate_all();

        let builds_clone = Arc::clone(&builds);
        cache
            .get_or_build("user-a", move || async move {
                builds_clone.fetch_add(1, Ordering::SeqCst);
                Ok(rows())
            })
            .await
            .unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_shared_and_not_cached() {
        let (cache, _clock) = cache_with_manual_clock(Duration::from_secs(600));
        let attempts = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let attempts = Arc::clone(&attempts);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_build("user-a", move || async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        sleep(TokioDuration::from_millis(50)).await;
                        Err(anyhow::anyhow!("inventory storage offline"))
                    })
                    .await
            }));
        }
        for handle in handles {
            let result = handle.await.unwrap();
            assert!(result.unwrap_err().to_string().contains("storage offline"));
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        // The failure must not poison the cache: the next call retries.
        let attempts_clone = Arc::clone(&attempts);
        let index = cache
            .get_or_build("user-a", move || async move {
                attempts_clone.fetch_add(1, Ordering::SeqCst);
                Ok(rows())
            })
            .await
            .unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_all_during_build_lands_stale() {
        let (cache, _clock) = cache_with_manual_clock(Duration::from_secs(600));
        let builds = Arc::new(AtomicUsize::new(0));

        let started = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());

        let build_cache = cache.clone();
        let build_builds = Arc::clone(&builds);
        let build_started = Arc::clone(&started);
        let build_release = Arc::clone(&release);
        let build = tokio::spawn(async move {
            build_cache
                .get_or_build("user-a", move || async move {
                    build_builds.fetch_add(1, Ordering::SeqCst);
                    build_started.notify_one();
                    build_release.notified().await;
                    Ok(rows())
                })
                .await
        });

        started.notified().await;
        // Inventory changed while the build was running.
        cache.invalidate_all();
        release.notify_one();
        build.await.unwrap().unwrap();

        // The landed entry predates the bump, so the next call rebuilds.
        let builds_clone = Arc::clone(&builds);
        cache
            .get_or_build("user-a", move || async move {
                builds_clone.fetch_add(1, Ordering::SeqCst);
                Ok(rows())
            })
            .await
            .unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }
}
