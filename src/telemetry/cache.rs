//! Single-flight, TTL-bounded summary cache
//!
//! Fronts one remote summary endpoint. Values younger than the TTL are
//! served as fresh; an expired value triggers a refetch that concurrent
//! callers share instead of issuing duplicate network calls. Fetch
//! failures degrade the last known value to a stale classification and
//! never propagate: telemetry attenuates the fee, it never blocks a
//! build. The fetch itself runs on a spawned task, so an abandoned
//! request still populates the cache for the next caller.

use crate::metrics::CacheCounters;
use crate::types::Freshness;
use async_trait::async_trait;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

/// Telemetry fetch failure; absorbed by the cache, never surfaced to
/// build callers
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Telemetry source unavailable: {0}")]
    Unavailable(String),

    #[error("Telemetry fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("Telemetry payload undecodable: {0}")]
    Decode(String),
}

/// One remote summary endpoint
#[async_trait]
pub trait SummaryFetch<T>: Send + Sync {
    async fn fetch(&self) -> Result<T, FetchError>;
}

/// Monotonic time source, injected so tests control staleness
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Production clock
#[derive(Debug, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for staleness tests
pub struct ManualClock {
    base: Instant,
    offset: std::sync::Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { base: Instant::now(), offset: std::sync::Mutex::new(Duration::ZERO) }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().expect("clock lock poisoned");
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().expect("clock lock poisoned")
    }
}

/// A cached value together with its trustworthiness
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSummary<T> {
    pub value: T,
    pub freshness: Freshness,
}

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, Arc<FetchError>>>>;

struct CacheState<T> {
    value: Option<(T, Instant)>,
    inflight: Option<SharedFetch<T>>,
}

/// TTL-bounded, single-flight cache over one summary source
pub struct SummaryCache<T> {
    name: &'static str,
    ttl: Duration,
    stale_soft_window: Duration,
    clock: Arc<dyn Clock>,
    fetcher: Arc<dyn SummaryFetch<T>>,
    state: Arc<Mutex<CacheState<T>>>,
    counters: Option<CacheCounters>,
}

impl<T: Clone + Send + Sync + 'static> SummaryCache<T> {
    pub fn new(
        name: &'static str,
        ttl: Duration,
        stale_soft_window: Duration,
        clock: Arc<dyn Clock>,
        fetcher: Arc<dyn SummaryFetch<T>>,
    ) -> Self {
        Self {
            name,
            ttl,
            stale_soft_window,
            clock,
            fetcher,
            state: Arc::new(Mutex::new(CacheState { value: None, inflight: None })),
            counters: None,
        }
    }

    /// Attach prometheus counters for this source
    pub fn with_counters(mut self, counters: CacheCounters) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Return the cached value, refetching through a shared in-flight
    /// call when expired. `None` means nothing has ever been fetched.
    pub async fn get(&self) -> Option<CachedSummary<T>> {
        let shared = {
            let mut state = self.state.lock().await;
            if let Some((value, stored_at)) = &state.value {
                if self.age(*stored_at) < self.ttl {
                    if let Some(c) = &self.counters {
                        c.hits.inc();
                    }
                    return Some(CachedSummary { value: value.clone(), freshness: Freshness::Fresh });
                }
            }
            match &state.inflight {
                Some(inflight) => {
                    if let Some(c) = &self.counters {
                        c.singleflight_joins.inc();
                    }
                    inflight.clone()
                }
                None => {
                    if let Some(c) = &self.counters {
                        c.misses.inc();
                    }
                    let shared = self.spawn_fetch();
                    state.inflight = Some(shared.clone());
                    shared
                }
            }
        };

        match shared.await {
            Ok(value) => Some(CachedSummary { value, freshness: Freshness::Fresh }),
            Err(err) => {
                if let Some(c) = &self.counters {
                    c.errors.inc();
                }
                warn!(source = self.name, error = %err, "telemetry fetch failed, degrading");
                self.degraded().await
            }
        }
    }

    /// Launch the fetch on its own task so it completes and populates the
    /// cache even if every awaiting request is abandoned
    fn spawn_fetch(&self) -> SharedFetch<T> {
        let fetcher = self.fetcher.clone();
        let state = self.state.clone();
        let clock = self.clock.clone();
        let handle = tokio::spawn(async move {
            let result = fetcher.fetch().await.map_err(Arc::new);
            let mut state = state.lock().await;
            if let Ok(value) = &result {
                state.value = Some((value.clone(), clock.now()));
            }
            state.inflight = None;
            result
        });
        async move {
            match handle.await {
                Ok(result) => result,
                Err(join_err) => {
                    Err(Arc::new(FetchError::Unavailable(format!("fetch task failed: {join_err}"))))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Last known value downgraded by its age past the TTL
    async fn degraded(&self) -> Option<CachedSummary<T>> {
        let state = self.state.lock().await;
        let (value, stored_at) = state.value.as_ref()?;
        let age = self.age(*stored_at);
        let freshness = if age < self.ttl {
            // A concurrent caller refreshed while we were failing
            Freshness::Fresh
        } else if age < self.ttl + self.stale_soft_window {
            Freshness::StaleSoft
        } else {
            Freshness::StaleHard
        };
        Some(CachedSummary { value: value.clone(), freshness })
    }

    fn age(&self, stored_at: Instant) -> Duration {
        self.clock.now().saturating_duration_since(stored_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    struct CountingFetcher {
        calls: AtomicU64,
        fail: AtomicBool,
        delay: Duration,
    }

    impl CountingFetcher {
        fn new() -> Self {
            Self { calls: AtomicU64::new(0), fail: AtomicBool::new(false), delay: Duration::ZERO }
        }

        fn slow(delay: Duration) -> Self {
            Self { calls: AtomicU64::new(0), fail: AtomicBool::new(false), delay }
        }

        fn set_failing(&self, failing: bool) {
            self.fail.store(failing, Ordering::SeqCst);
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SummaryFetch<u64> for CountingFetcher {
        async fn fetch(&self) -> Result<u64, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                Err(FetchError::Unavailable("down".to_string()))
            } else {
                Ok(call)
            }
        }
    }

    fn cache(
        clock: Arc<ManualClock>,
        fetcher: Arc<CountingFetcher>,
    ) -> SummaryCache<u64> {
        SummaryCache::new(
            "test",
            Duration::from_secs(30),
            Duration::from_secs(300),
            clock,
            fetcher,
        )
    }

    #[tokio::test]
    async fn test_fresh_value_is_served_without_refetch() {
        let clock = Arc::new(ManualClock::new());
        let fetcher = Arc::new(CountingFetcher::new());
        let cache = cache(clock.clone(), fetcher.clone());

        let first = cache.get().await.unwrap();
        assert_eq!(first.freshness, Freshness::Fresh);
        clock.advance(Duration::from_secs(10));
        let second = cache.get().await.unwrap();
        assert_eq!(second.value, first.value);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_value_triggers_refetch() {
        let clock = Arc::new(ManualClock::new());
        let fetcher = Arc::new(CountingFetcher::new());
        let cache = cache(clock.clone(), fetcher.clone());

        assert_eq!(cache.get().await.unwrap().value, 1);
        clock.advance(Duration::from_secs(31));
        let refreshed = cache.get().await.unwrap();
        assert_eq!(refreshed.value, 2);
        assert_eq!(refreshed.freshness, Freshness::Fresh);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_degrades_soft_then_hard() {
        let clock = Arc::new(ManualClock::new());
        let fetcher = Arc::new(CountingFetcher::new());
        let cache = cache(clock.clone(), fetcher.clone());

        assert_eq!(cache.get().await.unwrap().value, 1);
        fetcher.set_failing(true);

        // Past the TTL but inside the soft window
        clock.advance(Duration::from_secs(60));
        let soft = cache.get().await.unwrap();
        assert_eq!(soft.value, 1);
        assert_eq!(soft.freshness, Freshness::StaleSoft);

        // Past the soft window
        clock.advance(Duration::from_secs(300));
        let hard = cache.get().await.unwrap();
        assert_eq!(hard.value, 1);
        assert_eq!(hard.freshness, Freshness::StaleHard);
    }

    #[tokio::test]
    async fn test_failure_with_no_history_returns_none() {
        let clock = Arc::new(ManualClock::new());
        let fetcher = Arc::new(CountingFetcher::new());
        fetcher.set_failing(true);
        let cache = cache(clock, fetcher);
        assert!(cache.get().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_fetch() {
        let clock = Arc::new(ManualClock::new());
        let fetcher = Arc::new(CountingFetcher::slow(Duration::from_millis(50)));
        let cache = Arc::new(cache(clock, fetcher.clone()));

        let (a, b, c) = tokio::join!(cache.get(), cache.get(), cache.get());
        assert_eq!(a.unwrap().value, 1);
        assert_eq!(b.unwrap().value, 1);
        assert_eq!(c.unwrap().value, 1);
        assert_eq!(fetcher.calls(), 1);
    }
}
