//! Throttled snapshot fetcher
//!
//! [`ThrottledFetcher`] is the single enforcement point for the minimum
//! interval between remote reads. All sensors of one integration entry that
//! read the same source share one fetcher, so N sibling sensors refreshing in
//! the same tick cause at most one network call.
//!
//! ## Rules
//!
//! - The window is measured from the last *attempt*, successful or not
//! - Inside the window callers get the cached snapshot; if there is none
//!   (every attempt so far failed) they get [`Error::TransientFetch`]
//! - At most one request per fetcher is in flight; concurrent callers wait
//!   for it and then see its result through the cache
//! - Every request is bounded by `request_timeout`; a timeout is transient

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{Error, Result};
use crate::snapshot::Snapshot;
use crate::traits::SnapshotSource;

#[derive(Default)]
struct FetchCache {
    last_attempt: Option<Instant>,
    snapshot: Option<Arc<Snapshot>>,
}

/// Rate-limited, caching wrapper around a [`SnapshotSource`]
pub struct ThrottledFetcher {
    source: Arc<dyn SnapshotSource>,
    min_interval: Duration,
    request_timeout: Duration,
    // Held across the network call
    cache: Mutex<FetchCache>,
    network_calls: AtomicU64,
}

impl ThrottledFetcher {
    /// Create a fetcher
    ///
    /// # Parameters
    ///
    /// - `source`: The remote read to throttle
    /// - `min_interval`: Minimum time between two network calls
    /// - `request_timeout`: Upper bound for a single network call
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        min_interval: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            source,
            min_interval,
            request_timeout,
            cache: Mutex::new(FetchCache::default()),
            network_calls: AtomicU64::new(0),
        }
    }

    /// Return a snapshot no older than the throttle window allows
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<Snapshot>)`: Fresh or cached snapshot
    /// - `Err(Error)`: The network call failed or timed out, or the window is
    ///   still closed and no snapshot has ever been fetched
    pub async fn fetch(&self) -> Result<Arc<Snapshot>> {
        let mut cache = self.cache.lock().await;

        if let Some(last_attempt) = cache.last_attempt {
            let elapsed = last_attempt.elapsed();
            if elapsed < self.min_interval {
                debug!(
                    "Throttled fetch for {} ({:?} since last attempt)",
                    self.source.source_name(),
                    elapsed
                );
                return match &cache.snapshot {
                    Some(snapshot) => Ok(Arc::clone(snapshot)),
                    None => Err(Error::transient(format!(
                        "{} has no snapshot yet and the throttle window is closed",
                        self.source.source_name()
                    ))),
                };
            }
        }

        cache.last_attempt = Some(Instant::now());
        self.network_calls.fetch_add(1, Ordering::Relaxed);

        match tokio::time::timeout(self.request_timeout, self.source.fetch()).await {
            Ok(Ok(snapshot)) => {
                debug!(
                    "Fetched {} fields from {}",
                    snapshot.len(),
                    self.source.source_name()
                );
                let snapshot = Arc::new(snapshot);
                cache.snapshot = Some(Arc::clone(&snapshot));
                Ok(snapshot)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::transient(format!(
                "{} did not answer within {:?}",
                self.source.source_name(),
                self.request_timeout
            ))),
        }
    }

    /// Last successfully fetched snapshot, without any network I/O
    pub async fn latest(&self) -> Option<Arc<Snapshot>> {
        self.cache.lock().await.snapshot.clone()
    }

    /// Number of network calls made so far
    pub fn network_calls(&self) -> u64 {
        self.network_calls.load(Ordering::Relaxed)
    }

    /// Name of the wrapped source
    pub fn source_name(&self) -> &str {
        self.source.source_name()
    }

    /// Configured minimum interval
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

impl std::fmt::Debug for ThrottledFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottledFetcher")
            .field("source", &self.source.source_name())
            .field("min_interval", &self.min_interval)
            .field("request_timeout", &self.request_timeout)
            .field("network_calls", &self.network_calls())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    struct CountingSource {
        calls: AtomicUsize,
        fail_from: Option<usize>,
        delay: Duration,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_from: None,
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl SnapshotSource for CountingSource {
        async fn fetch(&self) -> Result<Snapshot> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail_from.is_some_and(|from| n >= from) {
                return Err(Error::transient("router busy"));
            }
            Ok(Snapshot::from_pairs([("call", json!(n))]))
        }

        fn source_name(&self) -> &str {
            "counting"
        }
    }

    fn fetcher(source: Arc<CountingSource>, min_interval: u64) -> ThrottledFetcher {
        ThrottledFetcher::new(
            source,
            Duration::from_secs(min_interval),
            Duration::from_secs(5),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_fetch_in_window_is_cached() {
        let source = Arc::new(CountingSource::new());
        let fetcher = fetcher(source.clone(), 10);

        let first = fetcher.fetch().await.unwrap();
        tokio::time::advance(Duration::from_secs(3)).await;
        let second = fetcher.fetch().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.network_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_after_window_hits_network() {
        let source = Arc::new(CountingSource::new());
        let fetcher = fetcher(source.clone(), 10);

        fetcher.fetch().await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        let second = fetcher.fetch().await.unwrap();

        assert_eq!(second.get("call"), Some(&json!(1)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_in_window_returns_last_good() {
        let source = Arc::new(CountingSource {
            fail_from: Some(1),
            ..CountingSource::new()
        });
        let fetcher = fetcher(source.clone(), 10);

        fetcher.fetch().await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;
        let err = fetcher.fetch().await.unwrap_err();
        assert!(err.is_transient());

        // Window reopened by the failed attempt: cached value, no new call
        let cached = fetcher.fetch().await.unwrap();
        assert_eq!(cached.get("call"), Some(&json!(0)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_snapshot_in_window_is_transient() {
        let source = Arc::new(CountingSource {
            fail_from: Some(0),
            ..CountingSource::new()
        });
        let fetcher = fetcher(source.clone(), 10);

        assert!(fetcher.fetch().await.is_err());
        let err = fetcher.fetch().await.unwrap_err();
        assert!(matches!(err, Error::TransientFetch(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(fetcher.latest().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_transient() {
        let source = Arc::new(CountingSource {
            delay: Duration::from_secs(60),
            ..CountingSource::new()
        });
        let fetcher = fetcher(source, 10);

        let err = fetcher.fetch().await.unwrap_err();
        assert!(matches!(err, Error::TransientFetch(_)));
        assert!(err.to_string().contains("did not answer"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_call() {
        let source = Arc::new(CountingSource {
            delay: Duration::from_secs(1),
            ..CountingSource::new()
        });
        let fetcher = Arc::new(fetcher(source.clone(), 10));

        let a = tokio::spawn({
            let fetcher = fetcher.clone();
            async move { fetcher.fetch().await }
        });
        let b = tokio::spawn({
            let fetcher = fetcher.clone();
            async move { fetcher.fetch().await }
        });

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
