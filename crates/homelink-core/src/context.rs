//! Per-entry integration context
//!
//! An [`IntegrationContext`] is created when a config entry (or legacy
//! section) is set up and dropped when it is unloaded. It owns the
//! authenticated client handle and the fetchers shared by the entry's
//! sensors, so every adapter is built from explicit state rather than a
//! global lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::config::PollingConfig;
use crate::entity::{SensorEntity, UniqueId};
use crate::projection::SensorDescriptor;
use crate::throttle::ThrottledFetcher;
use crate::traits::SnapshotSource;

/// State owned by one set-up config entry
pub struct IntegrationContext<C: ?Sized> {
    domain: &'static str,
    entry_id: String,
    client: Arc<C>,
    polling: PollingConfig,
    min_fetch_interval: Duration,
    fetchers: Mutex<HashMap<String, Arc<ThrottledFetcher>>>,
}

impl<C: ?Sized + Send + Sync> IntegrationContext<C> {
    /// Create a context
    ///
    /// # Parameters
    ///
    /// - `domain`: Owning integration domain
    /// - `entry_id`: Config entry id (or the domain for legacy setups)
    /// - `client`: Authenticated vendor client shared by every source
    /// - `polling`: Host polling settings
    pub fn new(
        domain: &'static str,
        entry_id: impl Into<String>,
        client: Arc<C>,
        polling: PollingConfig,
    ) -> Self {
        let min_fetch_interval = polling.min_fetch_interval();
        Self {
            domain,
            entry_id: entry_id.into(),
            client,
            polling,
            min_fetch_interval,
            fetchers: Mutex::new(HashMap::new()),
        }
    }

    /// Raise the throttle window for this entry's fetchers
    ///
    /// The host minimum still applies when it is larger.
    pub fn with_min_fetch_interval(mut self, interval: Duration) -> Self {
        self.min_fetch_interval = self.min_fetch_interval.max(interval);
        self
    }

    /// Owning integration domain
    pub fn domain(&self) -> &'static str {
        self.domain
    }

    /// Config entry id
    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    /// Shared client handle
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Host polling settings
    pub fn polling(&self) -> &PollingConfig {
        &self.polling
    }

    /// Get the fetcher registered under `key`, creating it on first use
    ///
    /// `make_source` is only called when no fetcher exists for `key`.
    pub fn fetcher<F>(&self, key: &str, make_source: F) -> Arc<ThrottledFetcher>
    where
        F: FnOnce(&Arc<C>) -> Arc<dyn SnapshotSource>,
    {
        let mut fetchers = self.fetchers.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(fetchers.entry(key.to_string()).or_insert_with(|| {
            tracing::debug!(
                "Creating {} fetcher '{}' for entry {}",
                self.domain,
                key,
                self.entry_id
            );
            Arc::new(ThrottledFetcher::new(
                make_source(&self.client),
                self.min_fetch_interval,
                self.polling.request_timeout(),
            ))
        }))
    }

    /// Build a sensor adapter over the fetcher registered under `key`
    pub fn sensor<F>(
        &self,
        key: &str,
        descriptor: SensorDescriptor,
        unique_id: UniqueId,
        make_source: F,
    ) -> SensorEntity
    where
        F: FnOnce(&Arc<C>) -> Arc<dyn SnapshotSource>,
    {
        SensorEntity::new(descriptor, unique_id, self.fetcher(key, make_source))
    }

    /// Number of distinct fetchers created so far
    pub fn fetcher_count(&self) -> usize {
        self.fetchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<C: ?Sized> std::fmt::Debug for IntegrationContext<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationContext")
            .field("domain", &self.domain)
            .field("entry_id", &self.entry_id)
            .field("min_fetch_interval", &self.min_fetch_interval)
            .finish_non_exhaustive()
    }
}
