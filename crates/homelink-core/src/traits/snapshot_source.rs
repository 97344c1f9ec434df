// # Snapshot Source Trait
//
// Defines the vendor-facing read boundary: one call, one remote read.
//
// ## Implementations
//
// - Router traffic counters and NVRAM groups: `homelink-asuswrt` crate
// - Tracker dog list and per-dog records: `homelink-fitbark` crate
//
// ## Usage
//
// ```rust,ignore
// use homelink_core::{SnapshotSource, ThrottledFetcher};
// use std::sync::Arc;
// use std::time::Duration;
//
// let source: Arc<dyn SnapshotSource> = /* SnapshotSource implementation */;
// let fetcher = ThrottledFetcher::new(source, Duration::from_secs(10), Duration::from_secs(10));
//
// // Every sensor sharing this fetcher reuses the cached snapshot inside the window
// let snapshot = fetcher.fetch().await?;
// ```

use async_trait::async_trait;

use crate::snapshot::Snapshot;

/// Trait for remote snapshot sources
///
/// A source wraps an already authenticated vendor client and turns one
/// network round trip into a [`Snapshot`].
///
/// # Trust Level: Semi-Trusted
///
/// Snapshot sources are **semi-trusted** components with the following capabilities:
///
/// ## Allowed Capabilities
/// - ✅ Perform vendor network I/O through the client they were given
/// - ✅ Normalize vendor payloads into flat snapshot fields
///
/// ## Forbidden Capabilities
/// - ❌ Cache snapshots (use `ThrottledFetcher`)
/// - ❌ Implement retry or backoff (the next scheduled tick is the retry)
/// - ❌ Spawn background tasks or polling loops
/// - ❌ Publish entity state directly (use `SensorEntity`)
///
/// ## Rationale
///
/// Throttling, caching and timeouts are enforced in exactly one place so
/// that sibling sensors sharing a source never multiply remote calls.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Perform one remote read
    ///
    /// # Returns
    ///
    /// - `Ok(Snapshot)`: A fresh snapshot
    /// - `Err(Error)`: A classified failure (connect, auth, transient, malformed)
    async fn fetch(&self) -> Result<Snapshot, crate::Error>;

    /// Name used in logs
    fn source_name(&self) -> &str;
}
