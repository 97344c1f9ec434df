//! Sensor entity adapter
//!
//! [`SensorEntity`] bridges the host scheduler to a shared
//! [`ThrottledFetcher`] and the pure [`project`] function. Each refresh walks
//! `Idle → Fetching → {Published | Stale}`; a failed fetch keeps the value
//! published by the last successful one.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::projection::{ProjectedValue, SensorDescriptor, StateValue, project};
use crate::throttle::ThrottledFetcher;
use crate::traits::{Entity, EntityPhase, RefreshOutcome};

/// Normalized stable entity identifier
///
/// Lowercase; every character outside `[a-z0-9_]` becomes `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniqueId(String);

impl UniqueId {
    /// Normalize a raw identifier
    pub fn new(raw: &str) -> Self {
        let normalized = raw
            .chars()
            .flat_map(char::to_lowercase)
            .map(|c| {
                if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        Self(normalized)
    }

    /// Join parts with `_` and normalize
    ///
    /// ```rust,ignore
    /// UniqueId::from_parts(["asuswrt", "192.168.1.1", "2g_wifi"])
    /// // "asuswrt_192_168_1_1_2g_wifi"
    /// ```
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = parts
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .collect::<Vec<_>>()
            .join("_");
        Self::new(&joined)
    }

    /// The identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UniqueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

struct Published {
    phase: EntityPhase,
    value: ProjectedValue,
}

/// Entity adapter for one sensor kind over a shared fetcher
pub struct SensorEntity {
    descriptor: SensorDescriptor,
    unique_id: UniqueId,
    fetcher: Arc<ThrottledFetcher>,
    // Serializes refreshes of this adapter
    refresh_lock: Mutex<()>,
    published: RwLock<Published>,
}

impl SensorEntity {
    /// Create an adapter in the `Idle` phase with an unknown state
    pub fn new(
        descriptor: SensorDescriptor,
        unique_id: UniqueId,
        fetcher: Arc<ThrottledFetcher>,
    ) -> Self {
        Self {
            descriptor,
            unique_id,
            fetcher,
            refresh_lock: Mutex::new(()),
            published: RwLock::new(Published {
                phase: EntityPhase::Idle,
                value: ProjectedValue::unknown(),
            }),
        }
    }

    /// Static descriptor
    pub fn descriptor(&self) -> &SensorDescriptor {
        &self.descriptor
    }

    /// Shared fetcher
    pub fn fetcher(&self) -> &Arc<ThrottledFetcher> {
        &self.fetcher
    }

    /// Last published value
    pub fn value(&self) -> ProjectedValue {
        self.read(|p| p.value.clone())
    }

    fn read<T>(&self, f: impl FnOnce(&Published) -> T) -> T {
        let guard = self.published.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write(&self, f: impl FnOnce(&mut Published)) {
        let mut guard = self
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
    }
}

#[async_trait]
impl Entity for SensorEntity {
    fn unique_id(&self) -> &str {
        self.unique_id.as_str()
    }

    fn name(&self) -> String {
        self.read(|p| p.value.name.clone())
            .unwrap_or_else(|| self.descriptor.name.clone())
    }

    fn state(&self) -> StateValue {
        self.read(|p| p.value.state.clone())
    }

    fn unit(&self) -> Option<&str> {
        self.descriptor.unit.as_deref()
    }

    fn icon(&self) -> Option<&str> {
        self.descriptor.icon.as_deref()
    }

    fn attributes(&self) -> BTreeMap<String, Value> {
        self.read(|p| p.value.attributes.clone())
    }

    fn phase(&self) -> EntityPhase {
        self.read(|p| p.phase)
    }

    async fn refresh(&self) -> RefreshOutcome {
        let _guard = self.refresh_lock.lock().await;
        self.write(|p| p.phase = EntityPhase::Fetching);

        match self.fetcher.fetch().await {
            Ok(snapshot) => {
                let value = project(&snapshot, &self.descriptor);
                debug!("Sensor {} published {}", self.unique_id, value.state);
                self.write(|p| {
                    p.value = value;
                    p.phase = EntityPhase::Published;
                });
                RefreshOutcome::Published
            }
            Err(e) => {
                if e.is_auth() {
                    error!(
                        "Sensor {} cannot authenticate with {}: {}",
                        self.unique_id,
                        self.fetcher.source_name(),
                        e
                    );
                } else {
                    warn!(
                        "Sensor {} keeps its previous value, fetch from {} failed: {}",
                        self.unique_id,
                        self.fetcher.source_name(),
                        e
                    );
                }
                self.write(|p| p.phase = EntityPhase::Stale);
                RefreshOutcome::Stale {
                    class: e.class(),
                    message: e.to_string(),
                }
            }
        }
    }
}

impl std::fmt::Debug for SensorEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorEntity")
            .field("unique_id", &self.unique_id)
            .field("kind", &self.descriptor.kind)
            .field("phase", &self.phase())
            .finish()
    }
}
