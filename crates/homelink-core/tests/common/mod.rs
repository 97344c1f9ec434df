//! Test doubles and common utilities for architecture contract tests
//!
//! This module provides minimal test doubles that verify architectural
//! constraints without talking to real devices.

#![allow(dead_code)]

use homelink_core::error::{Error, Result};
use homelink_core::{
    ConfigEntry, ConfigEntryStore, Entity, Integration, IntegrationContext, MemoryEntryStore,
    PollingConfig, SensorDescriptor, Snapshot, SnapshotSource, Transform, UniqueId,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A source that replays scripted results and counts calls
///
/// When the script runs out the last successful snapshot is repeated.
pub struct ScriptedSource {
    name: String,
    script: Mutex<VecDeque<Result<Snapshot>>>,
    last: Mutex<Option<Snapshot>>,
    call_count: Arc<AtomicUsize>,
    delay: Duration,
}

impl ScriptedSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            call_count: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
        }
    }

    /// A source that always answers with `snapshot`
    pub fn always(name: &str, snapshot: Snapshot) -> Self {
        Self::new(name).then_ok(snapshot)
    }

    /// A source that always fails with a transient error
    pub fn failing(name: &str) -> Self {
        Self::new(name)
    }

    pub fn then_ok(self, snapshot: Snapshot) -> Self {
        self.script.lock().unwrap().push_back(Ok(snapshot));
        self
    }

    pub fn then_err(self, error: Error) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of fetch() calls so far
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Shared handle to the call counter
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.call_count)
    }
}

#[async_trait::async_trait]
impl SnapshotSource for ScriptedSource {
    async fn fetch(&self) -> Result<Snapshot> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(snapshot)) => {
                *self.last.lock().unwrap() = Some(snapshot.clone());
                Ok(snapshot)
            }
            Some(Err(e)) => Err(e),
            None => match self.last.lock().unwrap().clone() {
                Some(snapshot) => Ok(snapshot),
                None => Err(Error::transient("device unreachable")),
            },
        }
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

/// Flag descriptor excluding its own primary field from the attributes
pub fn flag_descriptor(kind: &str, field: &str) -> SensorDescriptor {
    SensorDescriptor::new(kind, format!("Test {}", kind), field, Transform::OnOff)
        .with_attributes([field])
}

/// Polling settings with the given throttle window
pub fn polling(min_fetch_interval_secs: u64) -> PollingConfig {
    PollingConfig {
        scan_interval_secs: 30,
        min_fetch_interval_secs,
        request_timeout_secs: 5,
    }
}

/// What a [`MockIntegration`] does on setup
#[derive(Clone)]
pub enum SetupBehavior {
    /// Build one flag sensor per `(kind, field)` over one shared source
    Sensors(Vec<(&'static str, &'static str)>),
    /// Fail with the produced error
    Fail(fn() -> Error),
}

/// Integration double that counts lifecycle calls
pub struct MockIntegration {
    behavior: SetupBehavior,
    snapshot: Snapshot,
    migrate: bool,
    setup_calls: AtomicUsize,
    unload_calls: AtomicUsize,
    source_counters: Mutex<Vec<Arc<AtomicUsize>>>,
    loaded: Mutex<Vec<String>>,
}

impl MockIntegration {
    pub fn new(behavior: SetupBehavior, snapshot: Snapshot) -> Self {
        Self {
            behavior,
            snapshot,
            migrate: false,
            setup_calls: AtomicUsize::new(0),
            unload_calls: AtomicUsize::new(0),
            source_counters: Mutex::new(Vec::new()),
            loaded: Mutex::new(Vec::new()),
        }
    }

    /// Back-fill `"auth_implementation": "mock"` into entry data
    pub fn with_migration(mut self) -> Self {
        self.migrate = true;
        self
    }

    pub fn setup_calls(&self) -> usize {
        self.setup_calls.load(Ordering::SeqCst)
    }

    pub fn unload_calls(&self) -> usize {
        self.unload_calls.load(Ordering::SeqCst)
    }

    /// Remote reads performed by every source built so far
    pub fn source_calls(&self) -> usize {
        self.source_counters
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.load(Ordering::SeqCst))
            .sum()
    }

    /// Owners currently set up
    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().unwrap().clone()
    }

    fn build(&self, owner: &str) -> Result<Vec<Arc<dyn Entity>>> {
        self.setup_calls.fetch_add(1, Ordering::SeqCst);
        let sensors = match &self.behavior {
            SetupBehavior::Sensors(sensors) => sensors,
            SetupBehavior::Fail(make_error) => return Err(make_error()),
        };

        let context = IntegrationContext::new("mock", owner, Arc::new(()), polling(10));
        let source = ScriptedSource::always("mock", self.snapshot.clone());
        self.source_counters.lock().unwrap().push(source.counter());
        let source: Arc<dyn SnapshotSource> = Arc::new(source);

        let entities = sensors
            .iter()
            .map(|(kind, field)| {
                Arc::new(context.sensor(
                    "shared",
                    flag_descriptor(kind, field),
                    UniqueId::from_parts(["mock", owner, kind]),
                    |_| Arc::clone(&source),
                )) as Arc<dyn Entity>
            })
            .collect();

        self.loaded.lock().unwrap().push(owner.to_string());
        Ok(entities)
    }
}

#[async_trait::async_trait]
impl Integration for MockIntegration {
    fn domain(&self) -> &'static str {
        "mock"
    }

    async fn setup(&self, section: &Value) -> Result<Vec<Arc<dyn Entity>>> {
        if !section.is_object() {
            return Err(Error::config("mock section must be an object"));
        }
        self.build("mock")
    }

    async fn setup_entry(&self, entry: &ConfigEntry) -> Result<Vec<Arc<dyn Entity>>> {
        if self.migrate && entry.data.get("auth_implementation").is_none() {
            return Err(Error::config("entry was not migrated"));
        }
        self.build(&entry.entry_id)
    }

    async fn unload_entry(&self, entry_id: &str) -> Result<()> {
        self.unload_calls.fetch_add(1, Ordering::SeqCst);
        self.loaded.lock().unwrap().retain(|id| id != entry_id);
        Ok(())
    }

    fn migrate_entry_data(&self, data: &mut Value) -> bool {
        if !self.migrate {
            return false;
        }
        match data.as_object_mut() {
            Some(map) if !map.contains_key("auth_implementation") => {
                map.insert("auth_implementation".to_string(), Value::from("mock"));
                true
            }
            _ => false,
        }
    }

    async fn validate_input(&self, data: &Value) -> Result<String> {
        match data.get("host").and_then(Value::as_str) {
            Some("unreachable") => Err(Error::connect("no route to host")),
            Some("locked") => Err(Error::auth("bad password")),
            Some("broken") => Err(Error::malformed("garbage login page")),
            Some(host) => Ok(format!("Mock {}", host)),
            None => Err(Error::config("host is required")),
        }
    }
}

/// Entry store wrapper that counts flushes
pub struct CountingEntryStore {
    inner: MemoryEntryStore,
    flush_count: AtomicUsize,
    update_count: AtomicUsize,
}

impl CountingEntryStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryEntryStore::new(),
            flush_count: AtomicUsize::new(0),
            update_count: AtomicUsize::new(0),
        }
    }

    pub fn flush_count(&self) -> usize {
        self.flush_count.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.update_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ConfigEntryStore for CountingEntryStore {
    async fn get_entry(&self, entry_id: &str) -> Result<Option<ConfigEntry>> {
        self.inner.get_entry(entry_id).await
    }

    async fn entries_for_domain(&self, domain: &str) -> Result<Vec<ConfigEntry>> {
        self.inner.entries_for_domain(domain).await
    }

    async fn add_entry(&self, entry: &ConfigEntry) -> Result<()> {
        self.inner.add_entry(entry).await
    }

    async fn update_entry(&self, entry: &ConfigEntry) -> Result<()> {
        self.update_count.fetch_add(1, Ordering::SeqCst);
        self.inner.update_entry(entry).await
    }

    async fn remove_entry(&self, entry_id: &str) -> Result<bool> {
        self.inner.remove_entry(entry_id).await
    }

    async fn list_entries(&self) -> Result<Vec<String>> {
        self.inner.list_entries().await
    }

    async fn flush(&self) -> Result<()> {
        self.flush_count.fetch_add(1, Ordering::SeqCst);
        self.inner.flush().await
    }
}

/// The router NVRAM snapshot used across tests
pub fn router_snapshot() -> Snapshot {
    Snapshot::from_pairs([
        ("wl0_bss_enabled", "1"),
        ("qos_enable", "0"),
        ("model", "RT-X"),
        ("buildno", "v1.2"),
    ])
}
