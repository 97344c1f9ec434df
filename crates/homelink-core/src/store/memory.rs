// # Memory Entry Store
//
// In-memory implementation of ConfigEntryStore.
//
// ## When to Use
//
// - Tests and one-shot runs
// - Hosts that rebuild entries from a legacy configuration on every start
//
// Everything is lost on restart.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::ConfigEntry;
use crate::traits::ConfigEntryStore;

/// In-memory config entry store
///
/// # Example
///
/// ```rust,no_run
/// use homelink_core::{ConfigEntry, ConfigEntryStore, MemoryEntryStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryEntryStore::new();
///     let entry = ConfigEntry::new("e1", "fitbark", "FitBark", serde_json::json!({}));
///
///     store.add_entry(&entry).await?;
///     assert_eq!(store.entries_for_domain("fitbark").await?.len(), 1);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryEntryStore {
    inner: Arc<RwLock<HashMap<String, ConfigEntry>>>,
}

impl MemoryEntryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

pub(crate) fn sorted_for_domain<'a>(
    entries: impl Iterator<Item = &'a ConfigEntry>,
    domain: &str,
) -> Vec<ConfigEntry> {
    let mut matching: Vec<ConfigEntry> = entries
        .filter(|entry| entry.domain == domain)
        .cloned()
        .collect();
    matching.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.entry_id.cmp(&b.entry_id))
    });
    matching
}

#[async_trait]
impl ConfigEntryStore for MemoryEntryStore {
    async fn get_entry(&self, entry_id: &str) -> Result<Option<ConfigEntry>, Error> {
        Ok(self.inner.read().await.get(entry_id).cloned())
    }

    async fn entries_for_domain(&self, domain: &str) -> Result<Vec<ConfigEntry>, Error> {
        let guard = self.inner.read().await;
        Ok(sorted_for_domain(guard.values(), domain))
    }

    async fn add_entry(&self, entry: &ConfigEntry) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        if guard.contains_key(&entry.entry_id) {
            return Err(Error::entry_store(format!(
                "Entry {} already exists",
                entry.entry_id
            )));
        }
        guard.insert(entry.entry_id.clone(), entry.clone());
        Ok(())
    }

    async fn update_entry(&self, entry: &ConfigEntry) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        match guard.get_mut(&entry.entry_id) {
            Some(existing) => {
                *existing = entry.clone();
                Ok(())
            }
            None => Err(Error::not_found(format!("Entry {}", entry.entry_id))),
        }
    }

    async fn remove_entry(&self, entry_id: &str) -> Result<bool, Error> {
        Ok(self.inner.write().await.remove(entry_id).is_some())
    }

    async fn list_entries(&self) -> Result<Vec<String>, Error> {
        let mut ids: Vec<String> = self.inner.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing buffered
        Ok(())
    }
}
