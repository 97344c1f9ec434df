//! Integration lifecycle variants
//!
//! The host sets an integration up in one of two ways:
//!
//! - [`LegacyConfig`]: from the integration's section of a root configuration document
//! - [`ConfigEntrySetup`]: from one stored [`ConfigEntry`]
//!
//! Both implement [`Lifecycle`], whose hooks answer with a plain `bool`.
//! Every error is logged and turned into `false` here; nothing raised by an
//! integration reaches the host.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::ConfigEntry;
use crate::error::Error;
use crate::traits::{ConfigEntryStore, EntityRegistrar, Integration};

/// Host lifecycle hooks for one integration instance
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Set up the integration and register its entities
    ///
    /// # Returns
    ///
    /// `true` on success, `false` after logging any failure
    async fn initialize(&self, integration: &dyn Integration, host: &dyn EntityRegistrar) -> bool;

    /// Unload the integration and remove its entities
    ///
    /// # Returns
    ///
    /// `true` on success, `false` after logging any failure
    async fn teardown(&self, integration: &dyn Integration, host: &dyn EntityRegistrar) -> bool;
}

fn log_setup_failure(domain: &str, owner: &str, e: &Error) {
    if e.is_auth() {
        error!(
            "Setup of {} ({}) failed, credentials were rejected: {}",
            domain, owner, e
        );
    } else {
        error!("Setup of {} ({}) failed: {}", domain, owner, e);
    }
}

/// Setup from a legacy root configuration document
///
/// The integration receives the value stored under its domain key. A
/// document without that key is not an error: the integration is simply
/// not configured this way.
#[derive(Debug, Clone)]
pub struct LegacyConfig {
    root: Value,
}

impl LegacyConfig {
    /// Wrap a root configuration document
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// The section for `domain`, if present
    pub fn section(&self, domain: &str) -> Option<&Value> {
        self.root.get(domain)
    }
}

#[async_trait]
impl Lifecycle for LegacyConfig {
    async fn initialize(&self, integration: &dyn Integration, host: &dyn EntityRegistrar) -> bool {
        let domain = integration.domain();
        let Some(section) = self.section(domain) else {
            info!("No {} section in configuration, skipping legacy setup", domain);
            return true;
        };

        let entities = match integration.setup(section).await {
            Ok(entities) => entities,
            Err(e) => {
                log_setup_failure(domain, domain, &e);
                return false;
            }
        };

        if entities.is_empty() {
            return true;
        }

        match host.register_entities(domain, entities, true).await {
            Ok(count) => {
                info!("{} legacy setup added {} entities", domain, count);
                true
            }
            Err(e) => {
                error!("Registering {} entities failed: {}", domain, e);
                if let Err(unload_err) = integration.unload_entry(domain).await {
                    warn!("Unloading {} failed: {}", domain, unload_err);
                }
                false
            }
        }
    }

    async fn teardown(&self, integration: &dyn Integration, host: &dyn EntityRegistrar) -> bool {
        let domain = integration.domain();
        if self.section(domain).is_none() {
            return true;
        }
        host.remove_entities(domain).await;
        match integration.unload_entry(domain).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Unloading {} failed: {}", domain, e);
                false
            }
        }
    }
}

/// Setup from one stored config entry
pub struct ConfigEntrySetup {
    entry: ConfigEntry,
    store: Option<Arc<dyn ConfigEntryStore>>,
}

impl ConfigEntrySetup {
    /// Set up `entry`; migrated data is not persisted
    pub fn new(entry: ConfigEntry) -> Self {
        Self { entry, store: None }
    }

    /// Persist migrated entry data to `store`
    pub fn with_store(mut self, store: Arc<dyn ConfigEntryStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// The entry as given (before migration)
    pub fn entry(&self) -> &ConfigEntry {
        &self.entry
    }

    async fn migrated_entry(&self, integration: &dyn Integration) -> Result<ConfigEntry, Error> {
        let mut entry = self.entry.clone();
        if integration.migrate_entry_data(&mut entry.data) {
            info!(
                "Migrated {} entry {} data",
                entry.domain, entry.entry_id
            );
            if let Some(store) = &self.store {
                store.update_entry(&entry).await?;
            }
        }
        Ok(entry)
    }
}

impl std::fmt::Debug for ConfigEntrySetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Entry data carries credentials
        f.debug_struct("ConfigEntrySetup")
            .field("entry_id", &self.entry.entry_id)
            .field("domain", &self.entry.domain)
            .field("persisted", &self.store.is_some())
            .finish()
    }
}

#[async_trait]
impl Lifecycle for ConfigEntrySetup {
    async fn initialize(&self, integration: &dyn Integration, host: &dyn EntityRegistrar) -> bool {
        let domain = integration.domain();
        if self.entry.domain != domain {
            error!(
                "Entry {} belongs to {}, not {}",
                self.entry.entry_id, self.entry.domain, domain
            );
            return false;
        }

        let entry = match self.migrated_entry(integration).await {
            Ok(entry) => entry,
            Err(e) => {
                error!(
                    "Persisting migrated entry {} failed: {}",
                    self.entry.entry_id, e
                );
                return false;
            }
        };

        let entities = match integration.setup_entry(&entry).await {
            Ok(entities) => entities,
            Err(e) => {
                log_setup_failure(domain, &entry.entry_id, &e);
                return false;
            }
        };

        match host
            .register_entities(&entry.entry_id, entities, true)
            .await
        {
            Ok(count) => {
                info!(
                    "{} entry {} added {} entities",
                    domain, entry.entry_id, count
                );
                true
            }
            Err(e) => {
                error!(
                    "Registering entities of entry {} failed: {}",
                    entry.entry_id, e
                );
                if let Err(unload_err) = integration.unload_entry(&entry.entry_id).await {
                    warn!("Unloading entry {} failed: {}", entry.entry_id, unload_err);
                }
                false
            }
        }
    }

    async fn teardown(&self, integration: &dyn Integration, host: &dyn EntityRegistrar) -> bool {
        host.remove_entities(&self.entry.entry_id).await;
        match integration.unload_entry(&self.entry.entry_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Unloading entry {} failed: {}", self.entry.entry_id, e);
                false
            }
        }
    }
}
