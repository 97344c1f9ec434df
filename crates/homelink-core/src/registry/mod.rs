//! Plugin-based integration registry
//!
//! The registry lets integrations register themselves by domain at startup,
//! so the host never dispatches on integration names with if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use homelink_core::{IntegrationRegistry, PollingConfig};
//!
//! let registry = IntegrationRegistry::new();
//!
//! // In each integration crate
//! homelink_asuswrt::register(&registry);
//! homelink_fitbark::register(&registry);
//!
//! // In the host
//! let integration = registry.create("asuswrt", &PollingConfig::default())?;
//! ```

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::config::PollingConfig;
use crate::error::{Error, Result};
use crate::traits::{Integration, IntegrationFactory};

/// Integration registry keyed by domain
///
/// ## Thread Safety
///
/// Uses interior mutability with RwLock, allowing concurrent lookups and
/// exclusive registration.
#[derive(Default)]
pub struct IntegrationRegistry {
    factories: RwLock<HashMap<String, Box<dyn IntegrationFactory>>>,
}

impl IntegrationRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an integration factory
    ///
    /// Registering the same domain twice replaces the earlier factory.
    ///
    /// # Parameters
    ///
    /// - `domain`: Integration domain (e.g., "asuswrt", "fitbark")
    /// - `factory`: Factory object for creating integration instances
    pub fn register(&self, domain: impl Into<String>, factory: Box<dyn IntegrationFactory>) {
        let domain = domain.into();
        let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
        if factories.insert(domain.clone(), factory).is_some() {
            tracing::warn!("Integration {} registered twice, keeping the latest", domain);
        }
    }

    /// Create an integration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn Integration>)`: Created integration instance
    /// - `Err(Error)`: If the domain is not registered or creation fails
    pub fn create(&self, domain: &str, polling: &PollingConfig) -> Result<Box<dyn Integration>> {
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        let factory = factories
            .get(domain)
            .ok_or_else(|| Error::config(format!("Unknown integration: {}", domain)))?;
        factory.create(polling)
    }

    /// Check if a domain is registered
    pub fn has(&self, domain: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(domain)
    }

    /// Registered domains, sorted
    pub fn list(&self) -> Vec<String> {
        let mut domains: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        domains.sort();
        domains
    }
}
