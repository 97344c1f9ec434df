// # Integration Trait
//
// Defines the interface every device integration implements: how it is set
// up from a legacy configuration section or a stored config entry, how it is
// unloaded, and how the user config flow validates its input.
//
// ## Implementations
//
// - Router monitoring: `homelink-asuswrt` crate
// - Pet activity tracker: `homelink-fitbark` crate
//
// ## Usage
//
// ```rust,ignore
// use homelink_core::Integration;
//
// let integration = /* Integration implementation */;
//
// let entities = integration.setup_entry(&entry).await?;
// registrar.register_entities(&entry.entry_id, entities, true).await?;
//
// // ...
//
// integration.unload_entry(&entry.entry_id).await?;
// ```

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::config::{ConfigEntry, PollingConfig};
use crate::traits::Entity;

/// Trait for device integrations
///
/// # Trust Level: Untrusted
///
/// Integrations talk to third-party devices and cloud APIs.
///
/// ## Allowed Capabilities
/// - ✅ Open vendor sessions and build snapshot sources
/// - ✅ Build entities from their own per-entry context
/// - ✅ Return classified errors (the lifecycle turns them into `false`)
///
/// ## Forbidden Capabilities
/// - ❌ Register entities with the host directly (the lifecycle does it)
/// - ❌ Access the config entry store (the lifecycle persists migrations)
/// - ❌ Spawn polling loops (the host scheduler drives refreshes)
/// - ❌ Share state with other integrations
#[async_trait]
pub trait Integration: Send + Sync {
    /// Integration domain (e.g. "asuswrt")
    fn domain(&self) -> &'static str;

    /// Set up from the integration's section of a legacy configuration
    ///
    /// # Parameters
    ///
    /// - `section`: The value stored under `[domain]` in the root document
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<Arc<dyn Entity>>)`: Entities to register (may be empty)
    /// - `Err(Error)`: Invalid section or the device/API is unreachable
    async fn setup(&self, section: &Value) -> Result<Vec<Arc<dyn Entity>>, crate::Error> {
        let _ = section;
        Ok(Vec::new())
    }

    /// Set up one stored config entry
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<Arc<dyn Entity>>)`: Entities to register
    /// - `Err(Error)`: Invalid entry data or the device/API is unreachable
    async fn setup_entry(&self, entry: &ConfigEntry)
    -> Result<Vec<Arc<dyn Entity>>, crate::Error>;

    /// Release everything held for one config entry
    ///
    /// Unloading an entry that was never set up is not an error.
    async fn unload_entry(&self, entry_id: &str) -> Result<(), crate::Error>;

    /// Bring older entry data up to date in place
    ///
    /// # Returns
    ///
    /// `true` if `data` was changed and must be persisted
    fn migrate_entry_data(&self, data: &mut Value) -> bool {
        let _ = data;
        false
    }

    /// Validate user input for a new config entry
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: Title for the new entry
    /// - `Err(Error)`: Classified failure shown as a form error
    async fn validate_input(&self, data: &Value) -> Result<String, crate::Error>;
}

/// Helper trait for constructing integrations from host settings
pub trait IntegrationFactory: Send + Sync {
    /// Create an Integration instance
    ///
    /// # Parameters
    ///
    /// - `polling`: Host polling settings every fetcher is built from
    ///
    /// # Returns
    ///
    /// A boxed Integration trait object
    fn create(&self, polling: &PollingConfig) -> Result<Box<dyn Integration>, crate::Error>;
}
