// # Entity Traits
//
// The host-facing side of an integration: what a sensor exposes, and how an
// integration hands its sensors to the host scheduler.
//
// ## Implementations
//
// - `Entity`: `SensorEntity` in this crate
// - `EntityRegistrar`: `PollingEngine` in this crate (stand-in for the host)
//
// ## Usage
//
// ```rust,ignore
// use homelink_core::{Entity, EntityRegistrar};
//
// let entities = integration.setup_entry(&entry).await?;
// registrar.register_entities(&entry.entry_id, entities, true).await?;
//
// // Later, on every scheduled tick
// for entity in engine.entities() {
//     entity.refresh().await;
//     println!("{} = {}", entity.name(), entity.state());
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ErrorClass;
use crate::projection::StateValue;

/// Where an adapter is in its refresh cycle
///
/// `Idle → Fetching → {Published | Stale}`, and from either end state the
/// next tick goes back to `Fetching`. There is no terminal failure state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityPhase {
    /// Never refreshed
    Idle,
    /// A refresh is in progress
    Fetching,
    /// The last refresh published a new value
    Published,
    /// The last refresh failed; the previous value is still shown
    Stale,
}

/// Result of one refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new value was projected and published
    Published,
    /// The fetch failed; the previous value was kept
    Stale {
        /// Class of the fetch error
        class: ErrorClass,
        /// Error message
        message: String,
    },
}

impl RefreshOutcome {
    /// Whether a new value was published
    pub fn is_published(&self) -> bool {
        matches!(self, RefreshOutcome::Published)
    }
}

/// Host entity contract
///
/// Getters are synchronous and cheap; only [`Entity::refresh`] performs I/O.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Call its shared fetcher and project the result
/// - ✅ Log fetch failures
///
/// ## Forbidden Capabilities
/// - ❌ Raise errors to the scheduler (`refresh` reports an outcome instead)
/// - ❌ Spawn tasks or sleep
/// - ❌ Mutate the shared snapshot
#[async_trait]
pub trait Entity: Send + Sync {
    /// Stable identifier derived from vendor slugs or configured host
    fn unique_id(&self) -> &str;

    /// Display name
    fn name(&self) -> String;

    /// Current state
    fn state(&self) -> StateValue;

    /// Unit of measurement
    fn unit(&self) -> Option<&str> {
        None
    }

    /// Frontend icon
    fn icon(&self) -> Option<&str> {
        None
    }

    /// Extra state attributes, sorted by key
    fn attributes(&self) -> BTreeMap<String, Value> {
        BTreeMap::new()
    }

    /// Current refresh phase
    fn phase(&self) -> EntityPhase;

    /// Fetch, project and publish
    ///
    /// Never fails: a fetch error keeps the previous value and is reported
    /// as [`RefreshOutcome::Stale`].
    async fn refresh(&self) -> RefreshOutcome;
}

/// Host interface for adding and removing entities
///
/// Entities are grouped by owner (the config entry id, or the integration
/// domain for legacy setups) so that an unload removes exactly the entities
/// that setup added.
#[async_trait]
pub trait EntityRegistrar: Send + Sync {
    /// Register entities
    ///
    /// # Parameters
    ///
    /// - `owner`: Config entry id or integration domain
    /// - `entities`: Entities to add, in display order
    /// - `update_before_add`: Refresh every entity once before adding it
    ///
    /// # Returns
    ///
    /// - `Ok(usize)`: Number of entities added
    /// - `Err(Error)`: A unique id is already registered; nothing was added
    async fn register_entities(
        &self,
        owner: &str,
        entities: Vec<Arc<dyn Entity>>,
        update_before_add: bool,
    ) -> Result<usize, crate::Error>;

    /// Remove every entity registered under `owner`
    ///
    /// # Returns
    ///
    /// Number of entities removed
    async fn remove_entities(&self, owner: &str) -> usize;
}
