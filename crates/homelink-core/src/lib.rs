// # homelink-core
//
// Core library for polled home-automation integrations.
//
// ## Architecture Overview
//
// - **SnapshotSource**: Trait for one remote read of device/API state
// - **ThrottledFetcher**: Minimum-interval cache shared by sibling sensors
// - **project()**: Pure derivation of one sensor's state and attributes
// - **SensorEntity**: Per-sensor adapter driven by the host scheduler
// - **Integration**: Trait every device integration implements
// - **Lifecycle**: Legacy-config and config-entry setup variants
// - **PollingEngine**: Scheduler stand-in that refreshes registered entities
// - **IntegrationRegistry**: Plugin-based registry of integrations
// - **ConfigEntryStore**: Persisted integration configuration
//
// ## Design Principles
//
// 1. **One fetch per window**: Sensors share fetchers; the throttle is the only gate
// 2. **Pure projection**: Displayed values are a function of the latest snapshot
// 3. **No error escapes a tick**: Failures keep the previous value
// 4. **Plugin-Based**: Integrations are registered dynamically, no hard-coded if-else
// 5. **Explicit context**: Per-entry state lives in an owned context object

pub mod traits;
pub mod snapshot;
pub mod projection;
pub mod throttle;
pub mod entity;
pub mod context;
pub mod lifecycle;
pub mod config_flow;
pub mod engine;
pub mod registry;
pub mod config;
pub mod error;
pub mod store;

// Re-export core types for convenience
pub use traits::{
    ConfigEntryStore, Entity, EntityPhase, EntityRegistrar, Integration, IntegrationFactory,
    RefreshOutcome, SnapshotSource,
};
pub use snapshot::Snapshot;
pub use projection::{
    AttributePolicy, ProjectedValue, SensorDescriptor, StateValue, Transform, project,
};
pub use throttle::ThrottledFetcher;
pub use entity::{SensorEntity, UniqueId};
pub use context::IntegrationContext;
pub use lifecycle::{ConfigEntrySetup, LegacyConfig, Lifecycle};
pub use config_flow::FlowResult;
pub use engine::{EngineEvent, PollingEngine, TickSummary};
pub use registry::IntegrationRegistry;
pub use config::{ConfigEntry, EngineConfig, EntrySource, EntryStoreConfig, HostConfig, PollingConfig};
pub use error::{Error, ErrorClass, Result};
pub use store::{FileEntryStore, MemoryEntryStore, open_entry_store};
