//! Core traits for homelink
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`SnapshotSource`]: One remote read returning a snapshot
//! - [`Integration`]: Device integration lifecycle and config flow hooks
//! - [`Entity`] / [`EntityRegistrar`]: Host entity contract and registration
//! - [`ConfigEntryStore`]: Persisted integration configuration

pub mod snapshot_source;
pub mod integration;
pub mod entity;
pub mod entry_store;

pub use snapshot_source::SnapshotSource;
pub use integration::{Integration, IntegrationFactory};
pub use entity::{Entity, EntityPhase, EntityRegistrar, RefreshOutcome};
pub use entry_store::ConfigEntryStore;
