// # Config Entry Store Trait
//
// Defines the interface for the host's persisted integration configuration.
//
// ## Purpose
//
// The entry store keeps every configured integration instance:
// - Which domain it belongs to
// - Its credentials and connection data
// - Migrated data written back after setup
//
// ## Implementations
//
// - In-memory: `MemoryEntryStore`
// - File-based: `FileEntryStore` (versioned JSON document)
//
// ## Usage
//
// ```rust,ignore
// use homelink_core::{ConfigEntry, ConfigEntryStore};
//
// let store = /* ConfigEntryStore implementation */;
//
// store.add_entry(&entry).await?;
// for entry in store.entries_for_domain("asuswrt").await? {
//     println!("{}: {}", entry.entry_id, entry.title);
// }
// store.flush().await?;
// ```

use async_trait::async_trait;

use crate::config::ConfigEntry;

/// Trait for config entry store implementations
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage
/// - ✅ Cache entries in memory (with explicit flush)
///
/// ## Forbidden Capabilities
/// - ❌ Interpret integration data (owned by each `Integration`)
/// - ❌ Spawn background tasks (flushing is driven by the host)
///
/// ## Implementation Guidelines
///
/// - **Async I/O only**: never block the runtime on file access
/// - **Explicit flush**: `flush()` must persist all pending changes
/// - **Entries are never logged**: they carry credentials
#[async_trait]
pub trait ConfigEntryStore: Send + Sync {
    /// Get one entry
    ///
    /// # Returns
    ///
    /// - `Ok(Some(ConfigEntry))`: The entry
    /// - `Ok(None)`: No entry with this id
    /// - `Err(Error)`: Storage error
    async fn get_entry(&self, entry_id: &str) -> Result<Option<ConfigEntry>, crate::Error>;

    /// Entries belonging to one integration domain, ordered by creation time
    async fn entries_for_domain(&self, domain: &str) -> Result<Vec<ConfigEntry>, crate::Error>;

    /// Add a new entry
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Added
    /// - `Err(Error)`: An entry with the same id already exists, or storage error
    async fn add_entry(&self, entry: &ConfigEntry) -> Result<(), crate::Error>;

    /// Replace an existing entry
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Replaced
    /// - `Err(Error::NotFound)`: No entry with this id
    async fn update_entry(&self, entry: &ConfigEntry) -> Result<(), crate::Error>;

    /// Remove an entry
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: Removed
    /// - `Ok(false)`: Did not exist
    async fn remove_entry(&self, entry_id: &str) -> Result<bool, crate::Error>;

    /// All entry ids
    async fn list_entries(&self) -> Result<Vec<String>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
