// # Config Entry Store Implementations
//
// This module provides implementations of the ConfigEntryStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::FileEntryStore;
pub use memory::MemoryEntryStore;

use std::sync::Arc;

use crate::config::EntryStoreConfig;
use crate::traits::ConfigEntryStore;

/// Open the store described by `config`
pub async fn open_entry_store(
    config: &EntryStoreConfig,
) -> Result<Arc<dyn ConfigEntryStore>, crate::Error> {
    config.validate()?;
    match config {
        EntryStoreConfig::File { path } => Ok(Arc::new(FileEntryStore::new(path).await?)),
        EntryStoreConfig::Memory => Ok(Arc::new(MemoryEntryStore::new())),
    }
}
