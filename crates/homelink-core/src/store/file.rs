// # File Entry Store
//
// File-based implementation of ConfigEntryStore with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: write to `<path>.tmp`, then rename over the entries file
// - Automatic backup: the previous file is copied to `.backup` before each write
// - Recovery: a file that does not parse is replaced by its backup
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "entries": {
//     "01J...": {
//       "entry_id": "01J...",
//       "domain": "fitbark",
//       "title": "FitBark",
//       "version": 1,
//       "source": "user",
//       "data": { "auth_implementation": "fitbark", "token": { ... } },
//       "created_at": "2025-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::ConfigEntry;
use crate::store::memory::sorted_for_domain;
use crate::traits::ConfigEntryStore;

/// Entries file format version
const ENTRIES_FILE_VERSION: &str = "1.0";

/// File-based config entry store
///
/// Every mutation is written through immediately; `flush()` only writes when
/// a previous write failed and left the store dirty.
///
/// # Example
///
/// ```rust,no_run
/// use homelink_core::{ConfigEntry, ConfigEntryStore, FileEntryStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileEntryStore::new("/var/lib/homelink/entries.json").await?;
///     let entry = ConfigEntry::new("e1", "asuswrt", "Asuswrt 192.168.1.1", serde_json::json!({}));
///
///     store.add_entry(&entry).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileEntryStore {
    path: PathBuf,
    state: Arc<RwLock<FileState>>,
}

#[derive(Debug)]
struct FileState {
    entries: HashMap<String, ConfigEntry>,
    dirty: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct EntriesFileFormat {
    version: String,
    entries: HashMap<String, ConfigEntry>,
}

/// Why a file could not be loaded
enum LoadError {
    /// The file exists but is not a valid entries document
    Corrupt(String),
    /// The file could not be read at all
    Io(Error),
}

impl FileEntryStore {
    /// Create or load a file entry store
    ///
    /// Creates parent directories as needed. A corrupted file is recovered
    /// from its backup; if the backup is missing or corrupted too, the store
    /// starts empty.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create entry store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let entries = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(FileState {
                entries,
                dirty: false,
            })),
        })
    }

    async fn load_with_recovery(path: &Path) -> Result<HashMap<String, ConfigEntry>, Error> {
        let reason = match Self::load(path).await {
            Ok(entries) => {
                tracing::debug!("Loaded {} config entries", entries.len());
                return Ok(entries);
            }
            Err(LoadError::Io(e)) => return Err(e),
            Err(LoadError::Corrupt(reason)) => reason,
        };

        tracing::warn!(
            "Entry store {} is corrupted ({}), attempting recovery from backup",
            path.display(),
            reason
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found, starting with no entries");
            return Ok(HashMap::new());
        }

        match Self::load(&backup_path).await {
            Ok(entries) => {
                tracing::info!("Recovered {} config entries from backup", entries.len());
                if let Err(e) = fs::copy(&backup_path, path).await {
                    tracing::error!("Failed to restore entry store from backup: {}", e);
                }
                Ok(entries)
            }
            Err(LoadError::Corrupt(reason)) => {
                tracing::error!(
                    "Backup is corrupted too ({}), starting with no entries",
                    reason
                );
                Ok(HashMap::new())
            }
            Err(LoadError::Io(e)) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<HashMap<String, ConfigEntry>, LoadError> {
        if !path.exists() {
            tracing::debug!("Entry store file does not exist: {}", path.display());
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            LoadError::Io(Error::entry_store(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )))
        })?;

        let file: EntriesFileFormat =
            serde_json::from_str(&content).map_err(|e| LoadError::Corrupt(e.to_string()))?;

        if file.version != ENTRIES_FILE_VERSION {
            tracing::warn!(
                "Entry store version mismatch: expected {}, got {}; loading anyway",
                ENTRIES_FILE_VERSION,
                file.version
            );
        }

        Ok(file.entries)
    }

    async fn write(&self) -> Result<(), Error> {
        let mut state = self.state.write().await;

        let file = EntriesFileFormat {
            version: ENTRIES_FILE_VERSION.to_string(),
            entries: state.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::entry_store(format!("Failed to serialize entries: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut temp = fs::File::create(&temp_path).await.map_err(|e| {
                Error::entry_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            temp.write_all(json.as_bytes()).await.map_err(|e| {
                Error::entry_store(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            temp.flush().await.map_err(|e| {
                Error::entry_store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists()
            && let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await
        {
            tracing::warn!("Failed to back up entry store: {}", e);
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::entry_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        state.dirty = false;
        tracing::trace!("Entry store written to {}", self.path.display());
        Ok(())
    }

    async fn mutate<T>(&self, f: impl FnOnce(&mut HashMap<String, ConfigEntry>) -> Result<T, Error>) -> Result<T, Error> {
        let result = {
            let mut state = self.state.write().await;
            let result = f(&mut state.entries)?;
            state.dirty = true;
            result
        };
        self.write().await?;
        Ok(result)
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    /// Path of the entries file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigEntryStore for FileEntryStore {
    async fn get_entry(&self, entry_id: &str) -> Result<Option<ConfigEntry>, Error> {
        Ok(self.state.read().await.entries.get(entry_id).cloned())
    }

    async fn entries_for_domain(&self, domain: &str) -> Result<Vec<ConfigEntry>, Error> {
        let state = self.state.read().await;
        Ok(sorted_for_domain(state.entries.values(), domain))
    }

    async fn add_entry(&self, entry: &ConfigEntry) -> Result<(), Error> {
        self.mutate(|entries| {
            if entries.contains_key(&entry.entry_id) {
                return Err(Error::entry_store(format!(
                    "Entry {} already exists",
                    entry.entry_id
                )));
            }
            entries.insert(entry.entry_id.clone(), entry.clone());
            Ok(())
        })
        .await
    }

    async fn update_entry(&self, entry: &ConfigEntry) -> Result<(), Error> {
        self.mutate(|entries| match entries.get_mut(&entry.entry_id) {
            Some(existing) => {
                *existing = entry.clone();
                Ok(())
            }
            None => Err(Error::not_found(format!("Entry {}", entry.entry_id))),
        })
        .await
    }

    async fn remove_entry(&self, entry_id: &str) -> Result<bool, Error> {
        if !self.state.read().await.entries.contains_key(entry_id) {
            return Ok(false);
        }
        self.mutate(|entries| Ok(entries.remove(entry_id).is_some()))
            .await
    }

    async fn list_entries(&self) -> Result<Vec<String>, Error> {
        let mut ids: Vec<String> = self.state.read().await.entries.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn flush(&self) -> Result<(), Error> {
        if self.state.read().await.dirty {
            self.write().await
        } else {
            Ok(())
        }
    }
}
