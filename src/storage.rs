//! Pluggable key-value persistence for tokens and pending authorizations
use fs2::FileExt;
use keyring::Entry;
use log::warn;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Storage interface for persisted string values
///
/// A missing key is a normal state, reported as `Ok(None)`.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &str) -> Result<Option<String>, String>;

    /// Set a value, overwriting any previous one
    fn set(&self, key: &str, value: &str) -> Result<(), String>;

    /// Remove a value; removing a missing key succeeds
    fn remove(&self, key: &str) -> Result<(), String>;
}

/// In-memory storage implementation
///
/// Suitable for testing and for sessions that should not outlive the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.values
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        self.values.write().remove(key);
        Ok(())
    }
}

/// File-based storage in a single JSON document
///
/// Writes are serialized across processes with an exclusive lock on a
/// sibling `.lock` file, so two CLI invocations cannot interleave a
/// read-modify-write.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Create a file store for an application
    ///
    /// Checks `$XDG_DATA_HOME` first and falls back to the platform data
    /// directory. Values live in `<data_dir>/<app_name>/storage.json`.
    pub fn new(app_name: &str) -> Result<Self, String> {
        let base_dir = if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
            PathBuf::from(xdg_data)
        } else {
            dirs::data_dir().ok_or_else(|| "Could not determine data directory".to_string())?
        };

        Self::with_path(base_dir.join(app_name))
    }

    /// Create a file store rooted at a custom directory
    pub fn with_path(path: PathBuf) -> Result<Self, String> {
        fs::create_dir_all(&path)
            .map_err(|e| format!("Failed to create storage directory: {}", e))?;

        Ok(Self { base_path: path })
    }

    pub fn path(&self) -> &Path {
        &self.base_path
    }

    fn values_path(&self) -> PathBuf {
        self.base_path.join("storage.json")
    }

    fn lock(&self) -> Result<File, String> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.base_path.join("storage.lock"))
            .map_err(|e| format!("Failed to open lock file: {}", e))?;

        file.lock_exclusive()
            .map_err(|e| format!("Failed to lock storage: {}", e))?;

        Ok(file)
    }

    fn load(&self) -> Result<HashMap<String, String>, String> {
        let path = self.values_path();
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let content =
            fs::read_to_string(&path).map_err(|e| format!("Failed to read storage file: {}", e))?;

        serde_json::from_str(&content).map_err(|e| format!("Failed to parse storage file: {}", e))
    }

    /// Replace the document atomically: write a sibling temp file, then
    /// rename it over `storage.json`, so unlocked readers never see a
    /// partial write.
    fn store(&self, values: &HashMap<String, String>) -> Result<(), String> {
        let content = serde_json::to_string_pretty(values)
            .map_err(|e| format!("Failed to serialize storage: {}", e))?;

        let temp_path = self.base_path.join("storage.json.tmp");
        fs::write(&temp_path, content)
            .map_err(|e| format!("Failed to write storage file: {}", e))?;

        fs::rename(&temp_path, self.values_path())
            .map_err(|e| format!("Failed to replace storage file: {}", e))
    }

    fn update<F>(&self, change: F) -> Result<(), String>
    where
        F: FnOnce(&mut HashMap<String, String>) -> bool,
    {
        let lock = self.lock()?;
        // Unreadable documents are replaced on the next write
        let mut values = self.load().unwrap_or_else(|e| {
            warn!("Discarding unreadable storage file: {}", e);
            HashMap::new()
        });
        let result = if change(&mut values) {
            self.store(&values)
        } else {
            Ok(())
        };
        let _ = lock.unlock();
        result
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        Ok(self.load()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        self.update(|values| values.remove(key).is_some())
    }
}

/// Secure storage using the OS credential manager
///
/// - macOS: Keychain
/// - Windows: Credential Manager
/// - Linux: Secret Service API (libsecret)
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(app_name: &str) -> Self {
        Self {
            service: format!("{}-tokens", app_name),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, String> {
        Entry::new(&self.service, key).map_err(|e| format!("Failed to create keyring entry: {}", e))
    }
}

impl KeyValueStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(format!("Failed to read from keyring: {}", e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| format!("Failed to write to keyring: {}", e))
    }

    fn remove(&self, key: &str) -> Result<(), String> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(format!("Failed to delete from keyring: {}", e)),
        }
    }
}
