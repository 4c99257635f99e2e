//! Bearer/refresh token pair with persisted backing
use crate::error::{AuthError, Result};
use crate::storage::KeyValueStore;
use log::{debug, warn};
use parking_lot::RwLock;
use std::sync::Arc;

pub const ACCESS_TOKEN_KEY: &str = "spotify_access_token";
pub const REFRESH_TOKEN_KEY: &str = "spotify_refresh_token";

/// Token pair as held in memory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Sole owner of the token pair
///
/// Memory and persisted storage are updated under one write lock with no
/// suspension point in between, so readers never observe half of a save.
pub struct TokenStore {
    storage: Arc<dyn KeyValueStore>,
    tokens: RwLock<TokenPair>,
}

impl TokenStore {
    /// Create a store and load whatever was persisted
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        let store = Self {
            storage,
            tokens: RwLock::new(TokenPair::default()),
        };
        store.load();
        store
    }

    /// Re-read the persisted pair into memory
    ///
    /// Never fails: unreadable storage is logged and treated as logged out.
    pub fn load(&self) -> TokenPair {
        let pair = TokenPair {
            access_token: self.read_key(ACCESS_TOKEN_KEY),
            refresh_token: self.read_key(REFRESH_TOKEN_KEY),
        };

        *self.tokens.write() = pair.clone();
        pair
    }

    fn read_key(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!("Ignoring unreadable {}: {}", key, e);
                None
            }
        }
    }

    /// Overwrite the stored pair
    ///
    /// Without a refresh token, the previously stored one is kept. On a
    /// persistence failure memory is left untouched and the access key is
    /// rolled back.
    pub fn save(&self, access_token: &str, refresh_token: Option<&str>) -> Result<()> {
        let mut tokens = self.tokens.write();

        self.storage
            .set(ACCESS_TOKEN_KEY, access_token)
            .map_err(AuthError::StorageError)?;

        if let Some(refresh) = refresh_token {
            if let Err(e) = self.storage.set(REFRESH_TOKEN_KEY, refresh) {
                let rollback = match &tokens.access_token {
                    Some(previous) => self.storage.set(ACCESS_TOKEN_KEY, previous),
                    None => self.storage.remove(ACCESS_TOKEN_KEY),
                };
                if let Err(rollback_err) = rollback {
                    warn!("Failed to roll back access token: {}", rollback_err);
                }
                return Err(AuthError::StorageError(e));
            }
            tokens.refresh_token = Some(refresh.to_string());
        }

        tokens.access_token = Some(access_token.to_string());
        debug!(
            "Saved access token (refresh token {})",
            if refresh_token.is_some() { "replaced" } else { "kept" }
        );
        Ok(())
    }

    /// Remove both tokens from memory and storage
    pub fn clear(&self) {
        let mut tokens = self.tokens.write();
        *tokens = TokenPair::default();

        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = self.storage.remove(key) {
                warn!("Failed to remove {} from storage: {}", key, e);
            }
        }
    }

    /// Clear the pair only if `rejected` is still the stored access token
    ///
    /// Returns whether anything was cleared. A token saved after `rejected`
    /// was sent is left in place.
    pub fn clear_if_current(&self, rejected: &str) -> bool {
        let mut tokens = self.tokens.write();
        if tokens.access_token.as_deref() != Some(rejected) {
            return false;
        }
        *tokens = TokenPair::default();

        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = self.storage.remove(key) {
                warn!("Failed to remove {} from storage: {}", key, e);
            }
        }
        true
    }

    pub fn has_access_token(&self) -> bool {
        self.tokens.read().access_token.is_some()
    }

    pub fn access_token(&self) -> Option<String> {
        self.tokens.read().access_token.clone()
    }

    /// Stored but never used to refresh the session
    pub fn refresh_token(&self) -> Option<String> {
        self.tokens.read().refresh_token.clone()
    }

    pub fn snapshot(&self) -> TokenPair {
        self.tokens.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    /// Store whose writes to one key always fail
    struct FailingStore {
        inner: MemoryStore,
        failing_key: &'static str,
    }

    impl KeyValueStore for FailingStore {
        fn get(&self, key: &str) -> std::result::Result<Option<String>, String> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> std::result::Result<(), String> {
            if key == self.failing_key {
                return Err("disk full".to_string());
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> std::result::Result<(), String> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_load_with_empty_storage() {
        let store = TokenStore::new(Arc::new(MemoryStore::new()));
        assert!(!store.has_access_token());
        assert_eq!(store.load(), TokenPair::default());
    }

    #[test]
    fn test_load_reads_persisted_pair() {
        let storage = MemoryStore::new();
        storage.set(ACCESS_TOKEN_KEY, "T0").unwrap();
        storage.set(REFRESH_TOKEN_KEY, "R0").unwrap();

        let store = TokenStore::new(Arc::new(storage));
        assert!(store.has_access_token());
        assert_eq!(store.access_token().as_deref(), Some("T0"));
        assert_eq!(store.refresh_token().as_deref(), Some("R0"));
    }

    #[test]
    fn test_empty_persisted_token_counts_as_absent() {
        let storage = MemoryStore::new();
        storage.set(ACCESS_TOKEN_KEY, "").unwrap();

        let store = TokenStore::new(Arc::new(storage));
        assert!(!store.has_access_token());
    }

    #[test]
    fn test_save_persists_both_tokens() {
        let storage = MemoryStore::new();
        let store = TokenStore::new(Arc::new(storage.clone()));

        store.save("T1", Some("R1")).unwrap();

        assert!(store.has_access_token());
        assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("T1"));
        assert_eq!(storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("R1"));
    }

    #[test]
    fn test_save_without_refresh_keeps_previous() {
        let storage = MemoryStore::new();
        let store = TokenStore::new(Arc::new(storage.clone()));

        store.save("T1", Some("R1")).unwrap();
        store.save("T2", None).unwrap();

        assert_eq!(store.access_token().as_deref(), Some("T2"));
        assert_eq!(store.refresh_token().as_deref(), Some("R1"));
        assert_eq!(storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("R1"));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let storage = MemoryStore::new();
        let store = TokenStore::new(Arc::new(storage.clone()));
        store.save("T1", Some("R1")).unwrap();

        store.clear();
        let after_once = (store.snapshot(), storage.get(ACCESS_TOKEN_KEY).unwrap());
        store.clear();
        let after_twice = (store.snapshot(), storage.get(ACCESS_TOKEN_KEY).unwrap());

        assert_eq!(after_once, after_twice);
        assert!(!store.has_access_token());
        assert_eq!(storage.get(REFRESH_TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn test_clear_if_current_keeps_newer_token() {
        let storage = MemoryStore::new();
        let store = TokenStore::new(Arc::new(storage.clone()));
        store.save("T1", Some("R1")).unwrap();
        store.save("T2", Some("R2")).unwrap();

        assert!(!store.clear_if_current("T1"));
        assert_eq!(store.access_token().as_deref(), Some("T2"));
        assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("T2"));

        assert!(store.clear_if_current("T2"));
        assert!(!store.has_access_token());
        assert_eq!(storage.get(REFRESH_TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn test_failed_access_write_leaves_memory_untouched() {
        let storage = Arc::new(FailingStore {
            inner: MemoryStore::new(),
            failing_key: ACCESS_TOKEN_KEY,
        });
        let store = TokenStore::new(storage);

        let err = store.save("T1", Some("R1")).unwrap_err();
        assert!(matches!(err, AuthError::StorageError(_)));
        assert!(!store.has_access_token());
        assert_eq!(store.refresh_token(), None);
    }

    #[test]
    fn test_failed_refresh_write_rolls_back_access() {
        let inner = MemoryStore::new();
        inner.set(ACCESS_TOKEN_KEY, "T0").unwrap();
        let storage = Arc::new(FailingStore {
            inner: inner.clone(),
            failing_key: REFRESH_TOKEN_KEY,
        });
        let store = TokenStore::new(storage);

        assert!(store.save("T1", Some("R1")).is_err());

        assert_eq!(store.access_token().as_deref(), Some("T0"));
        assert_eq!(inner.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("T0"));
    }
}
