// Key-value storage collaborator.
// The store itself is external; these are thin adapters so the background
// context and the worker can share one persisted namespace per prefix.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("failed to (de)serialize value under '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Namespaces inside the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KvPrefix {
    Sdk,
    LedgerAccounts,
}

impl KvPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            KvPrefix::Sdk => "sdk",
            KvPrefix::LedgerAccounts => "ledger-accounts",
        }
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// A view of a [`KvStore`] restricted to one prefix.
#[derive(Clone)]
pub struct PrefixedStore {
    prefix: KvPrefix,
    inner: Arc<dyn KvStore>,
}

impl PrefixedStore {
    pub fn new(inner: Arc<dyn KvStore>, prefix: KvPrefix) -> Self {
        Self { prefix, inner }
    }

    pub fn prefix(&self) -> KvPrefix {
        self.prefix
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix.as_str(), key)
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get(&self.full_key(key)).await
    }

    pub async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.inner.set(&self.full_key(key), value).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(&self.full_key(key)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.get(key).await? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(|source| {
                    StorageError::Serialization {
                        key: self.full_key(key),
                        source,
                    }
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(value).map_err(|source| StorageError::Serialization {
            key: self.full_key(key),
            source,
        })?;
        self.set(key, &bytes).await
    }
}

/// Process-local store, used in tests and when no path is configured.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StorageError::Backend(format!("lock poisoned: {}", e)))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StorageError::Backend(format!("lock poisoned: {}", e)))?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StorageError::Backend(format!("lock poisoned: {}", e)))?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(feature = "rocksdb-store")]
pub use rocks::RocksKvStore;

#[cfg(feature = "rocksdb-store")]
mod rocks {
    use super::*;
    use rocksdb::DB;
    use std::path::Path;

    /// RocksDB-backed store for the background binary.
    pub struct RocksKvStore {
        db: DB,
    }

    impl RocksKvStore {
        pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
            let db = DB::open_default(path)
                .map_err(|e| StorageError::Backend(format!("failed to open RocksDB: {}", e)))?;
            Ok(Self { db })
        }
    }

    #[async_trait]
    impl KvStore for RocksKvStore {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            self.db
                .get(key.as_bytes())
                .map_err(|e| StorageError::Backend(e.to_string()))
        }

        async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
            self.db
                .put(key.as_bytes(), value)
                .map_err(|e| StorageError::Backend(e.to_string()))
        }

        async fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.db
                .delete(key.as_bytes())
                .map_err(|e| StorageError::Backend(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prefixes_do_not_collide() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let sdk = PrefixedStore::new(store.clone(), KvPrefix::Sdk);
        let ledger = PrefixedStore::new(store, KvPrefix::LedgerAccounts);

        sdk.set("state", b"sdk").await.unwrap();
        ledger.set("state", b"ledger").await.unwrap();

        assert_eq!(sdk.get("state").await.unwrap().unwrap(), b"sdk");
        assert_eq!(ledger.get("state").await.unwrap().unwrap(), b"ledger");

        sdk.remove("state").await.unwrap();
        assert!(sdk.get("state").await.unwrap().is_none());
        assert!(ledger.get("state").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let store = PrefixedStore::new(Arc::new(MemoryKvStore::new()), KvPrefix::LedgerAccounts);
        store.set_json("numbers", &vec![1u32, 2, 3]).await.unwrap();
        let numbers: Vec<u32> = store.get_json("numbers").await.unwrap().unwrap();
        assert_eq!(numbers, vec![1, 2, 3]);

        store.set("broken", b"{not json").await.unwrap();
        let err = store.get_json::<Vec<u32>>("broken").await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization { .. }));
    }

    #[cfg(feature = "rocksdb-store")]
    #[tokio::test]
    async fn test_rocksdb_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = RocksKvStore::open(dir.path()).unwrap();
            store.set("sdk:sdk-store", b"blob").await.unwrap();
        }
        let store = RocksKvStore::open(dir.path()).unwrap();
        assert_eq!(store.get("sdk:sdk-store").await.unwrap().unwrap(), b"blob");
    }
}
