//! Keyed document storage.
//!
//! Documents live in named collections and are addressed by a two-part key
//! (partition, id). Partitions are user ids for per-user data, so listing a
//! user's documents never scans other users. Every `replace_one` is durable
//! before it returns: the file backend writes a temp file, fsyncs it and
//! renames it over the old document, so readers see either the old or the new
//! version and never a torn write.

use std::{
    collections::HashMap,
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    fs,
    io::AsyncWriteExt,
    sync::{OwnedMutexGuard, RwLock},
};
use uuid::Uuid;

use crate::metrics::track_store_operation;

const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// Longest partition or id accepted from callers. The file backend hex-encodes
/// keys into file names, which most filesystems cap at 255 bytes.
pub const MAX_KEY_BYTES: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored document is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("stored key '{0}' is not valid hex-encoded UTF-8")]
    CorruptKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocKey {
    pub partition: String,
    pub id: String,
}

impl DocKey {
    pub fn new(partition: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            id: id.into(),
        }
    }

    /// Single string form used for per-key locks.
    pub fn lock_key(&self, collection: &str) -> String {
        format!("{}/{}/{}", collection, self.partition, self.id)
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, key: &DocKey) -> Result<Option<Vec<u8>>, StoreError>;

    async fn put(&self, collection: &str, key: &DocKey, value: &[u8]) -> Result<(), StoreError>;

    /// Returns whether a document was removed.
    async fn delete(&self, collection: &str, key: &DocKey) -> Result<bool, StoreError>;

    /// Ids of every document stored under `partition`.
    async fn list(&self, collection: &str, partition: &str) -> Result<Vec<String>, StoreError>;

    fn backend_name(&self) -> &'static str;
}

/// Process-local store used by tests and the `memory` backend.
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<(String, String, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, key: &DocKey) -> Result<Option<Vec<u8>>, StoreError> {
        let docs = self.docs.read().await;
        Ok(docs
            .get(&(
                collection.to_string(),
                key.partition.clone(),
                key.id.clone(),
            ))
            .cloned())
    }

    async fn put(&self, collection: &str, key: &DocKey, value: &[u8]) -> Result<(), StoreError> {
        let mut docs = self.docs.write().await;
        docs.insert(
            (
                collection.to_string(),
                key.partition.clone(),
                key.id.clone(),
            ),
            value.to_vec(),
        );
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &DocKey) -> Result<bool, StoreError> {
        let mut docs = self.docs.write().await;
        Ok(docs
            .remove(&(
                collection.to_string(),
                key.partition.clone(),
                key.id.clone(),
            ))
            .is_some())
    }

    async fn list(&self, collection: &str, partition: &str) -> Result<Vec<String>, StoreError> {
        let docs = self.docs.read().await;
        let mut ids: Vec<String> = docs
            .keys()
            .filter(|(c, p, _)| c == collection && p == partition)
            .map(|(_, _, id)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// One JSON file per document: `<root>/<collection>/<hex(partition)>/<hex(id)>.json`.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        tracing::info!(root = %root.display(), "File document store opened");
        Ok(Self { root })
    }

    fn partition_dir(&self, collection: &str, partition: &str) -> PathBuf {
        self.root
            .join(collection)
            .join(hex::encode(partition.as_bytes()))
    }

    fn document_path(&self, collection: &str, key: &DocKey) -> PathBuf {
        self.partition_dir(collection, &key.partition)
            .join(format!("{}.json", hex::encode(key.id.as_bytes())))
    }

    async fn write_atomically(dir: &Path, target: &Path, value: &[u8]) -> Result<(), StoreError> {
        let tmp = dir.join(format!(".{}.tmp", Uuid::new_v4()));

        let written: Result<(), std::io::Error> = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(value).await?;
            file.sync_all().await?;
            fs::rename(&tmp, target).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        // Persist the rename itself. Not every platform can fsync a directory.
        if let Ok(dir_handle) = fs::File::open(dir).await {
            let _ = dir_handle.sync_all().await;
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn get(&self, collection: &str, key: &DocKey) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.document_path(collection, key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, collection: &str, key: &DocKey, value: &[u8]) -> Result<(), StoreError> {
        let dir = self.partition_dir(collection, &key.partition);
        fs::create_dir_all(&dir).await?;
        Self::write_atomically(&dir, &self.document_path(collection, key), value).await
    }

    async fn delete(&self, collection: &str, key: &DocKey) -> Result<bool, StoreError> {
        match fs::remove_file(self.document_path(collection, key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, collection: &str, partition: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.partition_dir(collection, partition);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(encoded) = name.strip_suffix(".json") else {
                continue;
            };
            if encoded.starts_with('.') {
                continue;
            }
            let id = hex::decode(encoded)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .ok_or_else(|| StoreError::CorruptKey(name.clone()))?;
            ids.push(id);
        }
        ids.sort();
        Ok(ids)
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

/// Typed view over one collection.
pub struct Collection<T> {
    store: Arc<dyn DocumentStore>,
    name: &'static str,
    _doc: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            name: self.name,
            _doc: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> Collection<T> {
    pub fn new(store: Arc<dyn DocumentStore>, name: &'static str) -> Self {
        Self {
            store,
            name,
            _doc: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn find_one(&self, key: &DocKey) -> Result<Option<T>, StoreError> {
        let raw = track_store_operation("get", self.name, self.store.get(self.name, key)).await?;
        match raw {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn replace_one(&self, key: &DocKey, doc: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        track_store_operation("put", self.name, self.store.put(self.name, key, &bytes)).await
    }

    pub async fn delete_one(&self, key: &DocKey) -> Result<bool, StoreError> {
        track_store_operation("delete", self.name, self.store.delete(self.name, key)).await
    }

    /// Every document under `partition`, in id order.
    pub async fn find_all(&self, partition: &str) -> Result<Vec<T>, StoreError> {
        let mut docs = Vec::new();
        for id in self.ids(partition).await? {
            if let Some(doc) = self.find_one(&DocKey::new(partition, id)).await? {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    pub async fn ids(&self, partition: &str) -> Result<Vec<String>, StoreError> {
        track_store_operation("list", self.name, self.store.list(self.name, partition)).await
    }
}

/// Per-key async mutexes. Locks are never global: two keys never contend.
#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            if slots.len() >= LOCK_PRUNE_THRESHOLD {
                // An entry nobody holds or waits on has a strong count of one.
                slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            slots.entry(key.to_string()).or_default().clone()
        };
        slot.lock_owned().await
    }
}
