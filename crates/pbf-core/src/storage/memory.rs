use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use super::{ObjectStore, StoreError};
use crate::hashing::hash_bytes;
use crate::model::ObjectMetadata;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub metadata: ObjectMetadata,
    pub digest: String,
}

/// Object store en memoria con contadores de llamadas.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: DashMap<String, StoredObject>,
    puts: AtomicUsize,
    copies: AtomicUsize,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserta un objeto directamente (estado previo en tests).
    pub fn insert(&self, key: impl Into<String>, bytes: impl Into<Bytes>, metadata: ObjectMetadata) {
        let bytes = bytes.into();
        let digest = hash_bytes(&bytes);
        self.objects.insert(key.into(), StoredObject { bytes, metadata, digest });
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.get(key).map(|o| o.clone())
    }

    pub fn metadata_value(&self, key: &str, entry: &str) -> Option<String> {
        self.objects.get(key).and_then(|o| o.metadata.get(entry).cloned())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn copies(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_file(&self, key: &str, path: &Path, metadata: &ObjectMetadata) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let bytes = tokio::fs::read(path).await.map_err(|e| StoreError::Io(format!("{}: {e}", path.display())))?;
        self.insert(key, bytes, metadata.clone());
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>, StoreError> {
        Ok(self.objects.get(key).map(|o| o.metadata.clone()))
    }

    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<(), StoreError> {
        self.copies.fetch_add(1, Ordering::SeqCst);
        let src = self.get(src_key).ok_or_else(|| StoreError::NotFound(src_key.to_string()))?;
        self.objects.insert(dst_key.to_string(), src);
        Ok(())
    }
}
