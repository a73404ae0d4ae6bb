//! Object store durable (put / head / copy server-side).
mod memory;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::ObjectMetadata;

pub use memory::{InMemoryObjectStore, StoredObject};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("io: {0}")]
    Io(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Sube el archivo local bajo `key` con `metadata`. Sobrescribe.
    async fn put_file(&self, key: &str, path: &Path, metadata: &ObjectMetadata) -> Result<(), StoreError>;
    /// Metadata del objeto; `Ok(None)` si no existe.
    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>, StoreError>;
    /// Copia server-side; el destino conserva la metadata del origen.
    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn put_file(&self, key: &str, path: &Path, metadata: &ObjectMetadata) -> Result<(), StoreError> {
        (**self).put_file(key, path, metadata).await
    }
    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>, StoreError> {
        (**self).head(key).await
    }
    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<(), StoreError> {
        (**self).copy(src_key, dst_key).await
    }
}
