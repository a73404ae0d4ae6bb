//! Recurso remoto versionado (GET + HEAD con version tag).
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::model::VersionTag;

pub use memory::InMemorySource;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Conexión, DNS, timeouts del cliente.
    #[error("connect: {0}")]
    Connect(String),
    #[error("unexpected status {0}")]
    Status(u16),
    /// Fallo a mitad del cuerpo.
    #[error("body: {0}")]
    Body(String),
}

/// Cuerpo de un GET en curso.
pub struct RemoteBody {
    /// Tag de la respuesta (vacío si el servidor no lo envía).
    pub version_tag: VersionTag,
    pub content_length: Option<u64>,
    pub chunks: BoxStream<'static, Result<Bytes, SourceError>>,
}

impl std::fmt::Debug for RemoteBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBody")
         .field("version_tag", &self.version_tag)
         .field("content_length", &self.content_length)
         .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait RemoteSource: Send + Sync {
    fn url(&self) -> &str;
    /// Tag actual sin transferir el cuerpo.
    async fn probe(&self) -> Result<VersionTag, SourceError>;
    /// Inicia la descarga del cuerpo.
    async fn open(&self) -> Result<RemoteBody, SourceError>;
}

#[async_trait]
impl<T: RemoteSource + ?Sized> RemoteSource for Arc<T> {
    fn url(&self) -> &str {
        (**self).url()
    }
    async fn probe(&self) -> Result<VersionTag, SourceError> {
        (**self).probe().await
    }
    async fn open(&self) -> Result<RemoteBody, SourceError> {
        (**self).open().await
    }
}
