use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};

use super::{RemoteBody, RemoteSource, SourceError};
use crate::model::VersionTag;

/// Fuente en memoria: publica una revisión y la sirve en chunks.
#[derive(Debug)]
pub struct InMemorySource {
    url: String,
    current: Mutex<Option<(Bytes, VersionTag)>>,
    chunk_size: usize,
    probes: AtomicUsize,
    opens: AtomicUsize,
}

impl InMemorySource {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(),
               current: Mutex::new(None),
               chunk_size: 64 * 1024,
               probes: AtomicUsize::new(0),
               opens: AtomicUsize::new(0) }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn publish(&self, body: impl Into<Bytes>, tag: impl Into<VersionTag>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some((body.into(), tag.into()));
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> Option<(Bytes, VersionTag)> {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl RemoteSource for InMemorySource {
    fn url(&self) -> &str {
        &self.url
    }

    async fn probe(&self) -> Result<VersionTag, SourceError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.snapshot().map(|(_, tag)| tag).ok_or(SourceError::Status(404))
    }

    async fn open(&self) -> Result<RemoteBody, SourceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let (body, version_tag) = self.snapshot().ok_or(SourceError::Status(404))?;
        let chunk_size = self.chunk_size;
        let chunks: Vec<Result<Bytes, SourceError>> = (0..body.len()).step_by(chunk_size)
                                                                     .map(|start| Ok(body.slice(start..(start + chunk_size).min(body.len()))))
                                                                     .collect();
        Ok(RemoteBody { version_tag,
                        content_length: Some(body.len() as u64),
                        chunks: stream::iter(chunks).boxed() })
    }
}
