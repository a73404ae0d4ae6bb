//! `RemoteSource` sobre HTTP (reqwest): HEAD para el tag, GET en streaming
//! para el cuerpo. El tag es el header `ETag` tal cual lo envía el servidor.
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use pbf_core::{RemoteBody, RemoteSource, SourceError, VersionTag};
use reqwest::header::{HeaderMap, ETAG};
use reqwest::{Client, Response};

#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    url: String,
}

fn version_tag(headers: &HeaderMap) -> VersionTag {
    VersionTag::new(headers.get(ETAG).and_then(|v| v.to_str().ok()).unwrap_or_default())
}

fn connect_error(e: reqwest::Error) -> SourceError {
    SourceError::Connect(e.to_string())
}

fn check_status(resp: Response) -> Result<Response, SourceError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(SourceError::Status(status.as_u16()))
    }
}

impl HttpSource {
    pub fn new(url: impl Into<String>) -> Result<Self, SourceError> {
        let client = Client::builder().connect_timeout(Duration::from_secs(30))
                                      .build()
                                      .map_err(connect_error)?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl RemoteSource for HttpSource {
    fn url(&self) -> &str {
        &self.url
    }

    async fn probe(&self) -> Result<VersionTag, SourceError> {
        let resp = self.client.head(&self.url).send().await.map_err(connect_error)?;
        let resp = check_status(resp)?;
        Ok(version_tag(resp.headers()))
    }

    async fn open(&self) -> Result<RemoteBody, SourceError> {
        let resp = self.client.get(&self.url).send().await.map_err(connect_error)?;
        let resp = check_status(resp)?;
        let version_tag = version_tag(resp.headers());
        let content_length = resp.content_length();
        let chunks = resp.bytes_stream()
                         .map(|chunk| chunk.map_err(|e| SourceError::Body(e.to_string())))
                         .boxed();
        Ok(RemoteBody { version_tag,
                        content_length,
                        chunks })
    }
}
