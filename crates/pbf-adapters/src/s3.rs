//! `ObjectStore` sobre S3 (o un endpoint compatible) con aws-sdk-s3.
//!
//! Direccionamiento path-style para soportar endpoints tipo MinIO. Las
//! credenciales salen de la cadena por defecto del SDK.
use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::MetadataDirective;
use aws_sdk_s3::Client;
use log::debug;
use pbf_core::{ObjectMetadata, ObjectStore, StoreError};

/// Valor de `CopySource`: `bucket/key` con cada segmento de la key
/// percent-encoded (los `/` se conservan).
fn copy_source(bucket: &str, key: &str) -> String {
    let encoded: Vec<String> = key.split('/').map(|seg| urlencoding::encode(seg).into_owned()).collect();
    format!("{bucket}/{}", encoded.join("/"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Settings {
    pub region: String,
    pub endpoint_url: Option<String>,
    pub bucket: String,
}

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub async fn connect(settings: &S3Settings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(settings.region.clone()));
        if let Some(endpoint) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;
        let conf = aws_sdk_s3::config::Builder::from(&shared).force_path_style(true).build();
        Self::from_client(Client::from_conf(conf), settings.bucket.clone())
    }

    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self { client, bucket: bucket.into() }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_file(&self, key: &str, path: &Path, metadata: &ObjectMetadata) -> Result<(), StoreError> {
        let body = ByteStream::from_path(path).await
                                              .map_err(|e| StoreError::Io(format!("{}: {e}", path.display())))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .set_metadata(Some(metadata.clone().into_iter().collect()))
            .send()
            .await
            .map_err(|e| StoreError::Rejected(format!("put_object {key}: {}", DisplayErrorContext(&e))))?;
        debug!("s3:put bucket={} key={key}", self.bucket);
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>, StoreError> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(out) => Ok(Some(out.metadata.unwrap_or_default().into_iter().collect())),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(None),
            Err(e) => Err(StoreError::Rejected(format!("head_object {key}: {}", DisplayErrorContext(&e)))),
        }
    }

    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<(), StoreError> {
        let result = self.client
                         .copy_object()
                         .bucket(&self.bucket)
                         .key(dst_key)
                         .copy_source(copy_source(&self.bucket, src_key))
                         .metadata_directive(MetadataDirective::Copy)
                         .send()
                         .await;
        match result {
            Ok(_) => {
                debug!("s3:copy bucket={} src={src_key} dst={dst_key}", self.bucket);
                Ok(())
            }
            Err(e) if e.as_service_error().and_then(|se| se.code()) == Some("NoSuchKey") => Err(StoreError::NotFound(src_key.to_string())),
            Err(e) => Err(StoreError::Rejected(format!("copy_object {src_key} -> {dst_key}: {}", DisplayErrorContext(&e)))),
        }
    }
}
