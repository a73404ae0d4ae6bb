//! Fetcher: descarga el recurso completo al staging de la sesión.
//!
//! El cuerpo se escribe en un temporal `<stem>.<random>.<ext>` dentro del
//! directorio de la sesión, latiendo por cada chunk. Si algo falla, el
//! temporal se elimina al soltarse; sólo un archivo completo se conserva.
use std::time::Duration;

use futures::StreamExt;
use log::debug;
use pbf_core::hashing::ContentDigest;
use pbf_core::model::staging_name_parts;
use pbf_core::{RemoteSource, SourceError, StagedArtifact, StepContext, StepError};
use tokio::io::AsyncWriteExt;

fn open_error(e: SourceError) -> StepError {
    match e {
        SourceError::Connect(msg) => StepError::TransientNetwork(msg),
        other => StepError::Fetch(other.to_string()),
    }
}

fn io_error(what: &str, e: std::io::Error) -> StepError {
    StepError::Fetch(format!("{what}: {e}"))
}

pub async fn fetch_to_staging<R>(source: &R, ctx: &StepContext, pointer_key: &str, heartbeat_every: Duration) -> Result<StagedArtifact, StepError>
    where R: RemoteSource + ?Sized
{
    let (prefix, suffix) = staging_name_parts(pointer_key);
    let tmp = tempfile::Builder::new().prefix(&prefix)
                                      .suffix(&suffix)
                                      .tempfile_in(&ctx.session.staging_dir)
                                      .map_err(|e| io_error("create staging file", e))?;
    let (file, temp_path) = tmp.into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let body = ctx.heartbeat.keep_alive(heartbeat_every, source.open()).await.map_err(open_error)?;
    let version_tag = body.version_tag;
    let expected = body.content_length;
    let mut chunks = body.chunks;
    let mut digest = ContentDigest::new();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(open_error)?;
        file.write_all(&chunk).await.map_err(|e| io_error("write staging file", e))?;
        digest.update(&chunk);
        ctx.heartbeat.beat(digest.len());
    }
    file.flush().await.map_err(|e| io_error("flush staging file", e))?;
    drop(file);

    if let Some(expected) = expected {
        if expected != digest.len() {
            return Err(StepError::Fetch(format!("truncated body: expected {expected} bytes, got {}", digest.len())));
        }
    }

    let path = temp_path.keep().map_err(|e| io_error("keep staging file", e.error))?;
    debug!("fetch:done run_id={} path={} bytes={} tag={}", ctx.run_id, path.display(), digest.len(), version_tag);
    Ok(StagedArtifact { path,
                        version_tag,
                        session_id: ctx.session.id,
                        size_bytes: digest.len(),
                        digest: digest.finalize_hex() })
}
