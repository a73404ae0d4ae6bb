//! Archiver: sube el artifact staged bajo la key fechada del run.
//!
//! La key depende sólo de la fecha programada y de la key del puntero, así que
//! cualquier reintento del mismo run escribe el mismo objeto. El archivo local
//! se borra tras un upload exitoso o tras el último intento fallido; en
//! intentos intermedios se conserva para que el reintento no repita el Fetch.
//!
//! Lo que quede en staging (intento cancelado, worker caído) lo borra la
//! sesión al terminar el run, junto con su directorio.
use std::path::Path;
use std::time::Duration;

use log::{debug, warn};
use pbf_core::model::{canonical_basename, dated_key};
use pbf_core::{ArchivedArtifact, ObjectMetadata, ObjectStore, StagedArtifact, StepContext, StepError};

async fn remove_staged(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("archive:cleanup_failed path={} error={e}", path.display());
        }
    }
}

pub async fn archive_staged<S>(store: &S,
                               ctx: &StepContext,
                               staged: &StagedArtifact,
                               pointer_key: &str,
                               metadata_key: &str,
                               heartbeat_every: Duration)
                               -> Result<ArchivedArtifact, StepError>
    where S: ObjectStore + ?Sized
{
    if staged.session_id != ctx.session.id {
        return Err(StepError::SessionMismatch { expected: ctx.session.id,
                                                found: staged.session_id });
    }
    if canonical_basename(pointer_key).trim().is_empty() {
        return Err(StepError::InvalidInput(format!("pointer key {pointer_key:?} has no basename")));
    }
    let key = dated_key(pointer_key, ctx.scheduled_time);
    let metadata = ObjectMetadata::from([(metadata_key.to_string(), staged.version_tag.to_string())]);

    let result = ctx.heartbeat
                    .keep_alive(heartbeat_every, store.put_file(&key, &staged.path, &metadata))
                    .await;
    match result {
        Ok(()) => {
            remove_staged(&staged.path).await;
            debug!("archive:done run_id={} key={key} bytes={}", ctx.run_id, staged.size_bytes);
            Ok(ArchivedArtifact { key,
                                  version_tag: staged.version_tag.clone(),
                                  size_bytes: staged.size_bytes,
                                  digest: staged.digest.clone() })
        }
        Err(e) => {
            // Intentos intermedios: el archivo queda para el reintento.
            if ctx.is_final_attempt() {
                remove_staged(&staged.path).await;
            }
            Err(StepError::Store(format!("put {key}: {e}")))
        }
    }
}
