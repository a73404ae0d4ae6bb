//! Promoter: avanza el puntero "latest" con una copia server-side.
//!
//! Tras la copia se relee la metadata del puntero: si el tag no coincide con
//! el del artifact archivado la promoción se considera fallida.
use log::debug;
use pbf_core::{ArchivedArtifact, ObjectStore, StepError, StoreError};

pub async fn promote_archived<S>(store: &S, archived: &ArchivedArtifact, pointer_key: &str, metadata_key: &str) -> Result<(), StepError>
    where S: ObjectStore + ?Sized
{
    store.copy(&archived.key, pointer_key).await.map_err(|e| match e {
                                                    StoreError::NotFound(key) => StepError::Promotion(format!("archived object {key} is missing")),
                                                    other => StepError::Promotion(format!("copy {} -> {pointer_key}: {other}", archived.key)),
                                                })?;
    let promoted = store.head(pointer_key)
                        .await
                        .map_err(|e| StepError::Promotion(format!("head {pointer_key}: {e}")))?
                        .and_then(|meta| meta.get(metadata_key).cloned());
    if promoted.as_deref() != Some(archived.version_tag.as_str()) {
        return Err(StepError::Promotion(format!("pointer {pointer_key} carries tag {promoted:?}, expected {}",
                                                archived.version_tag)));
    }
    debug!("promote:done key={} pointer={pointer_key} tag={}", archived.key, archived.version_tag);
    Ok(())
}
