//! ChangeDetector: compara el tag remoto con el del puntero "latest".
//!
//! Sólo lectura: un HEAD al recurso y un head del objeto puntero.

use log::debug;
use pbf_core::{ChangeCheck, ObjectStore, RemoteSource, StepError, VersionTag};

pub async fn detect_change<R, S>(source: &R, store: &S, pointer_key: &str, metadata_key: &str) -> Result<ChangeCheck, StepError>
    where R: RemoteSource + ?Sized,
          S: ObjectStore + ?Sized
{
    let remote = source.probe()
                       .await
                       .map_err(|e| StepError::TransientNetwork(format!("probe {}: {e}", source.url())))?;
    // Puntero ausente = sin artifact previo, no es un error.
    let stored = store.head(pointer_key)
                      .await
                      .map_err(|e| StepError::Store(format!("head {pointer_key}: {e}")))?
                      .map(|meta| VersionTag::new(meta.get(metadata_key).cloned().unwrap_or_default()));
    let check = ChangeCheck::compare(remote, stored);
    debug!("detect:done remote={} stored={:?} changed={}",
           check.remote_version_tag, check.stored_version_tag, check.changed);
    Ok(check)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbf_core::{InMemoryObjectStore, InMemorySource, ObjectMetadata};

    fn meta(tag: &str) -> ObjectMetadata {
        ObjectMetadata::from([("geofabrik-etag".to_string(), tag.to_string())])
    }

    #[tokio::test]
    async fn equal_tags_report_no_change() {
        let source = InMemorySource::new("mem://pbf");
        source.publish("x", "abc123");
        let store = InMemoryObjectStore::new();
        store.insert("region-latest.osm.pbf", "x", meta("abc123"));
        let check = detect_change(&source, &store, "region-latest.osm.pbf", "geofabrik-etag").await.unwrap();
        assert!(!check.changed);
    }

    #[tokio::test]
    async fn pointer_without_tag_counts_as_change() {
        let source = InMemorySource::new("mem://pbf");
        source.publish("x", "abc123");
        let store = InMemoryObjectStore::new();
        store.insert("region-latest.osm.pbf", "x", ObjectMetadata::new());
        let check = detect_change(&source, &store, "region-latest.osm.pbf", "geofabrik-etag").await.unwrap();
        assert!(check.changed);
        assert_eq!(check.stored_version_tag, Some(VersionTag::new("")));
    }

    #[tokio::test]
    async fn failed_probe_is_transient() {
        let source = InMemorySource::new("mem://pbf");
        let store = InMemoryObjectStore::new();
        let err = detect_change(&source, &store, "k", "geofabrik-etag").await.unwrap_err();
        assert!(matches!(err, StepError::TransientNetwork(_)));
    }
}
