//! Artifacts intercambiados entre steps.
//!
//! - `StagedArtifact` vive en el directorio de staging de la sesión y sólo es
//!   válido dentro del run (y la sesión) que lo creó.
//! - `ArchivedArtifact` describe un objeto durable inmutable bajo una key
//!   fechada.
//! - El `VersionTag` es opaco: sólo se compara por igualdad exacta.
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata de objetos durables (orden estable para logs y tests).
pub type ObjectMetadata = BTreeMap<String, String>;

/// Identificador opaco de una revisión del recurso remoto (ETag o similar).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionTag(String);

impl VersionTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionTag {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for VersionTag {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Resultado de comparar el tag remoto con el tag del puntero "latest".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCheck {
    pub changed: bool,
    pub remote_version_tag: VersionTag,
    /// `None` cuando el puntero no existe todavía.
    pub stored_version_tag: Option<VersionTag>,
}

impl ChangeCheck {
    /// Igualdad exacta de tags. Dos tags vacíos son iguales: un origen sin
    /// ETag no provoca una descarga en cada run.
    pub fn compare(remote: VersionTag, stored: Option<VersionTag>) -> Self {
        let changed = match &stored {
            None => true,
            Some(s) => *s != remote,
        };
        Self { changed,
               remote_version_tag: remote,
               stored_version_tag: stored }
    }
}

/// Archivo local descargado por `Fetch` y consumido por `Archive`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedArtifact {
    pub path: PathBuf,
    pub version_tag: VersionTag,
    /// Sesión dueña del archivo; otra sesión no puede alcanzarlo.
    pub session_id: Uuid,
    pub size_bytes: u64,
    /// blake3 (hex) de los bytes escritos.
    pub digest: String,
}

/// Objeto durable escrito por `Archive`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedArtifact {
    pub key: String,
    pub version_tag: VersionTag,
    pub size_bytes: u64,
    pub digest: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_pointer_counts_as_change() {
        let c = ChangeCheck::compare("abc123".into(), None);
        assert!(c.changed);
        assert_eq!(c.stored_version_tag, None);
    }

    #[test]
    fn equal_tags_mean_no_change() {
        let c = ChangeCheck::compare("abc123".into(), Some("abc123".into()));
        assert!(!c.changed);
    }

    #[test]
    fn any_mismatch_counts_as_change() {
        assert!(ChangeCheck::compare("abc123".into(), Some("abc124".into())).changed);
        assert!(ChangeCheck::compare("abc123".into(), Some("".into())).changed);
        assert!(ChangeCheck::compare("".into(), Some("abc123".into())).changed);
    }

    #[test]
    fn equal_empty_tags_mean_no_change() {
        let c = ChangeCheck::compare("".into(), Some("".into()));
        assert!(!c.changed);
    }

    #[test]
    fn version_tag_serializes_as_plain_string() {
        let v = serde_json::to_value(VersionTag::new("\"etag-1\"")).unwrap();
        assert_eq!(v, serde_json::json!("\"etag-1\""));
    }
}
