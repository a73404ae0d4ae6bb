use serde::{Deserialize, Serialize};

use crate::errors::CoreEngineError;
use crate::model::VersionTag;

/// Resultado exitoso de un run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// El tag remoto coincide con el del puntero: sin efectos.
    NoChange,
    /// Se archivó y promovió una nueva revisión.
    Promoted { archived_key: String, version_tag: VersionTag },
}

/// Estado terminal registrado en `RunCompleted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Succeeded(RunOutcome),
    Failed { error: CoreEngineError },
}

impl RunStatus {
    pub fn into_result(self) -> Result<RunOutcome, CoreEngineError> {
        match self {
            RunStatus::Succeeded(o) => Ok(o),
            RunStatus::Failed { error } => Err(error),
        }
    }
}
