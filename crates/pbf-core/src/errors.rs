//! Errores específicos del core.
//!
//! - `StepError`: fallo de un intento de step (taxonomía de red/fetch/store/
//!   promoción más timeouts del executor). Se persiste en `StepFailed`.
//! - `CoreEngineError`: fallo del motor o de un run completo. Se persiste en
//!   `RunCompleted` cuando el run termina en `Failed`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::repo::RunState;
use crate::step::StepKind;

/// Clasificación gruesa usada por la política de reintentos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Red / timeouts: reintentar con backoff.
    Transient,
    /// Falló la ejecución (status HTTP, IO, rechazo del store): reintentable.
    Runtime,
    /// Reintentar no cambia el resultado.
    Permanent,
}

#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum StepError {
    #[error("transient network error: {0}")]
    TransientNetwork(String),
    #[error("fetch error: {0}")]
    Fetch(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("promotion error: {0}")]
    Promotion(String),
    #[error("step timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
    #[error("no heartbeat received within {after_ms}ms")]
    HeartbeatTimeout { after_ms: u64 },
    #[error("attempt abandoned by a previous worker")]
    Abandoned,
    #[error("staged artifact belongs to session {found}, current session is {expected}")]
    SessionMismatch { expected: Uuid, found: Uuid },
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Clasifica un `StepError` para decidir si el executor lo reintenta.
pub fn classify_error(e: &StepError) -> ErrorClass {
    match e {
        StepError::TransientNetwork(_)
        | StepError::Timeout { .. }
        | StepError::HeartbeatTimeout { .. }
        | StepError::Abandoned => ErrorClass::Transient,
        StepError::Fetch(_) | StepError::Store(_) | StepError::Promotion(_) => ErrorClass::Runtime,
        StepError::SessionMismatch { .. } | StepError::InvalidInput(_) => ErrorClass::Permanent,
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum CoreEngineError {
    #[error("session not established within {timeout_ms}ms")]
    SessionUnavailable { timeout_ms: u64 },
    #[error("session expired after {after_ms}ms")]
    SessionExpired { after_ms: u64 },
    #[error("step {step} failed after {attempts} attempt(s): {error}")]
    StepExhausted { step: StepKind, attempts: u32, error: StepError },
    #[error("run cancelled")]
    Cancelled,
    #[error("run {run_id} is leased by another worker")]
    RunLeased { run_id: Uuid },
    #[error("persistence: {0}")]
    Persistence(String),
    #[error("decode: {0}")]
    Decode(String),
    #[error("invalid transition from {from:?} on {on}")]
    InvalidTransition { from: RunState, on: String },
    #[error("internal: {0}")]
    Internal(String),
}

impl CoreEngineError {
    /// Step responsable del fallo, si lo hay.
    pub fn failed_step(&self) -> Option<StepKind> {
        match self {
            CoreEngineError::StepExhausted { step, .. } => Some(*step),
            _ => None,
        }
    }
}

pub(crate) fn millis(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_matches_retry_expectations() {
        assert_eq!(classify_error(&StepError::TransientNetwork("reset".into())), ErrorClass::Transient);
        assert_eq!(classify_error(&StepError::HeartbeatTimeout { after_ms: 5 }), ErrorClass::Transient);
        assert_eq!(classify_error(&StepError::Promotion("missing".into())), ErrorClass::Runtime);
        assert_eq!(classify_error(&StepError::InvalidInput("key".into())), ErrorClass::Permanent);
    }

    #[test]
    fn exhausted_error_names_the_step() {
        let err = CoreEngineError::StepExhausted { step: StepKind::Promote,
                                                   attempts: 3,
                                                   error: StepError::Promotion("copy rejected".into()) };
        assert_eq!(err.failed_step(), Some(StepKind::Promote));
        assert_eq!(err.to_string(), "step promote failed after 3 attempt(s): promotion error: copy rejected");
    }

    #[test]
    fn errors_roundtrip_through_json() {
        let err = CoreEngineError::StepExhausted { step: StepKind::Fetch,
                                                   attempts: 2,
                                                   error: StepError::Timeout { after_ms: 10 } };
        let v = serde_json::to_value(&err).expect("serialize");
        let back: CoreEngineError = serde_json::from_value(v).expect("deserialize");
        assert_eq!(back, err);
    }
}
