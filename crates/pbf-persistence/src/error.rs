//! Errores de persistencia.
//! Mapea errores de Diesel / conexión a variantes semánticas y de ahí al
//! `CoreEngineError::Persistence` que ve el motor.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use pbf_core::CoreEngineError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("check violation: {0}")]
    CheckViolation(String),
    #[error("not found")]
    NotFound,
    #[error("serialization conflict (retryable)")]
    SerializationConflict,
    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),
    #[error("run {0} already completed")]
    RunClosed(Uuid),
    #[error("payload codec: {0}")]
    Codec(String),
    #[error("config: {0}")]
    Config(String),
    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => Self::UniqueViolation(info.message().to_string()),
                DatabaseErrorKind::CheckViolation => Self::CheckViolation(info.message().to_string()),
                DatabaseErrorKind::SerializationFailure => Self::SerializationConflict,
                DatabaseErrorKind::ClosedConnection => Self::TransientIo(info.message().to_string()),
                other => Self::Unknown(format!("db error kind {:?}: {}", other, info.message())),
            },
            DieselError::DeserializationError(e) => Self::Codec(format!("deser: {e}")),
            DieselError::SerializationError(e) => Self::Codec(format!("ser: {e}")),
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".into()),
            DieselError::RollbackErrorOnCommit { rollback_error, commit_error } => {
                Self::Unknown(format!("rollback={rollback_error}; commit={commit_error}"))
            }
            other => Self::Unknown(format!("unhandled diesel error: {other:?}")),
        }
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<PersistenceError> for CoreEngineError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Codec(msg) => CoreEngineError::Decode(msg),
            other => CoreEngineError::Persistence(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_errors_surface_as_decode() {
        let err: CoreEngineError = PersistenceError::Codec("bad payload".into()).into();
        assert_eq!(err, CoreEngineError::Decode("bad payload".into()));
    }

    #[test]
    fn closed_run_surfaces_as_persistence() {
        let id = Uuid::nil();
        let err: CoreEngineError = PersistenceError::RunClosed(id).into();
        assert_eq!(err, CoreEngineError::Persistence(format!("run {id} already completed")));
    }
}
