use pbf_core::{CoreEngineError, SourceError};
use pbf_persistence::PersistenceError;
use thiserror::Error;

use super::ConfigError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Error de configuración: {0}")]
    Config(#[from] ConfigError),
    #[error("Error de persistencia: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Error del origen remoto: {0}")]
    Source(#[from] SourceError),
    #[error("Error del motor: {0}")]
    Engine(#[from] CoreEngineError),
    #[error("Error en IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Error interno: {0}")]
    Internal(String),
}

impl AppError {
    /// Código de salida del proceso.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) => 2,
            AppError::Engine(CoreEngineError::StepExhausted { .. }) => 3,
            AppError::Engine(_) => 4,
            AppError::Persistence(_) | AppError::Source(_) | AppError::Io(_) | AppError::Internal(_) => 5,
        }
    }
}
