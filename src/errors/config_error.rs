use thiserror::Error;

/// Variable de entorno ausente o con valor inválido.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Variable requerida ausente: {0}")]
    Missing(&'static str),
    #[error("Valor inválido para {key}: {value:?} ({reason})")]
    Invalid { key: &'static str, value: String, reason: String },
}
