//! pbf-sync
//!
//! Librería del binario: configuración resuelta desde el entorno, errores de
//! arranque y el cableado de producción (`bootstrap`) de los crates
//! `pbf-core`, `pbf-adapters` y `pbf-persistence`.

pub mod bootstrap;
pub mod config;
pub mod errors;

pub use config::AppConfig;
pub use errors::{AppError, ConfigError};
