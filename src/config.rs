//! Configuración central del proceso.
//!
//! `AppConfig` se resuelve una vez al arrancar (entorno + `.env` opcional) y
//! se pasa por construcción a `bootstrap`. Nada lee el entorno después.
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use pbf_adapters::S3Settings;
use pbf_core::constants::DEFAULT_VERSION_METADATA_KEY;
use pbf_core::engine::DEFAULT_MAX_SESSIONS;
use pbf_persistence::config::{DEFAULT_MAX_CONNECTIONS, DEFAULT_MIN_CONNECTIONS};
use pbf_persistence::DbConfig;

use crate::errors::ConfigError;

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_SCHEDULE_ID: &str = "osm-download";
pub const DEFAULT_SCHEDULE_INTERVAL_SECS: u64 = 86_400;
pub const DEFAULT_POLL_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// URL del recurso remoto (`PBF_URL`).
    pub source_url: String,
    pub s3: S3Settings,
    /// Key del puntero "latest" (`PBF_KEY`).
    pub pointer_key: String,
    pub version_metadata_key: String,
    pub database: DbConfig,
    pub schedule_id: String,
    pub schedule_interval: Duration,
    pub poll_interval: Duration,
    pub max_sessions: usize,
    /// Raíz de los directorios de staging; `None` usa el temp del sistema.
    pub staging_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Carga `.env` si existe y lee el entorno del proceso.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|k| env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
        where F: Fn(&str) -> Option<String>
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let source_url = required("PBF_URL")?;
        if !(source_url.starts_with("http://") || source_url.starts_with("https://")) {
            return Err(ConfigError::Invalid { key: "PBF_URL",
                                              value: source_url,
                                              reason: "expected an http(s) URL".into() });
        }
        let pointer_key = required("PBF_KEY")?;
        if pointer_key.ends_with('/') {
            return Err(ConfigError::Invalid { key: "PBF_KEY",
                                              value: pointer_key,
                                              reason: "must name an object, not a prefix".into() });
        }
        let s3 = S3Settings { region: get("S3_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
                              endpoint_url: get("S3_ENDPOINT_URL"),
                              bucket: required("BUCKET")? };
        let database = DbConfig { url: required("DATABASE_URL")?,
                                  min_connections: parse_or(&get, "DATABASE_MIN_CONNECTIONS", DEFAULT_MIN_CONNECTIONS)?,
                                  max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)? };
        let interval_secs: u64 = parse_or(&get, "SCHEDULE_INTERVAL_SECS", DEFAULT_SCHEDULE_INTERVAL_SECS)?;
        let poll_secs: u64 = parse_or(&get, "WORKER_POLL_SECS", DEFAULT_POLL_SECS)?;
        let max_sessions: usize = parse_or(&get, "WORKER_MAX_SESSIONS", DEFAULT_MAX_SESSIONS)?;
        for (key, value) in [("SCHEDULE_INTERVAL_SECS", interval_secs), ("WORKER_POLL_SECS", poll_secs), ("WORKER_MAX_SESSIONS", max_sessions as u64)] {
            if value == 0 {
                return Err(ConfigError::Invalid { key,
                                                  value: "0".into(),
                                                  reason: "must be greater than zero".into() });
            }
        }

        Ok(Self { source_url,
                  s3,
                  pointer_key,
                  version_metadata_key: get("VERSION_METADATA_KEY").unwrap_or_else(|| DEFAULT_VERSION_METADATA_KEY.to_string()),
                  database,
                  schedule_id: get("SCHEDULE_ID").unwrap_or_else(|| DEFAULT_SCHEDULE_ID.to_string()),
                  schedule_interval: Duration::from_secs(interval_secs),
                  poll_interval: Duration::from_secs(poll_secs),
                  max_sessions,
                  staging_dir: get("STAGING_DIR").map(PathBuf::from) })
    }
}

fn parse_or<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
    where G: Fn(&str) -> Option<String>,
          T: FromStr
{
    match get(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { key,
                                                                        value,
                                                                        reason: "expected a non-negative integer".into() }),
    }
}
