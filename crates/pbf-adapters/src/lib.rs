//! pbf-adapters: steps del run y colaboradores de producción.
//!
//! - `steps`: ChangeDetector, Fetcher, Archiver y Promoter como funciones
//!   sobre los traits del core (`RemoteSource`, `ObjectStore`).
//! - `PbfActivities`: implementación de `Activities` que los agrupa con la
//!   configuración resuelta (key del puntero, entrada de metadata).
//! - `HttpSource` (reqwest) y `S3ObjectStore` (aws-sdk-s3).

pub mod activities;
pub mod http;
pub mod s3;
pub mod steps;

pub use activities::PbfActivities;
pub use http::HttpSource;
pub use s3::{S3ObjectStore, S3Settings};
