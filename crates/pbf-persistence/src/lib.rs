//! pbf-persistence
//!
//! Backend Postgres (Diesel + r2d2) del motor: log de eventos y lease de cada run,
//! y schedules, con migraciones embebidas que se aplican al construir el pool.
//!
//! Módulos:
//! - `pg`: `PgEventStore` y `PgScheduleStore` sobre un `ConnectionProvider`.
//! - `migrations`: runner embebido.
//! - `config`: `DbConfig` desde el entorno (.env opcional).
//! - `schema`: tablas Diesel.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use pg::{build_pool, build_pool_from_env, ConnectionProvider, PgEventStore, PgPool, PgScheduleStore, PoolProvider};
