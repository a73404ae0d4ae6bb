//! Implementaciones Postgres (Diesel) de los stores del core.
//!
//! - `PgEventStore`: log append-only por run con `seq` contiguo desde 0,
//!   misma semántica que `InMemoryEventStore` (incluido el rechazo de appends
//!   después de `RunCompleted`).
//! - `PgScheduleStore`: schedules con `claim_due` atómico (`FOR UPDATE`), de
//!   modo que dos workers no reclaman el mismo slot.
//!
//! Diesel es síncrono: cada operación corre en `spawn_blocking` sobre una
//! conexión del pool r2d2, con reintento corto para errores transitorios.

mod events;
mod schedules;

use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager, PooledConnection};
use log::warn;

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;

pub use events::{EventRow, PgEventStore};
pub use schedules::{PgScheduleStore, ScheduleRow};

/// Pool r2d2 de conexiones Postgres.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones (pool real o uno armado en tests).
pub trait ConnectionProvider: Clone + Send + Sync + 'static {
    fn connection(&self) -> Result<PooledConnection<ConnectionManager<PgConnection>>, PersistenceError>;
}

#[derive(Clone)]
pub struct PoolProvider {
    pub pool: PgPool,
}

impl PoolProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Errores que vale la pena reintentar: conflictos de serialización, fallos
/// de pool/conexión y algunos mensajes conocidos que llegan como `Unknown`.
pub(crate) fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict | PersistenceError::TransientIo(_) => true,
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected")
            || m.contains("could not serialize access due to concurrent update")
            || m.contains("terminating connection due to administrator command")
            || m.contains("connection closed")
            || m.contains("connection refused")
            || m.contains("timeout")
        }
        _ => false,
    }
}

const RETRY_ATTEMPTS: u32 = 3;

/// Reintento con backoff lineal corto (15ms, 30ms, 45ms).
pub(crate) fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < RETRY_ATTEMPTS => {
                let delay_ms = 15 * u64::from(attempts + 1);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms", attempts + 1, e, delay_ms);
                std::thread::sleep(Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

/// Corre `f` con una conexión del provider en el pool bloqueante de tokio.
pub(crate) async fn blocking<P, T, F>(provider: &P, op: &'static str, mut f: F) -> Result<T, PersistenceError>
    where P: ConnectionProvider,
          T: Send + 'static,
          F: FnMut(&mut PgConnection) -> Result<T, PersistenceError> + Send + 'static
{
    let provider = provider.clone();
    tokio::task::spawn_blocking(move || {
        with_retry(|| {
            let mut conn = provider.connection()?;
            f(&mut conn)
        })
    }).await
      .map_err(|e| PersistenceError::TransientIo(format!("{op}: blocking task failed: {e}")))?
}

/// Construye un pool r2d2 y corre las migraciones pendientes una vez.
///
/// Si `min_size > max_size` se usa `min = max`.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let max = max_size.max(1);
    let min = min_size.max(1);
    if min > max {
        warn!("build_pool: min_size > max_size ({min} > {max}), using min=max");
    }
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(min.min(max)))
                                    .max_size(max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Carga `.env`, lee `DbConfig` y construye un pool ya migrado.
pub fn build_pool_from_env() -> Result<PgPool, PersistenceError> {
    let cfg = crate::config::DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn retries_transient_errors_then_succeeds() {
        let calls = Cell::new(0);
        let out = with_retry(|| {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(PersistenceError::TransientIo("reset".into()))
            } else {
                Ok(7)
            }
        });
        assert_eq!(out.expect("ok"), 7);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let calls = Cell::new(0);
        let out: Result<(), _> = with_retry(|| {
            calls.set(calls.get() + 1);
            Err(PersistenceError::CheckViolation("event_type".into()))
        });
        assert!(out.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn known_messages_count_as_retryable() {
        assert!(is_retryable(&PersistenceError::Unknown("ERROR: deadlock detected".into())));
        assert!(!is_retryable(&PersistenceError::NotFound));
        assert!(!is_retryable(&PersistenceError::RunClosed(uuid::Uuid::nil())));
    }
}
