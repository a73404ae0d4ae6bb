//! Cableado de producción: pool Postgres, origen HTTP, store S3 y el
//! controlador, a partir de un `AppConfig` ya resuelto.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pbf_adapters::{HttpSource, PbfActivities, S3ObjectStore};
use pbf_core::{ControllerBuilder, ScheduleSpec, Worker, WorkflowController};
use pbf_persistence::{build_pool, PgEventStore, PgScheduleStore, PoolProvider};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::errors::AppError;

pub type Events = PgEventStore<PoolProvider>;
pub type Schedules = PgScheduleStore<PoolProvider>;
pub type Steps = PbfActivities<HttpSource, S3ObjectStore>;
pub type Controller = WorkflowController<Events, Steps>;

pub struct Services {
    pub controller: Arc<Controller>,
    pub schedules: Schedules,
}

impl Services {
    pub fn worker(&self, cfg: &AppConfig) -> Worker<Events, Steps, Schedules> {
        Worker::new(Arc::clone(&self.controller), self.schedules.clone(), cfg.poll_interval)
    }
}

/// Instala el subscriber de `tracing` (también recoge los `log::` de los
/// crates de librería). `RUST_LOG` tiene prioridad sobre `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
}

/// Identificador del worker en `SessionCreated`: host + pid.
pub fn worker_id() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("{host}-{}", std::process::id())
}

/// Pool y stores durables. Aplica migraciones pendientes.
pub async fn connect_stores(cfg: &AppConfig) -> Result<(Events, Schedules), AppError> {
    let db = cfg.database.clone();
    let built = tokio::task::spawn_blocking(move || build_pool(&db.url, db.min_connections, db.max_connections)).await;
    let pool = built.map_err(|e| AppError::Internal(format!("pool task: {e}")))??;
    let provider = PoolProvider::new(pool);
    Ok((PgEventStore::new(provider.clone()), PgScheduleStore::new(provider)))
}

pub async fn build(cfg: &AppConfig) -> Result<Services, AppError> {
    let (events, schedules) = connect_stores(cfg).await?;
    let source = HttpSource::new(cfg.source_url.clone())?;
    let store = S3ObjectStore::connect(&cfg.s3).await;
    let activities = PbfActivities::new(source, store, cfg.pointer_key.clone()).with_metadata_key(cfg.version_metadata_key.clone());

    let mut builder = ControllerBuilder::new(events, activities).worker_id(worker_id())
                                                                .max_sessions(cfg.max_sessions);
    if let Some(root) = &cfg.staging_dir {
        tokio::fs::create_dir_all(root).await?;
        builder = builder.staging_root(root.clone());
    }
    info!(bucket = %cfg.s3.bucket, pointer_key = %cfg.pointer_key, "bootstrap:ready");
    Ok(Services { controller: Arc::new(builder.build()),
                  schedules })
}

/// Schedule configurado con primer disparo en `first_fire`.
pub fn schedule_spec(cfg: &AppConfig, first_fire: DateTime<Utc>) -> ScheduleSpec {
    ScheduleSpec::new(cfg.schedule_id.clone(), cfg.schedule_interval, first_fire)
}
