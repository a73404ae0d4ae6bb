//! Sesiones: afinidad de un run con este worker.
//!
//! Una sesión reserva un cupo del worker y un directorio de staging propio del
//! run. Todos los steps de la sesión corren en este proceso, lo que permite a
//! `Fetch` y `Archive` pasarse una ruta local. Al completar (o soltar) la
//! sesión el directorio se elimina con todo su contenido.
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use crate::errors::{millis, CoreEngineError};
use crate::step::SessionOptions;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub worker_id: String,
    pub staging_dir: PathBuf,
}

#[derive(Debug)]
pub struct Session {
    info: SessionInfo,
    dir: TempDir,
    _permit: OwnedSemaphorePermit,
    execution_timeout: Duration,
}

impl Session {
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn staging_dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn execution_timeout(&self) -> Duration {
        self.execution_timeout
    }

    /// Libera el cupo y borra el staging. Soltar la sesión sin llamar a
    /// `complete` también borra el directorio, pero ignora el error.
    pub fn complete(self) -> io::Result<()> {
        debug!("session:complete session_id={} dir={}", self.info.id, self.info.staging_dir.display());
        self.dir.close()
    }
}

#[derive(Debug)]
pub struct SessionPool {
    worker_id: String,
    staging_root: PathBuf,
    permits: Arc<Semaphore>,
    options: SessionOptions,
}

impl SessionPool {
    pub fn new(worker_id: impl Into<String>, staging_root: impl Into<PathBuf>, max_sessions: usize, options: SessionOptions) -> Self {
        Self { worker_id: worker_id.into(),
               staging_root: staging_root.into(),
               permits: Arc::new(Semaphore::new(max_sessions.max(1))),
               options }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Crea una sesión para `run_id`; espera un cupo como máximo
    /// `creation_timeout`.
    pub async fn create(&self, run_id: Uuid) -> Result<Session, CoreEngineError> {
        let limit = self.options.creation_timeout;
        let permit = match tokio::time::timeout(limit, Arc::clone(&self.permits).acquire_owned()).await {
            Ok(Ok(p)) => p,
            Ok(Err(_)) => return Err(CoreEngineError::Internal("session pool closed".into())),
            Err(_) => return Err(CoreEngineError::SessionUnavailable { timeout_ms: millis(limit) }),
        };
        tokio::fs::create_dir_all(&self.staging_root).await
                                                      .map_err(|e| CoreEngineError::Internal(format!("staging root {}: {e}", self.staging_root.display())))?;
        let dir = tempfile::Builder::new().prefix(&format!("pbf-{run_id}-"))
                                          .tempdir_in(&self.staging_root)
                                          .map_err(|e| CoreEngineError::Internal(format!("staging dir: {e}")))?;
        let info = SessionInfo { id: Uuid::new_v4(),
                                 worker_id: self.worker_id.clone(),
                                 staging_dir: dir.path().to_path_buf() };
        debug!("session:create run_id={run_id} session_id={} dir={}", info.id, info.staging_dir.display());
        Ok(Session { info,
                     dir,
                     _permit: permit,
                     execution_timeout: self.options.execution_timeout })
    }
}
