//! `WorkflowController`: orquesta un run completo.
//!
//! Secuencia: replay → sesión → `CheckForChange` → (`NoChange` | `Fetch` →
//! `Archive` → `Promote`) → liberar sesión → `RunCompleted`. Todo lo que el
//! controlador decide queda en el `EventStore` antes de actuar, así que
//! `run` sobre un run existente continúa donde quedó.
//!
//! Un solo worker maneja cada run: antes de leer el log el controlador toma
//! el lease del run en el `EventStore`, lo renueva mientras corre y lo suelta
//! al terminar. Si otro worker lo tiene, `run` devuelve `RunLeased` sin
//! ejecutar nada.
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::constants::ENGINE_VERSION;
use crate::engine::{SessionInfo, SessionPool, StepExecutor};
use crate::errors::{millis, CoreEngineError};
use crate::event::{EventStore, RunEventKind};
use crate::model::{ArchivedArtifact, ChangeCheck, RunOutcome, RunStatus, StagedArtifact};
use crate::repo::{replay, RunInstance};
use crate::step::{Activities, StepKind, StepStatus, WorkflowOptions};

pub struct WorkflowController<E: EventStore, A: Activities> {
    events: E,
    activities: Arc<A>,
    sessions: SessionPool,
    options: WorkflowOptions,
}

impl<E: EventStore, A: Activities> WorkflowController<E, A> {
    pub fn new(events: E, activities: A, sessions: SessionPool, options: WorkflowOptions) -> Self {
        Self { events,
               activities: Arc::new(activities),
               sessions,
               options }
    }

    pub fn event_store(&self) -> &E {
        &self.events
    }

    pub fn activities(&self) -> &A {
        &self.activities
    }

    pub fn sessions(&self) -> &SessionPool {
        &self.sessions
    }

    pub fn options(&self) -> &WorkflowOptions {
        &self.options
    }

    /// Estado actual del run según sus eventos.
    pub async fn describe(&self, run_id: Uuid) -> Result<RunInstance, CoreEngineError> {
        let events = self.events.list(run_id).await?;
        replay(run_id, &events)
    }

    pub async fn run(&self, run_id: Uuid, scheduled_time: DateTime<Utc>) -> Result<RunOutcome, CoreEngineError> {
        self.run_with_cancel(run_id, scheduled_time, &CancellationToken::new()).await
    }

    /// Reanuda un run abierto usando la fecha programada registrada.
    pub async fn resume(&self, run_id: Uuid, cancel: &CancellationToken) -> Result<RunOutcome, CoreEngineError> {
        let inst = self.describe(run_id).await?;
        let scheduled_time = inst.scheduled_time
                                 .ok_or_else(|| CoreEngineError::Internal(format!("run {run_id} was never initialized")))?;
        self.run_with_cancel(run_id, scheduled_time, cancel).await
    }

    /// Ejecuta (o continúa) el run. Si `scheduled_time` difiere del registrado
    /// en `RunInitialized`, gana el registrado.
    ///
    /// Con `cancel` activado el run se corta sin `RunCompleted`: el staging se
    /// borra y el próximo worker lo reanuda. Lo mismo si se pierde el lease.
    pub async fn run_with_cancel(&self, run_id: Uuid, scheduled_time: DateTime<Utc>, cancel: &CancellationToken) -> Result<RunOutcome, CoreEngineError> {
        let owner = self.sessions.worker_id();
        let ttl = self.sessions.options().lease_ttl;
        if !self.events.acquire_lease(run_id, owner, ttl).await? {
            info!("run:leased_elsewhere run_id={run_id} worker_id={owner}");
            return Err(CoreEngineError::RunLeased { run_id });
        }
        let result = tokio::select! {
            r = self.run_leased(run_id, scheduled_time, cancel) => r,
            e = self.keep_lease(run_id, owner, ttl) => Err(e),
        };
        if let Err(e) = self.events.release_lease(run_id, owner).await {
            warn!("run:lease_release_failed run_id={run_id} error={e}");
        }
        result
    }

    /// Renueva el lease cada tercio del ttl. Solo vuelve si el lease se pierde
    /// o el store falla; el run en curso se abandona sin evento terminal.
    async fn keep_lease(&self, run_id: Uuid, owner: &str, ttl: Duration) -> CoreEngineError {
        let mut tick = tokio::time::interval((ttl / 3).max(Duration::from_millis(1)));
        tick.tick().await;
        loop {
            tick.tick().await;
            match self.events.acquire_lease(run_id, owner, ttl).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!("run:lease_lost run_id={run_id} worker_id={owner}");
                    return CoreEngineError::RunLeased { run_id };
                }
                Err(e) => {
                    warn!("run:lease_renew_failed run_id={run_id} error={e}");
                    return e;
                }
            }
        }
    }

    async fn run_leased(&self, run_id: Uuid, scheduled_time: DateTime<Utc>, cancel: &CancellationToken) -> Result<RunOutcome, CoreEngineError> {
        let inst = self.load_or_init(run_id, scheduled_time).await?;
        if let Some(status) = inst.status.clone() {
            info!("run:replayed run_id={run_id} state={:?}", inst.state);
            return status.into_result();
        }
        let scheduled_time = inst.scheduled_time.unwrap_or(scheduled_time);

        let created = tokio::select! {
            _ = cancel.cancelled() => return Err(CoreEngineError::Cancelled),
            s = self.sessions.create(run_id) => s,
        };
        let session = match created {
            Ok(s) => s,
            Err(e) => return self.finish(run_id, Err(e)).await,
        };
        let info = session.info().clone();
        self.events
            .append_kind(run_id,
                         RunEventKind::SessionCreated { session_id: info.id,
                                                        worker_id: info.worker_id.clone() })
            .await?;
        info!("run:start run_id={run_id} session_id={} scheduled_time={scheduled_time}", info.id);

        let inst = self.describe(run_id).await?;
        let limit = session.execution_timeout();
        let driven = match tokio::time::timeout(limit, self.drive(&inst, &info, scheduled_time, cancel)).await {
            Ok(r) => r,
            Err(_) => Err(CoreEngineError::SessionExpired { after_ms: millis(limit) }),
        };

        match driven {
            // Sin evento terminal: el run queda abierto para reanudarse.
            Err(e @ (CoreEngineError::Cancelled | CoreEngineError::Persistence(_))) => {
                drop(session);
                warn!("run:interrupted run_id={run_id} reason={e}");
                Err(e)
            }
            driven => {
                if let Err(e) = session.complete() {
                    warn!("run:staging_cleanup_failed run_id={run_id} error={e}");
                }
                self.events
                    .append_kind(run_id, RunEventKind::SessionCompleted { session_id: info.id })
                    .await?;
                self.finish(run_id, driven).await
            }
        }
    }

    async fn load_or_init(&self, run_id: Uuid, scheduled_time: DateTime<Utc>) -> Result<RunInstance, CoreEngineError> {
        let inst = self.describe(run_id).await?;
        if inst.is_initialized() {
            return Ok(inst);
        }
        self.events
            .append_kind(run_id,
                         RunEventKind::RunInitialized { scheduled_time,
                                                        engine_version: ENGINE_VERSION.to_string() })
            .await?;
        self.describe(run_id).await
    }

    async fn finish(&self, run_id: Uuid, result: Result<RunOutcome, CoreEngineError>) -> Result<RunOutcome, CoreEngineError> {
        let status = match &result {
            Ok(outcome) => RunStatus::Succeeded(outcome.clone()),
            Err(error) => RunStatus::Failed { error: error.clone() },
        };
        self.events.append_kind(run_id, RunEventKind::RunCompleted { status }).await?;
        match &result {
            Ok(outcome) => info!("run:completed run_id={run_id} outcome={outcome:?}"),
            Err(error) => warn!("run:failed run_id={run_id} error={error}"),
        }
        result
    }

    async fn drive(&self, inst: &RunInstance, session: &SessionInfo, scheduled_time: DateTime<Utc>, cancel: &CancellationToken) -> Result<RunOutcome, CoreEngineError> {
        let exec = StepExecutor::new(&self.events, inst.id, scheduled_time, session, cancel);
        let acts = &self.activities;

        let check: ChangeCheck = match inst.slot(StepKind::CheckForChange).output_as()? {
            Some(check) => check,
            None => {
                exec.execute(StepKind::CheckForChange,
                             self.options.for_step(StepKind::CheckForChange),
                             inst.slot(StepKind::CheckForChange),
                             |ctx| {
                                 let a = Arc::clone(acts);
                                 async move { a.check_for_change(&ctx).await }
                             })
                    .await?
            }
        };
        if !check.changed {
            info!("run:no_change run_id={} version_tag={}", inst.id, check.remote_version_tag);
            return Ok(RunOutcome::NoChange);
        }

        let archived: ArchivedArtifact = match inst.slot(StepKind::Archive).output_as()? {
            Some(archived) => archived,
            None => {
                let staged = self.staged(&exec, inst, session, &check).await?;
                exec.execute(StepKind::Archive,
                             self.options.for_step(StepKind::Archive),
                             inst.slot(StepKind::Archive),
                             |ctx| {
                                 let a = Arc::clone(acts);
                                 let staged = staged.clone();
                                 async move { a.archive(&ctx, &staged).await }
                             })
                    .await?
            }
        };

        if inst.slot(StepKind::Promote).status != StepStatus::FinishedOk {
            exec.execute(StepKind::Promote,
                         self.options.for_step(StepKind::Promote),
                         inst.slot(StepKind::Promote),
                         |ctx| {
                             let a = Arc::clone(acts);
                             let archived = archived.clone();
                             async move { a.promote(&ctx, &archived).await }
                         })
                .await?;
        }

        Ok(RunOutcome::Promoted { archived_key: archived.key,
                                  version_tag: archived.version_tag })
    }

    /// Artifact staged en la sesión actual. Un `Fetch` terminado en otra
    /// sesión no sirve (su staging ya no existe) y se repite.
    async fn staged(&self, exec: &StepExecutor<'_, E>, inst: &RunInstance, session: &SessionInfo, check: &ChangeCheck) -> Result<StagedArtifact, CoreEngineError> {
        let slot = inst.slot(StepKind::Fetch);
        if let Some(staged) = slot.output_as::<StagedArtifact>()? {
            if staged.session_id == session.id {
                return Ok(staged);
            }
            info!("run:refetch run_id={} previous_session={} session_id={}", inst.id, staged.session_id, session.id);
        }
        let acts = &self.activities;
        let staged = exec.execute(StepKind::Fetch, self.options.for_step(StepKind::Fetch), slot, |ctx| {
                             let a = Arc::clone(acts);
                             async move { a.fetch(&ctx).await }
                         })
                         .await?;
        if staged.version_tag != check.remote_version_tag {
            warn!("run:version_drift run_id={} probed={} fetched={}",
                  inst.id, check.remote_version_tag, staged.version_tag);
            exec.signal(StepKind::Fetch,
                        "version_drift",
                        json!({ "probed": check.remote_version_tag, "fetched": staged.version_tag }))
                .await?;
        }
        Ok(staged)
    }
}
