//! Worker: reanuda runs abiertos y dispara los schedules vencidos.
//!
//! Cada run corre en su propia tarea con una sesión propia; el mismo `run_id`
//! nunca corre dos veces a la vez en un worker, y el lease del run lo excluye
//! de los demás workers (ver `WorkflowController`). Al apagarse, el token de
//! shutdown cancela los runs en curso, que quedan abiertos en el log.
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use log::{error, info, warn};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::engine::WorkflowController;
use crate::errors::CoreEngineError;
use crate::event::EventStore;
use crate::model::RunOutcome;
use crate::schedule::ScheduleStore;
use crate::step::Activities;

pub type RunResult = (Uuid, Result<RunOutcome, CoreEngineError>);

enum Wake {
    Shutdown,
    Tick,
    Joined(Result<RunResult, JoinError>),
}

pub struct Worker<E, A, S>
    where E: EventStore + 'static,
          A: Activities,
          S: ScheduleStore
{
    controller: Arc<WorkflowController<E, A>>,
    schedules: S,
    poll_interval: Duration,
    active: Arc<DashSet<Uuid>>,
}

impl<E, A, S> Worker<E, A, S>
    where E: EventStore + 'static,
          A: Activities,
          S: ScheduleStore
{
    pub fn new(controller: Arc<WorkflowController<E, A>>, schedules: S, poll_interval: Duration) -> Self {
        Self { controller,
               schedules,
               poll_interval,
               active: Arc::new(DashSet::new()) }
    }

    pub fn is_active(&self, run_id: Uuid) -> bool {
        self.active.contains(&run_id)
    }

    /// Lanza los runs que quedaron abiertos (crash o shutdown previo).
    pub async fn resume_open_runs(&self, tasks: &mut JoinSet<RunResult>, shutdown: &CancellationToken) -> Result<usize, CoreEngineError> {
        let mut started = 0;
        for run_id in self.controller.event_store().open_runs().await? {
            let inst = match self.controller.describe(run_id).await {
                Ok(inst) => inst,
                Err(e) => {
                    warn!("worker:skip_unreadable_run run_id={run_id} error={e}");
                    continue;
                }
            };
            if let Some(scheduled_time) = inst.scheduled_time {
                if self.spawn_run(tasks, run_id, scheduled_time, shutdown) {
                    started += 1;
                }
            }
        }
        Ok(started)
    }

    /// Reclama los schedules vencidos y lanza un run por disparo.
    pub async fn poll_once(&self, tasks: &mut JoinSet<RunResult>, shutdown: &CancellationToken) -> Result<usize, CoreEngineError> {
        let fires = self.schedules.claim_due(Utc::now()).await?;
        let mut started = 0;
        for fire in fires {
            info!("worker:fire schedule_id={} run_id={} scheduled_time={}",
                  fire.schedule_id, fire.run_id, fire.scheduled_time);
            if self.spawn_run(tasks, fire.run_id, fire.scheduled_time, shutdown) {
                started += 1;
            }
        }
        Ok(started)
    }

    fn spawn_run(&self, tasks: &mut JoinSet<RunResult>, run_id: Uuid, scheduled_time: DateTime<Utc>, shutdown: &CancellationToken) -> bool {
        if !self.active.insert(run_id) {
            return false;
        }
        let controller = Arc::clone(&self.controller);
        let active = Arc::clone(&self.active);
        let token = shutdown.child_token();
        tasks.spawn(async move {
                 let result = controller.run_with_cancel(run_id, scheduled_time, &token).await;
                 active.remove(&run_id);
                 (run_id, result)
             });
        true
    }

    /// Bucle principal hasta `shutdown`. Espera a que los runs en curso
    /// terminen (cancelados) antes de volver.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), CoreEngineError> {
        let mut tasks = JoinSet::new();
        let resumed = self.resume_open_runs(&mut tasks, &shutdown).await?;
        info!("worker:start worker_id={} resumed={resumed} poll_ms={}",
              self.controller.sessions().worker_id(),
              self.poll_interval.as_millis());

        let mut tick = tokio::time::interval(self.poll_interval);
        loop {
            let wake = tokio::select! {
                _ = shutdown.cancelled() => Wake::Shutdown,
                _ = tick.tick() => Wake::Tick,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => Wake::Joined(joined),
            };
            match wake {
                Wake::Shutdown => break,
                Wake::Tick => {
                    if let Err(e) = self.poll_once(&mut tasks, &shutdown).await {
                        warn!("worker:poll_failed error={e}");
                    }
                }
                Wake::Joined(joined) => log_joined(joined),
            }
        }

        info!("worker:shutdown in_flight={}", tasks.len());
        while let Some(joined) = tasks.join_next().await {
            log_joined(joined);
        }
        Ok(())
    }
}

fn log_joined(joined: Result<RunResult, JoinError>) {
    match joined {
        Ok((run_id, Ok(outcome))) => info!("worker:run_done run_id={run_id} outcome={outcome:?}"),
        Ok((run_id, Err(CoreEngineError::Cancelled))) => info!("worker:run_cancelled run_id={run_id}"),
        Ok((run_id, Err(CoreEngineError::RunLeased { .. }))) => info!("worker:run_skipped run_id={run_id} reason=leased"),
        Ok((run_id, Err(e))) => warn!("worker:run_failed run_id={run_id} error={e}"),
        Err(e) => error!("worker:task_panicked error={e}"),
    }
}
