//! Ejecución de un step con reintentos, timeout y vigilancia de heartbeat.
//!
//! Cada intento queda registrado (`StepStarted` seguido de `StepFinished` o
//! `StepFailed`) antes de decidir el siguiente paso, de modo que un worker
//! que reanuda el run continúa la cuenta de intentos donde quedó.
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::engine::{Heartbeat, SessionInfo};
use crate::errors::{millis, CoreEngineError, StepError};
use crate::event::{EventStore, RunEventKind};
use crate::model::StepContext;
use crate::repo::StepSlot;
use crate::step::{StepKind, StepOptions, StepStatus};

pub struct StepExecutor<'a, E: EventStore> {
    events: &'a E,
    run_id: Uuid,
    scheduled_time: DateTime<Utc>,
    session: &'a SessionInfo,
    cancel: &'a CancellationToken,
}

impl<'a, E: EventStore> StepExecutor<'a, E> {
    pub fn new(events: &'a E, run_id: Uuid, scheduled_time: DateTime<Utc>, session: &'a SessionInfo, cancel: &'a CancellationToken) -> Self {
        Self { events,
               run_id,
               scheduled_time,
               session,
               cancel }
    }

    /// Ejecuta `step` hasta que un intento termine bien o se agote la
    /// política. `slot` es el estado del step según el replay.
    pub async fn execute<T, F, Fut>(&self, step: StepKind, options: &StepOptions, slot: &StepSlot, f: F) -> Result<T, CoreEngineError>
        where T: Serialize,
              F: Fn(StepContext) -> Fut,
              Fut: Future<Output = Result<T, StepError>>
    {
        let mut attempt = self.resume_attempt(step, options, slot).await?;
        loop {
            let (heartbeat, monitor) = Heartbeat::channel();
            let ctx = StepContext { run_id: self.run_id,
                                    step,
                                    attempt,
                                    max_attempts: options.retry.maximum_attempts,
                                    scheduled_time: self.scheduled_time,
                                    session: self.session.clone(),
                                    heartbeat };
            self.append(RunEventKind::StepStarted { step, attempt }).await?;
            debug!("step:start run_id={} step={step} attempt={attempt}", self.run_id);

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(CoreEngineError::Cancelled),
                r = tokio::time::timeout(options.start_to_close, f(ctx)) => match r {
                    Ok(r) => r,
                    Err(_) => Err(StepError::Timeout { after_ms: millis(options.start_to_close) }),
                },
                e = monitor.stalled(options.heartbeat_timeout) => Err(e),
            };

            match result {
                Ok(out) => {
                    let output = serde_json::to_value(&out).map_err(|e| CoreEngineError::Internal(format!("{step} output: {e}")))?;
                    self.append(RunEventKind::StepFinished { step, attempt, output }).await?;
                    debug!("step:done run_id={} step={step} attempt={attempt}", self.run_id);
                    return Ok(out);
                }
                Err(error) => {
                    warn!("step:failed run_id={} step={step} attempt={attempt} error={error}", self.run_id);
                    self.append(RunEventKind::StepFailed { step,
                                                           attempt,
                                                           error: error.clone() })
                        .await?;
                    attempt = self.after_failure(step, options, attempt, error).await?;
                }
            }
        }
    }

    /// Próximo intento según el replay.
    async fn resume_attempt(&self, step: StepKind, options: &StepOptions, slot: &StepSlot) -> Result<u32, CoreEngineError> {
        match slot.status {
            StepStatus::Pending | StepStatus::FinishedOk => Ok(1),
            StepStatus::Running => {
                // Intento colgado: el worker anterior murió sin registrar el final.
                warn!("step:abandoned run_id={} step={step} attempt={}", self.run_id, slot.attempts);
                self.append(RunEventKind::StepFailed { step,
                                                       attempt: slot.attempts,
                                                       error: StepError::Abandoned })
                    .await?;
                self.after_failure(step, options, slot.attempts, StepError::Abandoned).await
            }
            StepStatus::Failed => {
                let error = slot.last_error.clone().unwrap_or(StepError::Abandoned);
                self.after_failure(step, options, slot.attempts, error).await
            }
            StepStatus::BackingOff => {
                if let Some(fire_at) = slot.retry_fire_at {
                    self.sleep_until(fire_at).await?;
                }
                Ok(slot.attempts + 1)
            }
        }
    }

    /// Agenda el reintento y espera, o agota el step.
    async fn after_failure(&self, step: StepKind, options: &StepOptions, attempt: u32, error: StepError) -> Result<u32, CoreEngineError> {
        if attempt >= options.retry.maximum_attempts || !options.retry.is_retryable(&error) {
            return Err(CoreEngineError::StepExhausted { step,
                                                        attempts: attempt,
                                                        error });
        }
        let delay = options.retry.backoff_for(attempt);
        let fire_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        self.append(RunEventKind::RetryScheduled { step,
                                                   next_attempt: attempt + 1,
                                                   fire_at })
            .await?;
        debug!("step:retry run_id={} step={step} next_attempt={} in_ms={}", self.run_id, attempt + 1, millis(delay));
        self.sleep_until(fire_at).await?;
        Ok(attempt + 1)
    }

    async fn sleep_until(&self, fire_at: DateTime<Utc>) -> Result<(), CoreEngineError> {
        let wait = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::select! {
            _ = self.cancel.cancelled() => Err(CoreEngineError::Cancelled),
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }

    async fn append(&self, kind: RunEventKind) -> Result<(), CoreEngineError> {
        self.events.append_kind(self.run_id, kind).await.map(|_| ())
    }

    pub(crate) async fn signal(&self, step: StepKind, signal: &str, data: serde_json::Value) -> Result<(), CoreEngineError> {
        self.append(RunEventKind::StepSignal { step,
                                               signal: signal.to_string(),
                                               data })
            .await
    }
}
