//! Tipos de repositorio: estado reconstruido (`RunInstance`) por replay.
//!
//! El replay es lineal: consume los eventos en orden de `seq` y aplica cada
//! uno sobre la instancia. Las transiciones de estado se validan con
//! `RunState::on`, de modo que un log inconsistente falla al cargarse en vez de
//! producir un estado imposible.
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::errors::{CoreEngineError, StepError};
use crate::event::{RunEvent, RunEventKind};
use crate::model::{RunOutcome, RunStatus};
use crate::repo::{RunState, Transition};
use crate::step::{StepKind, StepStatus};

/// Estado de un step en la instancia.
#[derive(Debug, Clone)]
pub struct StepSlot {
    pub step: StepKind,
    pub status: StepStatus,
    /// Intentos desde el último éxito (se reinicia en `StepFinished`).
    pub attempts: u32,
    pub total_attempts: u32,
    pub last_error: Option<StepError>,
    pub output: Option<serde_json::Value>,
    pub retry_fire_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepSlot {
    fn new(step: StepKind) -> Self {
        Self { step,
               status: StepStatus::Pending,
               attempts: 0,
               total_attempts: 0,
               last_error: None,
               output: None,
               retry_fire_at: None,
               started_at: None,
               finished_at: None }
    }

    /// Output tipado del último `StepFinished`.
    pub fn output_as<T: DeserializeOwned>(&self) -> Result<Option<T>, CoreEngineError> {
        self.output
            .as_ref()
            .map(|v| serde_json::from_value(v.clone()).map_err(|e| CoreEngineError::Decode(format!("{} output: {e}", self.step))))
            .transpose()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: Uuid,
    pub worker_id: String,
    pub completed: bool,
}

#[derive(Debug, Clone)]
pub struct RunInstance {
    pub id: Uuid,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub engine_version: Option<String>,
    pub state: RunState,
    /// Última sesión registrada.
    pub session: Option<SessionRecord>,
    pub steps: Vec<StepSlot>,
    pub signals: Vec<(StepKind, String)>,
    pub status: Option<RunStatus>,
}

impl RunInstance {
    pub fn empty(id: Uuid) -> Self {
        Self { id,
               scheduled_time: None,
               engine_version: None,
               state: RunState::Start,
               session: None,
               steps: StepKind::ALL.iter().map(|k| StepSlot::new(*k)).collect(),
               signals: Vec::new(),
               status: None }
    }

    pub fn slot(&self, step: StepKind) -> &StepSlot {
        &self.steps[step.index()]
    }

    fn slot_mut(&mut self, step: StepKind) -> &mut StepSlot {
        &mut self.steps[step.index()]
    }

    /// Hay `RunCompleted`.
    pub fn is_terminal(&self) -> bool {
        self.status.is_some()
    }

    pub fn is_initialized(&self) -> bool {
        self.scheduled_time.is_some()
    }

    fn apply(&mut self, ev: &RunEvent) -> Result<(), CoreEngineError> {
        if self.is_terminal() {
            return Err(CoreEngineError::Decode(format!("run {} has events after RunCompleted (seq={})", self.id, ev.seq)));
        }
        match &ev.kind {
            RunEventKind::RunInitialized { scheduled_time, engine_version } => {
                if self.is_initialized() {
                    return Err(CoreEngineError::Decode(format!("run {} initialized twice", self.id)));
                }
                self.scheduled_time = Some(*scheduled_time);
                self.engine_version = Some(engine_version.clone());
            }
            RunEventKind::SessionCreated { session_id, worker_id } => {
                self.state = self.state.on(Transition::SessionEstablished)?;
                self.session = Some(SessionRecord { id: *session_id,
                                                    worker_id: worker_id.clone(),
                                                    completed: false });
            }
            RunEventKind::StepStarted { step, attempt } => {
                let slot = self.slot_mut(*step);
                slot.status = StepStatus::Running;
                slot.attempts = *attempt;
                slot.total_attempts += 1;
                slot.retry_fire_at = None;
                slot.started_at = Some(ev.ts);
            }
            RunEventKind::StepFinished { step, output, .. } => {
                self.state = self.state.on(Transition::StepFinished(*step))?;
                let slot = self.slot_mut(*step);
                slot.status = StepStatus::FinishedOk;
                slot.attempts = 0;
                slot.last_error = None;
                slot.output = Some(output.clone());
                slot.finished_at = Some(ev.ts);
            }
            RunEventKind::StepFailed { step, error, .. } => {
                let slot = self.slot_mut(*step);
                slot.status = StepStatus::Failed;
                slot.last_error = Some(error.clone());
                slot.finished_at = Some(ev.ts);
            }
            RunEventKind::RetryScheduled { step, fire_at, .. } => {
                let slot = self.slot_mut(*step);
                slot.status = StepStatus::BackingOff;
                slot.retry_fire_at = Some(*fire_at);
            }
            RunEventKind::StepSignal { step, signal, .. } => self.signals.push((*step, signal.clone())),
            RunEventKind::SessionCompleted { session_id } => {
                if let Some(s) = self.session.as_mut().filter(|s| s.id == *session_id) {
                    s.completed = true;
                }
            }
            RunEventKind::RunCompleted { status } => {
                let t = match status {
                    RunStatus::Succeeded(RunOutcome::NoChange) => Transition::NoChange,
                    RunStatus::Succeeded(RunOutcome::Promoted { .. }) => Transition::Completed,
                    RunStatus::Failed { .. } => Transition::Failed,
                };
                self.state = self.state.on(t)?;
                self.status = Some(status.clone());
            }
        }
        Ok(())
    }
}

/// Reconstruye un `RunInstance` a partir de sus eventos.
pub fn replay(run_id: Uuid, events: &[RunEvent]) -> Result<RunInstance, CoreEngineError> {
    let mut inst = RunInstance::empty(run_id);
    for ev in events {
        inst.apply(ev)?;
    }
    Ok(inst)
}
