//! Tipos de evento del run y estructura `RunEvent`.
//!
//! Rol en el flujo:
//! - El `WorkflowController` y el `StepExecutor` emiten eventos a un
//!   `EventStore` append-only antes de avanzar.
//! - Estos eventos permiten reconstruir el `RunInstance` (replay) tras un
//!   reinicio del worker.
//! - El enum `RunEventKind` es el contrato persistido; agregar variantes es
//!   compatible, renombrarlas no.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::StepError;
use crate::model::RunStatus;
use crate::step::StepKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunEventKind {
    /// Primer evento de un `run_id`.
    RunInitialized { scheduled_time: DateTime<Utc>, engine_version: String },
    /// Se obtuvo una sesión (staging local) en un worker.
    SessionCreated { session_id: Uuid, worker_id: String },
    /// Comienza un intento. `attempt` es 1-based.
    StepStarted { step: StepKind, attempt: u32 },
    /// El intento terminó bien; `output` es el resultado serializado.
    StepFinished { step: StepKind, attempt: u32, output: serde_json::Value },
    /// El intento falló (puede haber reintento).
    StepFailed { step: StepKind, attempt: u32, error: StepError },
    /// Reintento agendado; `fire_at` se respeta al reanudar.
    RetryScheduled { step: StepKind, next_attempt: u32, fire_at: DateTime<Utc> },
    /// Hito ligero que no altera el estado.
    StepSignal { step: StepKind, signal: String, data: serde_json::Value },
    /// El staging de la sesión fue liberado.
    SessionCompleted { session_id: Uuid },
    /// Cierre del run. No se agregan eventos después.
    RunCompleted { status: RunStatus },
}

impl RunEventKind {
    pub fn variant_name(&self) -> &'static str {
        match self {
            RunEventKind::RunInitialized { .. } => "RunInitialized",
            RunEventKind::SessionCreated { .. } => "SessionCreated",
            RunEventKind::StepStarted { .. } => "StepStarted",
            RunEventKind::StepFinished { .. } => "StepFinished",
            RunEventKind::StepFailed { .. } => "StepFailed",
            RunEventKind::RetryScheduled { .. } => "RetryScheduled",
            RunEventKind::StepSignal { .. } => "StepSignal",
            RunEventKind::SessionCompleted { .. } => "SessionCompleted",
            RunEventKind::RunCompleted { .. } => "RunCompleted",
        }
    }

    /// Nombre usado en la columna `event_type` del store persistente.
    pub fn event_type(&self) -> &'static str {
        match self {
            RunEventKind::RunInitialized { .. } => "runinitialized",
            RunEventKind::SessionCreated { .. } => "sessioncreated",
            RunEventKind::StepStarted { .. } => "stepstarted",
            RunEventKind::StepFinished { .. } => "stepfinished",
            RunEventKind::StepFailed { .. } => "stepfailed",
            RunEventKind::RetryScheduled { .. } => "retryscheduled",
            RunEventKind::StepSignal { .. } => "stepsignal",
            RunEventKind::SessionCompleted { .. } => "sessioncompleted",
            RunEventKind::RunCompleted { .. } => "runcompleted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEventKind::RunCompleted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub seq: u64, // asignado por el store (orden append, por run)
    pub run_id: Uuid,
    pub kind: RunEventKind,
    pub ts: DateTime<Utc>,
}
