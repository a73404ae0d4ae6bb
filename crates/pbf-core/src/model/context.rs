use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::engine::{Heartbeat, SessionInfo};
use crate::step::StepKind;

/// Contexto de ejecución entregado a cada intento de un step.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub run_id: Uuid,
    pub step: StepKind,
    /// Intento actual (1-based, continúa entre reinicios de worker).
    pub attempt: u32,
    pub max_attempts: u32,
    /// Fecha programada del run (no la de ejecución).
    pub scheduled_time: DateTime<Utc>,
    pub session: SessionInfo,
    pub heartbeat: Heartbeat,
}

impl StepContext {
    /// `true` cuando un fallo de este intento agota el presupuesto.
    pub fn is_final_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}
