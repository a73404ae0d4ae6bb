//! Schedules recurrentes.
//!
//! Un schedule dispara un run cada `interval_secs` a partir de `next_fire`.
//! `claim_due` avanza el schedule de forma atómica y devuelve un único
//! disparo por schedule: si el worker estuvo caído varios intervalos, los
//! slots perdidos colapsan en el último vencido.
mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CoreEngineError;

pub use memory::InMemoryScheduleStore;

/// Namespace de los run ids derivados de un schedule.
const RUN_NAMESPACE: Uuid = Uuid::from_u128(0x5f0c_9a7e_41d2_4b8a_9c3e_7d21_a6b4_0e19);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub id: String,
    pub interval_secs: u64,
    pub next_fire: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledFire {
    pub schedule_id: String,
    pub scheduled_time: DateTime<Utc>,
    pub run_id: Uuid,
}

impl ScheduleSpec {
    pub fn new(id: impl Into<String>, interval: Duration, first_fire: DateTime<Utc>) -> Self {
        Self { id: id.into(),
               interval_secs: interval.as_secs().max(1),
               next_fire: first_fire }
    }

    /// Último slot vencido en `now` y el `next_fire` siguiente.
    pub fn due_slot(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        if now < self.next_fire {
            return None;
        }
        let step = i64::try_from(self.interval_secs.max(1)).unwrap_or(i64::MAX);
        let skipped = (now - self.next_fire).num_seconds() / step;
        let slot = self.next_fire + TimeDelta::seconds(skipped.saturating_mul(step));
        Some((slot, slot + TimeDelta::seconds(step)))
    }

    /// Avanza el schedule si está vencido y devuelve el disparo.
    pub fn claim(&mut self, now: DateTime<Utc>) -> Option<ScheduledFire> {
        let (slot, next) = self.due_slot(now)?;
        self.next_fire = next;
        Some(ScheduledFire { schedule_id: self.id.clone(),
                             scheduled_time: slot,
                             run_id: run_id_for(&self.id, slot) })
    }
}

/// Run id determinista: el mismo slot de un schedule siempre mapea al mismo
/// run, aunque dos workers lo reclamen.
pub fn run_id_for(schedule_id: &str, scheduled_time: DateTime<Utc>) -> Uuid {
    Uuid::new_v5(&RUN_NAMESPACE, format!("{schedule_id}/{}", scheduled_time.timestamp()).as_bytes())
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Crea o reemplaza el schedule.
    async fn upsert(&self, spec: ScheduleSpec) -> Result<(), CoreEngineError>;
    async fn get(&self, id: &str) -> Result<Option<ScheduleSpec>, CoreEngineError>;
    async fn list(&self) -> Result<Vec<ScheduleSpec>, CoreEngineError>;
    /// Reclama todos los schedules vencidos en `now`.
    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledFire>, CoreEngineError>;
}

#[async_trait]
impl<T: ScheduleStore + ?Sized> ScheduleStore for Arc<T> {
    async fn upsert(&self, spec: ScheduleSpec) -> Result<(), CoreEngineError> {
        (**self).upsert(spec).await
    }
    async fn get(&self, id: &str) -> Result<Option<ScheduleSpec>, CoreEngineError> {
        (**self).get(id).await
    }
    async fn list(&self) -> Result<Vec<ScheduleSpec>, CoreEngineError> {
        (**self).list().await
    }
    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledFire>, CoreEngineError> {
        (**self).claim_due(now).await
    }
}
