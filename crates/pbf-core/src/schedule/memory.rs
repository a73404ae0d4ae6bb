use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{ScheduleSpec, ScheduleStore, ScheduledFire};
use crate::errors::CoreEngineError;

#[derive(Debug, Default)]
pub struct InMemoryScheduleStore {
    inner: DashMap<String, ScheduleSpec>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn upsert(&self, spec: ScheduleSpec) -> Result<(), CoreEngineError> {
        self.inner.insert(spec.id.clone(), spec);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ScheduleSpec>, CoreEngineError> {
        Ok(self.inner.get(id).map(|s| s.clone()))
    }

    async fn list(&self) -> Result<Vec<ScheduleSpec>, CoreEngineError> {
        let mut all: Vec<ScheduleSpec> = self.inner.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledFire>, CoreEngineError> {
        let mut fires: Vec<ScheduledFire> = self.inner.iter_mut().filter_map(|mut e| e.value_mut().claim(now)).collect();
        fires.sort_by(|a, b| a.schedule_id.cmp(&b.schedule_id));
        Ok(fires)
    }
}
