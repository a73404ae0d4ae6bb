use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::{RunEvent, RunEventKind};
use crate::errors::CoreEngineError;

/// Almacenamiento de eventos append-only.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Agrega un evento a partir de su kind y devuelve el evento completo (con seq y ts).
    async fn append_kind(&self, run_id: Uuid, kind: RunEventKind) -> Result<RunEvent, CoreEngineError>;
    /// Lista eventos de un run (orden ascendente por seq).
    async fn list(&self, run_id: Uuid) -> Result<Vec<RunEvent>, CoreEngineError>;
    /// Runs con `RunInitialized` y sin `RunCompleted`.
    async fn open_runs(&self) -> Result<Vec<Uuid>, CoreEngineError>;
    /// Toma o renueva el lease del run para `owner` durante `ttl`. Devuelve
    /// `false` si otro owner tiene un lease vigente.
    async fn acquire_lease(&self, run_id: Uuid, owner: &str, ttl: Duration) -> Result<bool, CoreEngineError>;
    /// Suelta el lease si sigue siendo de `owner`.
    async fn release_lease(&self, run_id: Uuid, owner: &str) -> Result<(), CoreEngineError>;
}

#[async_trait]
impl<T: EventStore + ?Sized> EventStore for Arc<T> {
    async fn append_kind(&self, run_id: Uuid, kind: RunEventKind) -> Result<RunEvent, CoreEngineError> {
        (**self).append_kind(run_id, kind).await
    }
    async fn list(&self, run_id: Uuid) -> Result<Vec<RunEvent>, CoreEngineError> {
        (**self).list(run_id).await
    }
    async fn open_runs(&self) -> Result<Vec<Uuid>, CoreEngineError> {
        (**self).open_runs().await
    }
    async fn acquire_lease(&self, run_id: Uuid, owner: &str, ttl: Duration) -> Result<bool, CoreEngineError> {
        (**self).acquire_lease(run_id, owner, ttl).await
    }
    async fn release_lease(&self, run_id: Uuid, owner: &str) -> Result<(), CoreEngineError> {
        (**self).release_lease(run_id, owner).await
    }
}

#[derive(Default)]
pub struct InMemoryEventStore {
    inner: DashMap<Uuid, Vec<RunEvent>>,
    leases: DashMap<Uuid, (String, DateTime<Utc>)>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copia síncrona de los eventos de un run (tests / inspección).
    pub fn snapshot(&self, run_id: Uuid) -> Vec<RunEvent> {
        self.inner.get(&run_id).map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_kind(&self, run_id: Uuid, kind: RunEventKind) -> Result<RunEvent, CoreEngineError> {
        let mut events = self.inner.entry(run_id).or_default();
        if events.last().is_some_and(|e| e.kind.is_terminal()) {
            return Err(CoreEngineError::Persistence(format!("run {run_id} already completed")));
        }
        let ev = RunEvent { seq: events.len() as u64,
                            run_id,
                            kind,
                            ts: Utc::now() };
        events.push(ev.clone());
        Ok(ev)
    }

    async fn list(&self, run_id: Uuid) -> Result<Vec<RunEvent>, CoreEngineError> {
        Ok(self.snapshot(run_id))
    }

    async fn open_runs(&self) -> Result<Vec<Uuid>, CoreEngineError> {
        let mut open: Vec<Uuid> = self.inner
                                      .iter()
                                      .filter(|e| {
                                          let evs = e.value();
                                          evs.first().is_some_and(|f| matches!(f.kind, RunEventKind::RunInitialized { .. }))
                                          && !evs.iter().any(|x| x.kind.is_terminal())
                                      })
                                      .map(|e| *e.key())
                                      .collect();
        open.sort();
        Ok(open)
    }

    async fn acquire_lease(&self, run_id: Uuid, owner: &str, ttl: Duration) -> Result<bool, CoreEngineError> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| CoreEngineError::Internal(format!("lease ttl: {e}")))?;
        let mut lease = self.leases.entry(run_id).or_insert_with(|| (owner.to_string(), now));
        let (holder, expires_at) = lease.value_mut();
        if holder.as_str() != owner && *expires_at > now {
            return Ok(false);
        }
        *holder = owner.to_string();
        *expires_at = now + ttl;
        Ok(true)
    }

    async fn release_lease(&self, run_id: Uuid, owner: &str) -> Result<(), CoreEngineError> {
        self.leases.remove_if(&run_id, |_, (holder, _)| holder == owner);
        Ok(())
    }
}
