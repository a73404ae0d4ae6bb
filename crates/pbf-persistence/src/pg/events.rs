use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types;
use log::{debug, error};
use pbf_core::{CoreEngineError, EventStore, RunEvent, RunEventKind};
use serde_json::Value;
use uuid::Uuid;

use super::{blocking, ConnectionProvider};
use crate::error::PersistenceError;
use crate::schema::{run_events, run_leases};

const TERMINAL_EVENT_TYPE: &str = "runcompleted";

/// Fila de `run_events` (orden de columnas del esquema).
///
/// - `event_type`: nombre en minúsculas de la variante, validado por CHECK.
/// - `payload`: JSONB con el enum `RunEventKind` completo.
#[derive(Queryable, Debug)]
pub struct EventRow {
    pub run_id: Uuid,
    pub seq: i64,
    pub ts: DateTime<Utc>,
    pub event_type: String,
    pub payload: Value,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = run_events)]
struct NewEventRow<'a> {
    run_id: Uuid,
    seq: i64,
    event_type: &'a str,
    payload: &'a Value,
}

#[derive(QueryableByName, Debug)]
struct OpenRunRow {
    #[diesel(sql_type = sql_types::Uuid)]
    run_id: Uuid,
}

impl TryFrom<EventRow> for RunEvent {
    type Error = PersistenceError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let kind: RunEventKind = serde_json::from_value(row.payload)?;
        let seq = u64::try_from(row.seq).map_err(|_| PersistenceError::Codec(format!("negative seq {}", row.seq)))?;
        Ok(RunEvent { seq,
                      run_id: row.run_id,
                      kind,
                      ts: row.ts })
    }
}

/// `EventStore` sobre Postgres.
#[derive(Clone)]
pub struct PgEventStore<P: ConnectionProvider> {
    provider: P,
}

impl<P: ConnectionProvider> PgEventStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

/// Inserta el evento con el siguiente `seq` del run dentro de una transacción.
fn insert_event(conn: &mut PgConnection, run_id: Uuid, event_type: &str, payload: &Value) -> Result<(i64, DateTime<Utc>), PersistenceError> {
    conn.build_transaction().read_write().run(|tx| {
                                             let last: Option<(i64, String)> =
                                                 run_events::table.filter(run_events::run_id.eq(run_id))
                                                                  .order(run_events::seq.desc())
                                                                  .select((run_events::seq, run_events::event_type))
                                                                  .first(tx)
                                                                  .optional()?;
                                             if last.as_ref().is_some_and(|(_, t)| t == TERMINAL_EVENT_TYPE) {
                                                 return Err(PersistenceError::RunClosed(run_id));
                                             }
                                             let seq = last.map_or(0, |(s, _)| s + 1);
                                             let ts = diesel::insert_into(run_events::table)
                                                 .values(NewEventRow { run_id, seq, event_type, payload })
                                                 .returning(run_events::ts)
                                                 .get_result(tx)
                                                 .map_err(|e| match PersistenceError::from(e) {
                                                     // Otro writer tomó el mismo seq: se reintenta con el siguiente.
                                                     PersistenceError::UniqueViolation(_) => PersistenceError::SerializationConflict,
                                                     other => other,
                                                 })?;
                                             Ok((seq, ts))
                                         })
}

/// Upsert condicionado: la fila cambia solo si el lease es del mismo owner o
/// ya venció. Con 0 filas afectadas el lease es de otro.
const ACQUIRE_LEASE_SQL: &str = "INSERT INTO run_leases (run_id, owner, expires_at) \
                                 VALUES ($1, $2, now() + $3::float8 * interval '1 millisecond') \
                                 ON CONFLICT (run_id) DO UPDATE \
                                 SET owner = EXCLUDED.owner, expires_at = EXCLUDED.expires_at \
                                 WHERE run_leases.owner = EXCLUDED.owner OR run_leases.expires_at <= now()";

#[async_trait]
impl<P: ConnectionProvider> EventStore for PgEventStore<P> {
    async fn append_kind(&self, run_id: Uuid, kind: RunEventKind) -> Result<RunEvent, CoreEngineError> {
        debug!("append_kind:start run_id={run_id} kind={}", kind.variant_name());
        let event_type = kind.event_type();
        let payload = serde_json::to_value(&kind).map_err(PersistenceError::from)?;
        let inserted = blocking(&self.provider, "append_kind", move |conn| insert_event(conn, run_id, event_type, &payload)).await;
        let (seq, ts) = inserted.map_err(|e| {
                                    error!("append_kind:error run_id={run_id} err={e}");
                                    e
                                })?;
        let ev = RunEvent { seq: u64::try_from(seq).unwrap_or_default(),
                            run_id,
                            kind,
                            ts };
        debug!("append_kind:done run_id={run_id} seq={} kind={}", ev.seq, ev.kind.variant_name());
        Ok(ev)
    }

    async fn list(&self, run_id: Uuid) -> Result<Vec<RunEvent>, CoreEngineError> {
        debug!("list:start run_id={run_id}");
        let rows: Vec<EventRow> = blocking(&self.provider, "list", move |conn| {
                                      run_events::table.filter(run_events::run_id.eq(run_id))
                                                       .order(run_events::seq.asc())
                                                       .load(conn)
                                                       .map_err(PersistenceError::from)
                                  }).await?;
        let events = rows.into_iter()
                         .map(RunEvent::try_from)
                         .collect::<Result<Vec<_>, _>>()?;
        debug!("list:done run_id={run_id} count={}", events.len());
        Ok(events)
    }

    async fn open_runs(&self) -> Result<Vec<Uuid>, CoreEngineError> {
        let rows: Vec<OpenRunRow> = blocking(&self.provider, "open_runs", |conn| {
                                        diesel::sql_query("SELECT DISTINCT r.run_id FROM run_events r \
                                                           WHERE r.event_type = 'runinitialized' \
                                                           AND NOT EXISTS (SELECT 1 FROM run_events c \
                                                                           WHERE c.run_id = r.run_id AND c.event_type = 'runcompleted') \
                                                           ORDER BY r.run_id").load(conn)
                                                                              .map_err(PersistenceError::from)
                                    }).await?;
        debug!("open_runs:done count={}", rows.len());
        Ok(rows.into_iter().map(|r| r.run_id).collect())
    }

    async fn acquire_lease(&self, run_id: Uuid, owner: &str, ttl: Duration) -> Result<bool, CoreEngineError> {
        let owner = owner.to_string();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let affected = blocking(&self.provider, "acquire_lease", {
                           let owner = owner.clone();
                           move |conn| {
                               diesel::sql_query(ACQUIRE_LEASE_SQL).bind::<sql_types::Uuid, _>(run_id)
                                                                   .bind::<sql_types::Text, _>(owner.as_str())
                                                                   .bind::<sql_types::BigInt, _>(ttl_ms)
                                                                   .execute(conn)
                                                                   .map_err(PersistenceError::from)
                           }
                       }).await?;
        debug!("acquire_lease:done run_id={run_id} owner={owner} acquired={}", affected == 1);
        Ok(affected == 1)
    }

    async fn release_lease(&self, run_id: Uuid, owner: &str) -> Result<(), CoreEngineError> {
        let owner = owner.to_string();
        blocking(&self.provider, "release_lease", move |conn| {
            let held = run_leases::table.filter(run_leases::run_id.eq(run_id))
                                        .filter(run_leases::owner.eq(owner.as_str()));
            diesel::delete(held).execute(conn).map_err(PersistenceError::from)
        }).await?;
        debug!("release_lease:done run_id={run_id}");
        Ok(())
    }
}
