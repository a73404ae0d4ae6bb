use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use log::{debug, info};
use pbf_core::{CoreEngineError, ScheduleSpec, ScheduleStore, ScheduledFire};

use super::{blocking, ConnectionProvider};
use crate::error::PersistenceError;
use crate::schema::schedules;

#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = schedules)]
pub struct ScheduleRow {
    pub schedule_id: String,
    pub interval_secs: i64,
    pub next_fire: DateTime<Utc>,
}

impl TryFrom<ScheduleRow> for ScheduleSpec {
    type Error = PersistenceError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        let interval_secs = u64::try_from(row.interval_secs).map_err(|_| {
                                                                 PersistenceError::Codec(format!("schedule {} has interval {}",
                                                                                                 row.schedule_id, row.interval_secs))
                                                             })?;
        Ok(ScheduleSpec { id: row.schedule_id,
                          interval_secs,
                          next_fire: row.next_fire })
    }
}

impl TryFrom<&ScheduleSpec> for ScheduleRow {
    type Error = PersistenceError;

    fn try_from(spec: &ScheduleSpec) -> Result<Self, Self::Error> {
        let interval_secs = i64::try_from(spec.interval_secs).map_err(|_| PersistenceError::Codec(format!("interval {} out of range", spec.interval_secs)))?;
        Ok(ScheduleRow { schedule_id: spec.id.clone(),
                         interval_secs,
                         next_fire: spec.next_fire })
    }
}

/// `ScheduleStore` sobre Postgres.
#[derive(Clone)]
pub struct PgScheduleStore<P: ConnectionProvider> {
    provider: P,
}

impl<P: ConnectionProvider> PgScheduleStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

/// Bloquea los schedules vencidos, los avanza y devuelve un disparo por cada uno.
fn claim_due_rows(conn: &mut PgConnection, now: DateTime<Utc>) -> Result<Vec<ScheduledFire>, PersistenceError> {
    conn.build_transaction().read_write().run(|tx| {
                                             let due: Vec<ScheduleRow> = schedules::table.filter(schedules::next_fire.le(now))
                                                                                         .order(schedules::schedule_id.asc())
                                                                                         .for_update()
                                                                                         .load(tx)?;
                                             let mut fires = Vec::with_capacity(due.len());
                                             for row in due {
                                                 let mut spec = ScheduleSpec::try_from(row)?;
                                                 if let Some(fire) = spec.claim(now) {
                                                     diesel::update(schedules::table.find(&spec.id)).set(schedules::next_fire.eq(spec.next_fire))
                                                                                                    .execute(tx)?;
                                                     fires.push(fire);
                                                 }
                                             }
                                             Ok(fires)
                                         })
}

#[async_trait]
impl<P: ConnectionProvider> ScheduleStore for PgScheduleStore<P> {
    async fn upsert(&self, spec: ScheduleSpec) -> Result<(), CoreEngineError> {
        let row = ScheduleRow::try_from(&spec)?;
        blocking(&self.provider, "schedule_upsert", move |conn| {
            diesel::insert_into(schedules::table).values(&row)
                                                 .on_conflict(schedules::schedule_id)
                                                 .do_update()
                                                 .set((schedules::interval_secs.eq(excluded(schedules::interval_secs)),
                                                       schedules::next_fire.eq(excluded(schedules::next_fire))))
                                                 .execute(conn)
                                                 .map_err(PersistenceError::from)
        }).await?;
        info!("schedule_upsert:done id={} interval_secs={} next_fire={}", spec.id, spec.interval_secs, spec.next_fire);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ScheduleSpec>, CoreEngineError> {
        let id = id.to_string();
        let row: Option<ScheduleRow> = blocking(&self.provider, "schedule_get", move |conn| {
                                           schedules::table.find(&id)
                                                           .first(conn)
                                                           .optional()
                                                           .map_err(PersistenceError::from)
                                       }).await?;
        Ok(row.map(ScheduleSpec::try_from).transpose()?)
    }

    async fn list(&self) -> Result<Vec<ScheduleSpec>, CoreEngineError> {
        let rows: Vec<ScheduleRow> = blocking(&self.provider, "schedule_list", |conn| {
                                         schedules::table.order(schedules::schedule_id.asc())
                                                         .load(conn)
                                                         .map_err(PersistenceError::from)
                                     }).await?;
        Ok(rows.into_iter()
               .map(ScheduleSpec::try_from)
               .collect::<Result<Vec<_>, _>>()?)
    }

    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledFire>, CoreEngineError> {
        let fires = blocking(&self.provider, "claim_due", move |conn| claim_due_rows(conn, now)).await?;
        debug!("claim_due:done now={now} fired={}", fires.len());
        Ok(fires)
    }
}
