
use std::time::Duration;

use chrono::{TimeDelta, TimeZone, Utc};
use pbf_core::{run_id_for, ScheduleSpec, ScheduleStore};
use pbf_persistence::PgScheduleStore;
use uuid::Uuid;

fn unique_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

#[tokio::test]
async fn upsert_then_get_roundtrips_and_overwrites() {
    let Some(provider) = test_support::provider() else {
        eprintln!("skip upsert_then_get_roundtrips_and_overwrites (no DATABASE_URL)");
        return;
    };
    let store = PgScheduleStore::new(provider);
    let id = unique_id("upsert");
    let first = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    store.upsert(ScheduleSpec::new(&id, Duration::from_secs(86_400), first))
         .await
         .expect("upsert");
    store.upsert(ScheduleSpec::new(&id, Duration::from_secs(3_600), first))
         .await
         .expect("upsert again");
    let got = store.get(&id).await.expect("get").expect("present");
    assert_eq!(got.interval_secs, 3_600);
    assert_eq!(got.next_fire, first);
    assert!(store.get(&unique_id("missing")).await.expect("get").is_none());
}

#[tokio::test]
async fn claim_due_fires_once_per_slot() {
    let Some(provider) = test_support::provider() else {
        eprintln!("skip claim_due_fires_once_per_slot (no DATABASE_URL)");
        return;
    };
    let store = PgScheduleStore::new(provider);
    let id = unique_id("claim");
    // Muy en el pasado para no competir con schedules de otros tests.
    let first = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
    store.upsert(ScheduleSpec::new(&id, Duration::from_secs(3_600), first))
         .await
         .expect("upsert");

    let now = first + TimeDelta::minutes(150);
    let fires = store.claim_due(now).await.expect("claim");
    let mine: Vec<_> = fires.into_iter().filter(|f| f.schedule_id == id).collect();
    assert_eq!(mine.len(), 1);
    let expected_slot = first + TimeDelta::hours(2);
    assert_eq!(mine[0].scheduled_time, expected_slot);
    assert_eq!(mine[0].run_id, run_id_for(&id, expected_slot));

    let again = store.claim_due(now).await.expect("claim again");
    assert!(again.iter().all(|f| f.schedule_id != id));
    let spec = store.get(&id).await.expect("get").expect("present");
    assert_eq!(spec.next_fire, first + TimeDelta::hours(3));
}
