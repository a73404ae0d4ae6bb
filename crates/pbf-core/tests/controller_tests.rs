mod support;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use pbf_core::{ChangeCheck, CoreEngineError, EventStore, InMemoryEventStore, RunEventKind, RunOutcome, RunState, RunStatus,
               StagedArtifact, StepError, StepKind, VersionTag};
use support::{controller, controller_as, controller_with_store, dir_is_empty, fast_options, Behavior, Scripted};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn variants(store: &InMemoryEventStore, run_id: Uuid) -> Vec<&'static str> {
    store.snapshot(run_id).iter().map(|e| e.kind.variant_name()).collect()
}

fn step_errors(store: &InMemoryEventStore, run_id: Uuid, step: StepKind) -> Vec<StepError> {
    store.snapshot(run_id)
         .into_iter()
         .filter_map(|e| match e.kind {
             RunEventKind::StepFailed { step: s, error, .. } if s == step => Some(error),
             _ => None,
         })
         .collect()
}

#[tokio::test]
async fn unchanged_remote_exits_after_check() {
    let staging = tempfile::tempdir().unwrap();
    let c = controller(Scripted::unchanged(), staging.path(), fast_options());
    let run_id = Uuid::new_v4();

    let outcome = c.run(run_id, Utc::now()).await.unwrap();

    assert_eq!(outcome, RunOutcome::NoChange);
    assert_eq!(c.activities().count(StepKind::CheckForChange), 1);
    assert_eq!(c.activities().count(StepKind::Fetch), 0);
    assert_eq!(c.activities().count(StepKind::Archive), 0);
    assert_eq!(c.activities().count(StepKind::Promote), 0);
    assert_eq!(variants(c.event_store(), run_id),
               vec!["RunInitialized", "SessionCreated", "StepStarted", "StepFinished", "SessionCompleted", "RunCompleted"]);
    assert_eq!(c.describe(run_id).await.unwrap().state, RunState::NoChangeExit);
}

#[tokio::test]
async fn changed_remote_runs_all_steps_in_order() {
    let staging = tempfile::tempdir().unwrap();
    let c = controller(Scripted::changed(), staging.path(), fast_options());
    let run_id = Uuid::new_v4();
    let scheduled = Utc.with_ymd_and_hms(2024, 6, 1, 3, 0, 0).unwrap();

    let outcome = c.run(run_id, scheduled).await.unwrap();

    assert_eq!(outcome,
               RunOutcome::Promoted { archived_key: "2024-06-01-region.osm.pbf".into(),
                                      version_tag: VersionTag::new("abc123") });
    let order: Vec<StepKind> = c.activities().calls.lock().unwrap().iter().map(|(s, _)| *s).collect();
    assert_eq!(order, StepKind::ALL.to_vec());
    let inst = c.describe(run_id).await.unwrap();
    assert_eq!(inst.state, RunState::Promoted);
    assert!(inst.session.unwrap().completed);
    assert!(dir_is_empty(staging.path()));
}

#[tokio::test]
async fn fetch_failures_within_budget_are_retried() {
    let staging = tempfile::tempdir().unwrap();
    let acts = Scripted::changed().script(StepKind::Fetch,
                                          vec![Behavior::Fail(StepError::Fetch("status 503".into())),
                                               Behavior::Fail(StepError::TransientNetwork("reset".into())),
                                               Behavior::Ok]);
    let c = controller(acts, staging.path(), fast_options());
    let run_id = Uuid::new_v4();

    let outcome = c.run(run_id, Utc::now()).await.unwrap();

    assert!(matches!(outcome, RunOutcome::Promoted { .. }));
    assert_eq!(c.activities().attempts_seen(StepKind::Fetch), vec![1, 2, 3]);
    let retries = c.event_store()
                   .snapshot(run_id)
                   .iter()
                   .filter(|e| matches!(e.kind, RunEventKind::RetryScheduled { step: StepKind::Fetch, .. }))
                   .count();
    assert_eq!(retries, 2);
    assert_eq!(c.describe(run_id).await.unwrap().slot(StepKind::Fetch).total_attempts, 3);
}

#[tokio::test]
async fn exhausted_promote_fails_the_run() {
    let staging = tempfile::tempdir().unwrap();
    let acts = Scripted::changed().script(StepKind::Promote, vec![Behavior::Fail(StepError::Promotion("copy rejected".into()))]);
    let c = controller(acts, staging.path(), fast_options());
    let run_id = Uuid::new_v4();

    let err = c.run(run_id, Utc::now()).await.unwrap_err();

    assert_eq!(err,
               CoreEngineError::StepExhausted { step: StepKind::Promote,
                                                attempts: 3,
                                                error: StepError::Promotion("copy rejected".into()) });
    let inst = c.describe(run_id).await.unwrap();
    assert_eq!(inst.state, RunState::Failed);
    assert!(matches!(inst.status, Some(RunStatus::Failed { .. })));
    assert!(dir_is_empty(staging.path()));
}

#[tokio::test]
async fn permanent_errors_skip_remaining_attempts() {
    let staging = tempfile::tempdir().unwrap();
    let acts = Scripted::changed().script(StepKind::Promote, vec![Behavior::Fail(StepError::InvalidInput("empty key".into()))]);
    let c = controller(acts, staging.path(), fast_options());

    let err = c.run(Uuid::new_v4(), Utc::now()).await.unwrap_err();

    assert!(matches!(err, CoreEngineError::StepExhausted { step: StepKind::Promote, attempts: 1, .. }));
    assert_eq!(c.activities().count(StepKind::Promote), 1);
}

#[tokio::test]
async fn completed_run_replays_without_side_effects() {
    let staging = tempfile::tempdir().unwrap();
    let c = controller(Scripted::changed(), staging.path(), fast_options());
    let run_id = Uuid::new_v4();
    let first = c.run(run_id, Utc::now()).await.unwrap();
    let events_before = c.event_store().snapshot(run_id).len();

    let second = c.run(run_id, Utc::now()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(c.event_store().snapshot(run_id).len(), events_before);
    assert_eq!(c.activities().count(StepKind::Fetch), 1);
}

#[tokio::test]
async fn stalled_heartbeat_triggers_retry() {
    let staging = tempfile::tempdir().unwrap();
    let mut options = fast_options();
    options.fetch.heartbeat_timeout = Some(Duration::from_millis(30));
    let acts = Scripted::changed().script(StepKind::Fetch, vec![Behavior::Hang(Duration::from_secs(5)), Behavior::Ok]);
    let c = controller(acts, staging.path(), options);
    let run_id = Uuid::new_v4();

    let outcome = c.run(run_id, Utc::now()).await.unwrap();

    assert!(matches!(outcome, RunOutcome::Promoted { .. }));
    assert_eq!(step_errors(c.event_store(), run_id, StepKind::Fetch),
               vec![StepError::HeartbeatTimeout { after_ms: 30 }]);
}

#[tokio::test]
async fn busy_step_with_heartbeats_is_not_stalled() {
    let staging = tempfile::tempdir().unwrap();
    let mut options = fast_options();
    options.archive.heartbeat_timeout = Some(Duration::from_millis(30));
    let acts = Scripted::changed().script(StepKind::Archive, vec![Behavior::Busy(Duration::from_millis(150))]);
    let c = controller(acts, staging.path(), options);
    let run_id = Uuid::new_v4();

    c.run(run_id, Utc::now()).await.unwrap();

    assert!(step_errors(c.event_store(), run_id, StepKind::Archive).is_empty());
}

#[tokio::test]
async fn start_to_close_timeout_triggers_retry() {
    let staging = tempfile::tempdir().unwrap();
    let mut options = fast_options();
    options.check.start_to_close = Duration::from_millis(30);
    let acts = Scripted::unchanged().script(StepKind::CheckForChange, vec![Behavior::Hang(Duration::from_secs(5)), Behavior::Ok]);
    let c = controller(acts, staging.path(), options);
    let run_id = Uuid::new_v4();

    assert_eq!(c.run(run_id, Utc::now()).await.unwrap(), RunOutcome::NoChange);
    assert_eq!(step_errors(c.event_store(), run_id, StepKind::CheckForChange),
               vec![StepError::Timeout { after_ms: 30 }]);
}

#[tokio::test]
async fn expired_session_fails_the_run_and_cleans_staging() {
    let staging = tempfile::tempdir().unwrap();
    let mut options = fast_options();
    options.session.execution_timeout = Duration::from_millis(60);
    let acts = Scripted::changed().script(StepKind::Fetch, vec![Behavior::Busy(Duration::from_secs(5))]);
    let c = controller(acts, staging.path(), options);
    let run_id = Uuid::new_v4();

    let err = c.run(run_id, Utc::now()).await.unwrap_err();

    assert_eq!(err, CoreEngineError::SessionExpired { after_ms: 60 });
    assert_eq!(c.describe(run_id).await.unwrap().state, RunState::Failed);
    assert!(dir_is_empty(staging.path()));
}

#[tokio::test]
async fn unavailable_session_fails_the_run() {
    let staging = tempfile::tempdir().unwrap();
    let mut options = fast_options();
    options.session.creation_timeout = Duration::from_millis(30);
    let c = support::controller(Scripted::changed(), staging.path(), options);
    let sessions: Vec<_> = futures::future::try_join_all((0..pbf_core::engine::DEFAULT_MAX_SESSIONS).map(|_| c.sessions().create(Uuid::new_v4())))
        .await
        .unwrap();
    let run_id = Uuid::new_v4();

    let err = c.run(run_id, Utc::now()).await.unwrap_err();

    assert_eq!(err, CoreEngineError::SessionUnavailable { timeout_ms: 30 });
    assert_eq!(c.describe(run_id).await.unwrap().state, RunState::Failed);
    assert_eq!(c.activities().count(StepKind::CheckForChange), 0);
    drop(sessions);
}

#[tokio::test]
async fn version_drift_is_recorded_and_fetch_tag_wins() {
    let staging = tempfile::tempdir().unwrap();
    let acts = Scripted::changed().with_fetch_tag("abc124");
    let c = controller(acts, staging.path(), fast_options());
    let run_id = Uuid::new_v4();

    let outcome = c.run(run_id, Utc::now()).await.unwrap();

    assert!(matches!(outcome, RunOutcome::Promoted { ref version_tag, .. } if version_tag.as_str() == "abc124"));
    let inst = c.describe(run_id).await.unwrap();
    assert_eq!(inst.signals, vec![(StepKind::Fetch, "version_drift".to_string())]);
}

#[tokio::test]
async fn cancelled_run_stays_open_and_resumes() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryEventStore::new());
    let acts = Scripted::changed().script(StepKind::Fetch, vec![Behavior::Busy(Duration::from_secs(5))]);
    let first = controller_with_store(Arc::clone(&store), acts, staging.path(), fast_options());
    let run_id = Uuid::new_v4();
    let token = CancellationToken::new();

    let cancel = async {
        tokio::time::sleep(Duration::from_millis(80)).await;
        token.cancel();
    };
    let (res, _) = tokio::join!(first.run_with_cancel(run_id, Utc::now(), &token), cancel);

    assert_eq!(res.unwrap_err(), CoreEngineError::Cancelled);
    assert_eq!(store.open_runs().await.unwrap(), vec![run_id]);
    assert!(!variants(&store, run_id).contains(&"RunCompleted"));
    assert!(dir_is_empty(staging.path()));

    let second = controller_with_store(Arc::clone(&store), Scripted::changed(), staging.path(), fast_options());
    let outcome = second.resume(run_id, &CancellationToken::new()).await.unwrap();

    assert!(matches!(outcome, RunOutcome::Promoted { .. }));
    assert_eq!(second.activities().count(StepKind::CheckForChange), 0);
    assert_eq!(second.activities().attempts_seen(StepKind::Fetch), vec![2]);
    assert_eq!(step_errors(&store, run_id, StepKind::Fetch), vec![StepError::Abandoned]);
    assert!(store.open_runs().await.unwrap().is_empty());
}

#[tokio::test]
async fn resume_refetches_when_staged_file_belongs_to_dead_session() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryEventStore::new());
    let run_id = Uuid::new_v4();
    let scheduled = Utc.with_ymd_and_hms(2024, 6, 1, 3, 0, 0).unwrap();
    let old_session = Uuid::new_v4();
    let check = ChangeCheck::compare("abc123".into(), None);
    let staged = StagedArtifact { path: "/gone/region-latest.x.osm.pbf".into(),
                                  version_tag: "abc123".into(),
                                  session_id: old_session,
                                  size_bytes: 9,
                                  digest: "d".into() };
    for kind in [RunEventKind::RunInitialized { scheduled_time: scheduled,
                                                engine_version: "P1.0".into() },
                 RunEventKind::SessionCreated { session_id: old_session,
                                                worker_id: "dead-worker".into() },
                 RunEventKind::StepStarted { step: StepKind::CheckForChange, attempt: 1 },
                 RunEventKind::StepFinished { step: StepKind::CheckForChange,
                                              attempt: 1,
                                              output: serde_json::to_value(&check).unwrap() },
                 RunEventKind::StepStarted { step: StepKind::Fetch, attempt: 1 },
                 RunEventKind::StepFinished { step: StepKind::Fetch,
                                              attempt: 1,
                                              output: serde_json::to_value(&staged).unwrap() },
                 RunEventKind::StepStarted { step: StepKind::Archive, attempt: 1 }]
    {
        store.append_kind(run_id, kind).await.unwrap();
    }
    let c = controller_with_store(Arc::clone(&store), Scripted::changed(), staging.path(), fast_options());

    // La fecha pasada se ignora: gana la registrada.
    let outcome = c.run(run_id, Utc::now()).await.unwrap();

    assert_eq!(outcome,
               RunOutcome::Promoted { archived_key: "2024-06-01-region.osm.pbf".into(),
                                      version_tag: "abc123".into() });
    assert_eq!(c.activities().count(StepKind::CheckForChange), 0);
    assert_eq!(c.activities().count(StepKind::Fetch), 1);
    assert_eq!(c.activities().attempts_seen(StepKind::Archive), vec![2]);
    assert_eq!(step_errors(&store, run_id, StepKind::Archive), vec![StepError::Abandoned]);
}

#[tokio::test]
async fn pending_retry_timer_is_honored_on_resume() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryEventStore::new());
    let run_id = Uuid::new_v4();
    let fire_at = Utc::now() + chrono::Duration::milliseconds(120);
    for kind in [RunEventKind::RunInitialized { scheduled_time: Utc::now(),
                                                engine_version: "P1.0".into() },
                 RunEventKind::SessionCreated { session_id: Uuid::new_v4(),
                                                worker_id: "dead-worker".into() },
                 RunEventKind::StepStarted { step: StepKind::CheckForChange, attempt: 1 },
                 RunEventKind::StepFailed { step: StepKind::CheckForChange,
                                            attempt: 1,
                                            error: StepError::TransientNetwork("reset".into()) },
                 RunEventKind::RetryScheduled { step: StepKind::CheckForChange,
                                                next_attempt: 2,
                                                fire_at }]
    {
        store.append_kind(run_id, kind).await.unwrap();
    }
    let c = controller_with_store(Arc::clone(&store), Scripted::unchanged(), staging.path(), fast_options());
    let started = Instant::now();

    assert_eq!(c.run(run_id, Utc::now()).await.unwrap(), RunOutcome::NoChange);

    assert!(started.elapsed() >= Duration::from_millis(80));
    assert_eq!(c.activities().attempts_seen(StepKind::CheckForChange), vec![2]);
}

#[tokio::test]
async fn second_worker_does_not_drive_a_leased_run() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryEventStore::new());
    let acts = Scripted::changed().script(StepKind::Fetch, vec![Behavior::Busy(Duration::from_millis(200))]);
    let first = controller_as("worker-a", Arc::clone(&store), acts, staging.path(), fast_options());
    let second = controller_as("worker-b", Arc::clone(&store), Scripted::changed(), staging.path(), fast_options());
    let run_id = Uuid::new_v4();

    let contender = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        second.resume(run_id, &CancellationToken::new()).await
    };
    let (owner, skipped) = tokio::join!(first.run(run_id, Utc::now()), contender);

    assert!(matches!(owner.unwrap(), RunOutcome::Promoted { .. }));
    assert_eq!(skipped.unwrap_err(), CoreEngineError::RunLeased { run_id });
    for step in StepKind::ALL {
        assert_eq!(second.activities().count(step), 0);
    }
    assert_eq!(first.activities().count(StepKind::Fetch), 1);
    assert_eq!(variants(&store, run_id).iter().filter(|v| **v == "SessionCreated").count(), 1);

    // Terminado el run, el lease queda libre y el replay no ejecuta nada.
    assert!(matches!(second.resume(run_id, &CancellationToken::new()).await.unwrap(), RunOutcome::Promoted { .. }));
    assert_eq!(second.activities().count(StepKind::CheckForChange), 0);
}

#[tokio::test]
async fn expired_lease_of_a_dead_worker_is_taken_over() {
    let staging = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryEventStore::new());
    let run_id = Uuid::new_v4();
    store.append_kind(run_id,
                      RunEventKind::RunInitialized { scheduled_time: Utc::now(),
                                                     engine_version: "P1.0".into() })
         .await
         .unwrap();
    assert!(store.acquire_lease(run_id, "dead-worker", Duration::from_millis(60)).await.unwrap());
    let c = controller_with_store(Arc::clone(&store), Scripted::unchanged(), staging.path(), fast_options());

    assert_eq!(c.resume(run_id, &CancellationToken::new()).await.unwrap_err(),
               CoreEngineError::RunLeased { run_id });
    assert_eq!(c.activities().count(StepKind::CheckForChange), 0);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(c.resume(run_id, &CancellationToken::new()).await.unwrap(), RunOutcome::NoChange);
    assert!(store.acquire_lease(run_id, "another-worker", Duration::from_secs(30)).await.unwrap());
}
