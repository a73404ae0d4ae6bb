#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pbf_core::model::dated_key;
use pbf_core::{Activities, ArchivedArtifact, ChangeCheck, ControllerBuilder, InMemoryEventStore, RetryPolicy, StagedArtifact,
               StepContext, StepError, StepKind, VersionTag, WorkflowController, WorkflowOptions};

pub const POINTER_KEY: &str = "region-latest.osm.pbf";

/// Comportamiento de un step en un intento dado.
#[derive(Debug, Clone)]
pub enum Behavior {
    Ok,
    Fail(StepError),
    /// Duerme sin latir.
    Hang(Duration),
    /// Duerme latiendo cada 5ms.
    Busy(Duration),
}

/// Activities guionadas: para cada step, una lista de comportamientos por
/// intento global (el último se repite).
pub struct Scripted {
    pub changed: bool,
    pub remote_tag: String,
    pub fetch_tag: String,
    scripts: Mutex<Vec<(StepKind, Vec<Behavior>)>>,
    counts: [AtomicU32; 4],
    pub calls: Mutex<Vec<(StepKind, u32)>>,
}

impl Scripted {
    pub fn changed() -> Self {
        Self { changed: true,
               remote_tag: "abc123".into(),
               fetch_tag: "abc123".into(),
               scripts: Mutex::new(Vec::new()),
               counts: Default::default(),
               calls: Mutex::new(Vec::new()) }
    }

    pub fn unchanged() -> Self {
        Self { changed: false, ..Self::changed() }
    }

    pub fn with_fetch_tag(mut self, tag: &str) -> Self {
        self.fetch_tag = tag.to_string();
        self
    }

    pub fn script(self, step: StepKind, behaviors: Vec<Behavior>) -> Self {
        self.scripts.lock().unwrap().push((step, behaviors));
        self
    }

    pub fn count(&self, step: StepKind) -> u32 {
        self.counts[step.index()].load(Ordering::SeqCst)
    }

    pub fn attempts_seen(&self, step: StepKind) -> Vec<u32> {
        self.calls.lock().unwrap().iter().filter(|(s, _)| *s == step).map(|(_, a)| *a).collect()
    }

    async fn behave(&self, ctx: &StepContext) -> Result<(), StepError> {
        let n = self.counts[ctx.step.index()].fetch_add(1, Ordering::SeqCst) as usize;
        self.calls.lock().unwrap().push((ctx.step, ctx.attempt));
        let behavior = {
            let scripts = self.scripts.lock().unwrap();
            scripts.iter()
                   .find(|(s, _)| *s == ctx.step)
                   .and_then(|(_, b)| b.get(n).or_else(|| b.last()).cloned())
                   .unwrap_or(Behavior::Ok)
        };
        match behavior {
            Behavior::Ok => Ok(()),
            Behavior::Fail(e) => Err(e),
            Behavior::Hang(d) => {
                tokio::time::sleep(d).await;
                Ok(())
            }
            Behavior::Busy(d) => {
                ctx.heartbeat.keep_alive(Duration::from_millis(5), tokio::time::sleep(d)).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Activities for Scripted {
    async fn check_for_change(&self, ctx: &StepContext) -> Result<ChangeCheck, StepError> {
        self.behave(ctx).await?;
        let stored = if self.changed { None } else { Some(VersionTag::new(self.remote_tag.clone())) };
        Ok(ChangeCheck::compare(VersionTag::new(self.remote_tag.clone()), stored))
    }

    async fn fetch(&self, ctx: &StepContext) -> Result<StagedArtifact, StepError> {
        self.behave(ctx).await?;
        let path = ctx.session.staging_dir.join(format!("fetch-{}.osm.pbf", ctx.attempt));
        tokio::fs::write(&path, b"pbf-bytes").await.map_err(|e| StepError::Fetch(e.to_string()))?;
        Ok(StagedArtifact { path,
                            version_tag: VersionTag::new(self.fetch_tag.clone()),
                            session_id: ctx.session.id,
                            size_bytes: 9,
                            digest: pbf_core::hashing::hash_bytes(b"pbf-bytes") })
    }

    async fn archive(&self, ctx: &StepContext, staged: &StagedArtifact) -> Result<ArchivedArtifact, StepError> {
        if staged.session_id != ctx.session.id {
            return Err(StepError::SessionMismatch { expected: ctx.session.id,
                                                    found: staged.session_id });
        }
        if !staged.path.exists() {
            return Err(StepError::Store(format!("missing staged file {}", staged.path.display())));
        }
        self.behave(ctx).await?;
        Ok(ArchivedArtifact { key: dated_key(POINTER_KEY, ctx.scheduled_time),
                              version_tag: staged.version_tag.clone(),
                              size_bytes: staged.size_bytes,
                              digest: staged.digest.clone() })
    }

    async fn promote(&self, ctx: &StepContext, _archived: &ArchivedArtifact) -> Result<(), StepError> {
        self.behave(ctx).await
    }
}

pub fn fast_options() -> WorkflowOptions {
    WorkflowOptions::default().with_retry(RetryPolicy::fast(3))
}

pub fn controller(acts: Scripted, staging: &std::path::Path, options: WorkflowOptions) -> WorkflowController<Arc<InMemoryEventStore>, Scripted> {
    controller_with_store(Arc::new(InMemoryEventStore::new()), acts, staging, options)
}

pub fn controller_with_store(store: Arc<InMemoryEventStore>, acts: Scripted, staging: &std::path::Path, options: WorkflowOptions)
                             -> WorkflowController<Arc<InMemoryEventStore>, Scripted> {
    controller_as("test-worker", store, acts, staging, options)
}

pub fn controller_as(worker_id: &str, store: Arc<InMemoryEventStore>, acts: Scripted, staging: &std::path::Path, options: WorkflowOptions)
                     -> WorkflowController<Arc<InMemoryEventStore>, Scripted> {
    ControllerBuilder::new(store, acts).worker_id(worker_id)
                                       .staging_root(staging)
                                       .options(options)
                                       .build()
}

pub fn dir_is_empty(path: &std::path::Path) -> bool {
    std::fs::read_dir(path).map(|mut d| d.next().is_none()).unwrap_or(true)
}
