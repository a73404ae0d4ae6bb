//! `Activities` de producción: los cuatro steps sobre una fuente remota y un
//! object store concretos.
use std::time::Duration;

use async_trait::async_trait;
use pbf_core::constants::DEFAULT_VERSION_METADATA_KEY;
use pbf_core::{Activities, ArchivedArtifact, ChangeCheck, ObjectStore, RemoteSource, StagedArtifact, StepContext, StepError};

use crate::steps::{archive_staged, detect_change, fetch_to_staging, promote_archived};

/// Intervalo por defecto de los latidos durante operaciones opacas.
pub const DEFAULT_HEARTBEAT_EVERY: Duration = Duration::from_secs(1);

pub struct PbfActivities<R: RemoteSource, S: ObjectStore> {
    source: R,
    store: S,
    pointer_key: String,
    metadata_key: String,
    heartbeat_every: Duration,
}

impl<R: RemoteSource, S: ObjectStore> PbfActivities<R, S> {
    pub fn new(source: R, store: S, pointer_key: impl Into<String>) -> Self {
        Self { source,
               store,
               pointer_key: pointer_key.into(),
               metadata_key: DEFAULT_VERSION_METADATA_KEY.to_string(),
               heartbeat_every: DEFAULT_HEARTBEAT_EVERY }
    }

    pub fn with_metadata_key(mut self, key: impl Into<String>) -> Self {
        self.metadata_key = key.into();
        self
    }

    pub fn with_heartbeat_every(mut self, every: Duration) -> Self {
        self.heartbeat_every = every;
        self
    }

    pub fn source(&self) -> &R {
        &self.source
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn pointer_key(&self) -> &str {
        &self.pointer_key
    }
}

#[async_trait]
impl<R, S> Activities for PbfActivities<R, S>
    where R: RemoteSource + 'static,
          S: ObjectStore + 'static
{
    async fn check_for_change(&self, _ctx: &StepContext) -> Result<ChangeCheck, StepError> {
        detect_change(&self.source, &self.store, &self.pointer_key, &self.metadata_key).await
    }

    async fn fetch(&self, ctx: &StepContext) -> Result<StagedArtifact, StepError> {
        fetch_to_staging(&self.source, ctx, &self.pointer_key, self.heartbeat_every).await
    }

    async fn archive(&self, ctx: &StepContext, staged: &StagedArtifact) -> Result<ArchivedArtifact, StepError> {
        archive_staged(&self.store, ctx, staged, &self.pointer_key, &self.metadata_key, self.heartbeat_every).await
    }

    async fn promote(&self, _ctx: &StepContext, archived: &ArchivedArtifact) -> Result<(), StepError> {
        promote_archived(&self.store, archived, &self.pointer_key, &self.metadata_key).await
    }
}
