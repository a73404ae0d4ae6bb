//! Builder para `WorkflowController`.
//!
//! Las stores y las activities son obligatorias (`ControllerBuilder::new`); el
//! resto tiene valores por defecto razonables para un worker único:
//!
//! ```ignore
//! let controller = ControllerBuilder::new(InMemoryEventStore::new(), activities)
//!     .worker_id("worker-a")
//!     .staging_root("/var/tmp/pbf")
//!     .max_sessions(4)
//!     .build();
//! ```
use std::path::PathBuf;

use uuid::Uuid;

use crate::engine::{SessionPool, WorkflowController};
use crate::event::EventStore;
use crate::step::{Activities, RetryPolicy, WorkflowOptions};

pub const DEFAULT_MAX_SESSIONS: usize = 16;

#[derive(Debug)]
pub struct ControllerBuilder<E: EventStore, A: Activities> {
    events: E,
    activities: A,
    worker_id: Option<String>,
    staging_root: Option<PathBuf>,
    max_sessions: usize,
    options: WorkflowOptions,
}

impl<E: EventStore, A: Activities> ControllerBuilder<E, A> {
    pub fn new(events: E, activities: A) -> Self {
        Self { events,
               activities,
               worker_id: None,
               staging_root: None,
               max_sessions: DEFAULT_MAX_SESSIONS,
               options: WorkflowOptions::default() }
    }

    pub fn worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = Some(id.into());
        self
    }

    pub fn staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    pub fn max_sessions(mut self, n: usize) -> Self {
        self.max_sessions = n;
        self
    }

    pub fn options(mut self, options: WorkflowOptions) -> Self {
        self.options = options;
        self
    }

    /// Misma política de reintentos para todos los steps.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.options = self.options.with_retry(retry);
        self
    }

    pub fn build(self) -> WorkflowController<E, A> {
        let worker_id = self.worker_id
                            .unwrap_or_else(|| format!("worker-{}", Uuid::new_v4().simple()));
        let staging_root = self.staging_root.unwrap_or_else(std::env::temp_dir);
        let sessions = SessionPool::new(worker_id, staging_root, self.max_sessions, self.options.session.clone());
        WorkflowController::new(self.events, self.activities, sessions, self.options)
    }
}
