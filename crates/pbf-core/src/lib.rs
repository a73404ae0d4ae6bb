//! pbf-core: motor de ejecución del sync periódico de snapshots PBF.
//!
//! Contiene la máquina de estados del run, el log de eventos con replay, el
//! executor de steps (reintentos / timeout / heartbeat), las sesiones, los
//! schedules y los traits de los colaboradores externos (`RemoteSource`,
//! `ObjectStore`, `Activities`) con implementaciones en memoria.
pub mod constants;
pub mod engine;
pub mod errors;
pub mod event;
pub mod hashing;
pub mod model;
pub mod remote;
pub mod repo;
pub mod schedule;
pub mod step;
pub mod storage;

pub use engine::{ControllerBuilder, Heartbeat, SessionInfo, SessionPool, Worker, WorkflowController};
pub use errors::{classify_error, CoreEngineError, ErrorClass, StepError};
pub use event::{EventStore, InMemoryEventStore, RunEvent, RunEventKind};
pub use model::{ArchivedArtifact, ChangeCheck, ObjectMetadata, RunOutcome, RunStatus, StagedArtifact, StepContext, VersionTag};
pub use remote::{InMemorySource, RemoteBody, RemoteSource, SourceError};
pub use repo::{replay, RunInstance, RunState, StepSlot};
pub use schedule::{run_id_for, InMemoryScheduleStore, ScheduleSpec, ScheduleStore, ScheduledFire};
pub use step::{Activities, RetryPolicy, SessionOptions, StepKind, StepOptions, StepStatus, WorkflowOptions};
pub use storage::{InMemoryObjectStore, ObjectStore, StoreError};
