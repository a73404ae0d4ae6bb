//! Modelos del run (VersionTag, artifacts staged/archivados, contexto de step,
//! outcome terminal).

pub mod artifact;
pub mod context;
pub mod keys;
pub mod outcome;

pub use artifact::{ArchivedArtifact, ChangeCheck, ObjectMetadata, StagedArtifact, VersionTag};
pub use context::StepContext;
pub use keys::{canonical_basename, dated_key, staging_name_parts};
pub use outcome::{RunOutcome, RunStatus};
