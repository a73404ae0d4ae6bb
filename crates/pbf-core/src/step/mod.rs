//! Definiciones relacionadas a Steps.
//!
//! Un run ejecuta un conjunto cerrado de steps (`StepKind`) en orden estricto.
//! Este módulo define:
//! - `StepKind`: las cuatro operaciones del run.
//! - `StepStatus`: estado de un step reconstruido por replay.
//! - `RetryPolicy` / `StepOptions` / `SessionOptions` / `WorkflowOptions`.
//! - `Activities`: la interfaz tipada que implementan los adapters.

pub mod activities;
pub mod kind;
pub mod policy;
mod status;

pub use activities::Activities;
pub use kind::StepKind;
pub use policy::{RetryPolicy, SessionOptions, StepOptions, WorkflowOptions};
pub use status::StepStatus;
