//! Motor de ejecución de runs.
//!
//! - `WorkflowController`: máquina de estados del run sobre el log de eventos.
//! - `StepExecutor`: reintentos, timeouts y heartbeat por step.
//! - `SessionPool` / `Session`: afinidad y staging local por run.
//! - `Worker`: reanudación de runs abiertos y disparo de schedules.

pub mod builder;
pub mod controller;
pub mod executor;
pub mod heartbeat;
pub mod session;
pub mod worker;

pub use builder::{ControllerBuilder, DEFAULT_MAX_SESSIONS};
pub use controller::WorkflowController;
pub use executor::StepExecutor;
pub use heartbeat::{Heartbeat, HeartbeatMonitor};
pub use session::{Session, SessionInfo, SessionPool};
pub use worker::{RunResult, Worker};
