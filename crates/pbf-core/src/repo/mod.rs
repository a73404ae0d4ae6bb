//! Estado del run reconstruido por replay de eventos.

pub mod state;
pub mod types;

pub use state::{RunState, Transition};
pub use types::{replay, RunInstance, SessionRecord, StepSlot};
