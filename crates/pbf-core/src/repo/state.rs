//! Máquina de estados del run.
//!
//! ```text
//! Start -> SessionEstablished -> ChangeChecked -> NoChangeExit
//!                                              \-> Downloaded -> Uploaded -> Promoted
//! (cualquier estado no terminal) -> Failed
//! ```
use serde::{Deserialize, Serialize};

use crate::errors::CoreEngineError;
use crate::step::StepKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Start,
    SessionEstablished,
    ChangeChecked,
    Downloaded,
    Uploaded,
    Promoted,
    NoChangeExit,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    SessionEstablished,
    StepFinished(StepKind),
    NoChange,
    Completed,
    Failed,
}

impl RunState {
    /// `Promoted` no cuenta: el run aún debe liberar la sesión y registrar
    /// `RunCompleted`.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::NoChangeExit | RunState::Failed)
    }

    /// Aplica una transición; devuelve `InvalidTransition` si no es legal.
    pub fn on(self, t: Transition) -> Result<RunState, CoreEngineError> {
        use RunState::*;
        let next = match (self, t) {
            (Start, Transition::SessionEstablished) => SessionEstablished,
            // Nueva sesión al reanudar: el progreso se conserva.
            (s, Transition::SessionEstablished) if !s.is_terminal() && s != Promoted => s,
            (SessionEstablished, Transition::StepFinished(StepKind::CheckForChange)) => ChangeChecked,
            (ChangeChecked | Downloaded, Transition::StepFinished(StepKind::Fetch)) => Downloaded,
            (Downloaded, Transition::StepFinished(StepKind::Archive)) => Uploaded,
            (Uploaded, Transition::StepFinished(StepKind::Promote)) => Promoted,
            (ChangeChecked, Transition::NoChange) => NoChangeExit,
            (Promoted, Transition::Completed) => Promoted,
            (s, Transition::Failed) if !s.is_terminal() && s != Promoted => Failed,
            (from, on) => {
                return Err(CoreEngineError::InvalidTransition { from,
                                                                on: format!("{on:?}") })
            }
        };
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_promoted() {
        let mut s = RunState::Start;
        for t in [Transition::SessionEstablished,
                  Transition::StepFinished(StepKind::CheckForChange),
                  Transition::StepFinished(StepKind::Fetch),
                  Transition::StepFinished(StepKind::Archive),
                  Transition::StepFinished(StepKind::Promote),
                  Transition::Completed]
        {
            s = s.on(t).unwrap();
        }
        assert_eq!(s, RunState::Promoted);
    }

    #[test]
    fn no_change_exit_is_terminal() {
        let s = RunState::ChangeChecked.on(Transition::NoChange).unwrap();
        assert_eq!(s, RunState::NoChangeExit);
        assert!(s.is_terminal());
        assert!(s.on(Transition::Failed).is_err());
        assert!(s.on(Transition::StepFinished(StepKind::Fetch)).is_err());
    }

    #[test]
    fn steps_cannot_be_skipped() {
        let err = RunState::ChangeChecked.on(Transition::StepFinished(StepKind::Archive))
                                         .unwrap_err();
        assert!(matches!(err, CoreEngineError::InvalidTransition { from: RunState::ChangeChecked, .. }));
        assert!(RunState::Start.on(Transition::StepFinished(StepKind::CheckForChange)).is_err());
    }

    #[test]
    fn failure_reachable_from_any_non_terminal_state() {
        for s in [RunState::Start,
                  RunState::SessionEstablished,
                  RunState::ChangeChecked,
                  RunState::Downloaded,
                  RunState::Uploaded]
        {
            assert_eq!(s.on(Transition::Failed).unwrap(), RunState::Failed);
        }
    }

    #[test]
    fn refetch_keeps_downloaded_state() {
        let s = RunState::Downloaded.on(Transition::SessionEstablished).unwrap();
        assert_eq!(s, RunState::Downloaded);
        assert_eq!(s.on(Transition::StepFinished(StepKind::Fetch)).unwrap(), RunState::Downloaded);
    }
}
