use std::fmt;

use serde::{Deserialize, Serialize};

/// Steps del run, en el orden en que se ejecutan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StepKind {
    CheckForChange,
    Fetch,
    Archive,
    Promote,
}

impl StepKind {
    pub const ALL: [StepKind; 4] = [StepKind::CheckForChange, StepKind::Fetch, StepKind::Archive, StepKind::Promote];

    /// Identificador estable (logs, persistencia).
    pub fn id(self) -> &'static str {
        match self {
            StepKind::CheckForChange => "check_for_change",
            StepKind::Fetch => "fetch",
            StepKind::Archive => "archive",
            StepKind::Promote => "promote",
        }
    }

    pub fn index(self) -> usize {
        match self {
            StepKind::CheckForChange => 0,
            StepKind::Fetch => 1,
            StepKind::Archive => 2,
            StepKind::Promote => 3,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
