//! Run phase definitions for the ingestion orchestrator
//!
//! A run moves `Idle → Running → (ShuttingDown | Finished)`; a shutting-down
//! run still ends in `Finished` once its state has been flushed.

use std::fmt;

/// Represents the current phase of an ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunPhase {
    /// Constructed, checkpoint not yet acted upon
    Idle,

    /// Processing work items
    Running,

    /// Stop requested; flushing rows and saving state
    ShuttingDown,

    /// All cleanup done
    Finished,
}

impl RunPhase {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Returns true if the transition `self -> next` is allowed
    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Idle, Self::Finished)
                | (Self::Running, Self::ShuttingDown)
                | (Self::Running, Self::Finished)
                | (Self::ShuttingDown, Self::Finished)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
