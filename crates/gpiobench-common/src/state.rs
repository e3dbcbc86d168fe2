//! Orchestrator lifecycle state machine.
//!
//! IDLE → CONFIGURING → RUNNING → STOPPED, with CONFIGURING → FAILED → STOPPED
//! when setup aborts. Stopping is allowed from every state so that teardown
//! can always run.

use crate::error::{BenchError, BenchResult};
use std::fmt;

/// Lifecycle states of a benchmark run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunState {
    /// Created; nothing acquired yet.
    #[default]
    Idle,
    /// Acquiring pins and starting strategies.
    Configuring,
    /// Benchmarks launched.
    Running,
    /// Setup aborted; partial resources still held until stop.
    Failed,
    /// Everything released.
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Configuring => write!(f, "CONFIGURING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Failed => write!(f, "FAILED"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

impl RunState {
    /// Check if a transition to `target` is valid from the current state.
    #[must_use]
    pub fn can_transition_to(&self, target: RunState) -> bool {
        use RunState::{Configuring, Failed, Idle, Running, Stopped};

        matches!(
            (self, target),
            (Idle, Configuring)
                | (Configuring, Running)
                | (Configuring, Failed)
                | (Idle | Running | Failed, Stopped)
        )
    }
}

/// State machine wrapper with transition history tracking.
#[derive(Debug, Clone, Default)]
pub struct RunStateMachine {
    current: RunState,
    previous: Option<RunState>,
    transition_count: u64,
}

impl RunStateMachine {
    /// Create a new state machine starting in IDLE.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.current
    }

    /// Get the previous state (if any transition occurred).
    #[must_use]
    pub fn previous_state(&self) -> Option<RunState> {
        self.previous
    }

    /// Get total number of transitions.
    #[must_use]
    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Attempt a state transition.
    pub fn transition(&mut self, target: RunState) -> BenchResult<()> {
        if self.current.can_transition_to(target) {
            self.previous = Some(self.current);
            self.current = target;
            self.transition_count += 1;
            Ok(())
        } else {
            Err(BenchError::InvalidStateTransition {
                from: self.current.to_string(),
                to: target.to_string(),
            })
        }
    }
}
