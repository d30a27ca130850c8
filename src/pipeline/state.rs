//! Pipeline state management

use std::sync::atomic::{AtomicU8, Ordering};

/// Pipeline state machine
///
/// States are totally ordered; a pipeline only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PipelineState {
    /// Graph is being built, nothing flows yet
    Idle = 0,

    /// Graph is producing output
    Running = 1,

    /// End of stream requested, branches are draining
    Stopping = 2,

    /// Graph is torn down
    Stopped = 3,
}

impl PipelineState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &PipelineState) -> bool {
        target >= self
    }

    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::Running => "Running",
            PipelineState::Stopping => "Stopping",
            PipelineState::Stopped => "Stopped",
        }
    }

    /// Track add/remove requests are honored up to and including Running.
    pub fn accepts_mutations(&self) -> bool {
        *self <= PipelineState::Running
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => PipelineState::Idle,
            1 => PipelineState::Running,
            2 => PipelineState::Stopping,
            _ => PipelineState::Stopped,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Shared lifecycle flag.
///
/// Written by the session owner, read without locking by event handlers. A
/// stale read can only let a request through slightly late, never reject one
/// that should have been accepted, because the value only grows.
#[derive(Debug)]
pub struct LifecycleState(AtomicU8);

impl LifecycleState {
    pub fn new() -> Self {
        Self(AtomicU8::new(PipelineState::Idle as u8))
    }

    pub fn get(&self) -> PipelineState {
        PipelineState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move forward to `target`. Returns the previous state, or `None` when
    /// `target` is behind the current state (nothing changes then).
    pub fn advance(&self, target: PipelineState) -> Option<PipelineState> {
        let prev = PipelineState::from_u8(self.0.fetch_max(target as u8, Ordering::AcqRel));
        prev.can_transition_to(&target).then_some(prev)
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::new()
    }
}
