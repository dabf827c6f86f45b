//! Pipeline lifecycle state machine.
//!
//! One atomic cell holds the state; transitions happen by compare-and-
//! swap so concurrent `start`/`stop` calls and the run task itself can
//! never double-enter a state. The legal flow is
//! `Stopped → Starting → Running → (Stopping | Failed) → Stopped`.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    /// Not running; resources released.
    Stopped = 0,
    /// `start` in progress (opening connectors, spawning the run task).
    Starting = 1,
    /// Run task active.
    Running = 2,
    /// `stop` in progress; no new work accepted.
    Stopping = 3,
    /// Run task terminated on an unrecoverable error; resources
    /// released, cause retrievable via `stop`.
    Failed = 4,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            4 => Self::Failed,
            _ => Self::Stopped,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stopped => "Stopped",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Atomic holder of a [`PipelineState`].
#[derive(Debug)]
pub struct StateCell {
    state: AtomicU8,
}

impl StateCell {
    /// Creates a cell in the `Stopped` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(PipelineState::Stopped as u8),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn get(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Unconditionally sets the state.
    pub fn set(&self, state: PipelineState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Transitions `from → to` atomically.
    ///
    /// Returns `false` (and leaves the state untouched) if the cell was
    /// not in `from` — the caller lost the race or the transition is
    /// illegal from the current state.
    pub fn compare_and_set(&self, from: PipelineState, to: PipelineState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Returns whether the cell is in `Running` or `Starting`.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self.get(),
            PipelineState::Running | PipelineState::Starting
        )
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
