//! Filter state machine

use tracing::{debug, warn};

/// Lifecycle states of a filter instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    Init,
    SettingUp,
    Running,
    Draining,
    ShuttingDown,
    Terminated,
}

impl FilterState {
    /// Legal transitions of the lifecycle graph
    pub fn can_transition(self, to: FilterState) -> bool {
        use FilterState::*;
        matches!(
            (self, to),
            (Init, SettingUp)
                | (SettingUp, Running)
                | (SettingUp, ShuttingDown) // setup_err
                | (Running, Draining)
                | (Running, ShuttingDown) // fatal
                | (Draining, ShuttingDown)
                | (ShuttingDown, Terminated)
        )
    }

    /// Short name for logging
    pub fn as_str(self) -> &'static str {
        match self {
            FilterState::Init => "init",
            FilterState::SettingUp => "setting-up",
            FilterState::Running => "running",
            FilterState::Draining => "draining",
            FilterState::ShuttingDown => "shutting-down",
            FilterState::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for FilterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitStatus {
    #[default]
    Clean,
    Failed,
}

/// Tracks and logs lifecycle transitions for one filter
#[derive(Debug)]
pub struct StateMachine {
    filter_id: String,
    state: FilterState,
}

impl StateMachine {
    /// A fresh machine in `Init`
    pub fn new(filter_id: impl Into<String>) -> Self {
        Self {
            filter_id: filter_id.into(),
            state: FilterState::Init,
        }
    }

    /// Current state
    #[inline]
    pub fn state(&self) -> FilterState {
        self.state
    }

    /// Advance to a new state
    ///
    /// Illegal transitions are logged and refused rather than panicking;
    /// the state machine is bookkeeping, not a gate the pipeline can trip
    /// over.
    pub fn advance(&mut self, to: FilterState) -> bool {
        if !self.state.can_transition(to) {
            warn!(
                filter_id = %self.filter_id,
                from = %self.state,
                to = %to,
                "refusing illegal state transition"
            );
            return false;
        }
        debug!(filter_id = %self.filter_id, from = %self.state, to = %to, "state transition");
        self.state = to;
        true
    }
}
