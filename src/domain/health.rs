//! Readiness state of the master role.

/// Health state of the master, as observed by the coordinator.
///
/// The only legal transitions are `Pending → Healthy` and
/// `Pending → Unhealthy`; both end states are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MasterState {
    #[default]
    Pending,
    Healthy {
        attempts: u32,
    },
    Unhealthy {
        attempts: u32,
        last_failure: Option<String>,
    },
}

impl MasterState {
    pub fn is_pending(&self) -> bool {
        matches!(self, MasterState::Pending)
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, MasterState::Healthy { .. })
    }

    /// Apply a transition. Returns `false` and leaves the state untouched
    /// when the current state is already terminal.
    pub fn transition(&mut self, next: MasterState) -> bool {
        if !self.is_pending() || next.is_pending() {
            return false;
        }
        *self = next;
        true
    }
}

/// Outcome of a single probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Listening,
    NotListening(String),
}
