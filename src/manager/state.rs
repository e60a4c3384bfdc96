//! Session lifecycle state machine.
//!
//! `transition_allowed` is the single source of truth for legal lifecycle
//! edges; every state update goes through the manager's session table lock
//! so two threads racing to close or fail a session cannot both win.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Pending,
    Connecting,
    Active,
    Closing,
    Closed,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Pending => "pending",
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        }
    }

    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    /// A live session keeps its tab bound
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub(crate) fn transition_allowed(from: SessionState, to: SessionState) -> bool {
    use SessionState::*;
    matches!(
        (from, to),
        (Pending, Connecting)
            | (Pending, Closing)
            | (Connecting, Active)
            | (Connecting, Failed)
            | (Connecting, Closing)
            | (Active, Failed)
            | (Active, Closing)
            | (Closing, Closed)
    )
}

#[cfg(test)]
#[path = "../test/manager/state.rs"]
mod tests;
