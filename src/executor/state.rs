//! Per-device state machine.
//!
//! ```text
//! Idle -> Connected -> Locked -> Loaded -> CheckedOnly | Committed
//!                                          | ConfirmedPending | RolledBack
//!                                       -> Released
//! ```
//!
//! Any non-terminal state may move to `Failed`. `Failed` and `Released` are
//! terminal; a failed device is still released, but its state stays `Failed`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Where a device is in its operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    /// Not yet contacted
    Idle,
    /// Session open
    Connected,
    /// Lock status checked and the database is free
    Locked,
    /// Candidate staged
    Loaded,
    /// `commit check` passed, nothing applied
    CheckedOnly,
    /// Candidate applied
    Committed,
    /// Applied with a pending confirmation window
    ConfirmedPending,
    /// Previous configuration restored
    RolledBack,
    /// Session released after success
    Released,
    /// Operation failed
    Failed,
}

impl DeviceState {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeviceState::Released | DeviceState::Failed)
    }

    /// Whether the state ends an operation successfully, before release.
    pub fn is_outcome(&self) -> bool {
        matches!(
            self,
            DeviceState::CheckedOnly
                | DeviceState::Committed
                | DeviceState::ConfirmedPending
                | DeviceState::RolledBack
        )
    }

    /// Whether `next` is a legal successor.
    pub fn can_transition_to(&self, next: DeviceState) -> bool {
        use DeviceState::*;

        if next == Failed {
            return !self.is_terminal();
        }
        match (*self, next) {
            (Idle, Connected) => true,
            // compare and dry runs stop early
            (Connected, Locked) | (Connected, Released) => true,
            (Locked, Loaded) | (Locked, Released) => true,
            (Loaded, CheckedOnly | Committed | ConfirmedPending | RolledBack) => true,
            (s, Released) => s.is_outcome(),
            _ => false,
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceState::Idle => "idle",
            DeviceState::Connected => "connected",
            DeviceState::Locked => "locked",
            DeviceState::Loaded => "loaded",
            DeviceState::CheckedOnly => "checked-only",
            DeviceState::Committed => "committed",
            DeviceState::ConfirmedPending => "confirmed-pending",
            DeviceState::RolledBack => "rolled-back",
            DeviceState::Released => "released",
            DeviceState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State of one device plus the path it took.
#[derive(Debug, Clone)]
pub struct DeviceFlow {
    host: String,
    state: DeviceState,
    history: Vec<DeviceState>,
}

impl DeviceFlow {
    /// Start in `Idle`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            state: DeviceState::Idle,
            history: vec![DeviceState::Idle],
        }
    }

    /// Current state.
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Every state visited, in order.
    pub fn history(&self) -> &[DeviceState] {
        &self.history
    }

    /// The last state before release.
    pub fn final_state(&self) -> DeviceState {
        match self.state {
            DeviceState::Released => self
                .history
                .iter()
                .rev()
                .nth(1)
                .copied()
                .unwrap_or(DeviceState::Released),
            state => state,
        }
    }

    /// Move to `next`. Illegal transitions are ignored and logged.
    pub fn advance(&mut self, next: DeviceState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!(host = %self.host, from = %self.state, to = %next, "Ignoring illegal state transition");
            return false;
        }
        debug!(host = %self.host, from = %self.state, to = %next, "State transition");
        self.state = next;
        self.history.push(next);
        true
    }

    /// Move to `Failed`.
    pub fn fail(&mut self) {
        self.advance(DeviceState::Failed);
    }
}
