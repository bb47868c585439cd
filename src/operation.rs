//! Operation request types.
//!
//! An [`OperationRequest`] is the unit of work of one invocation. It is
//! built once, never mutated, and shared by reference with both device flows.

use crate::error::{Error, Result};
use crate::inventory::DeviceGroup;
use crate::validator::ConfigurationStatement;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default confirmation window for `commit-confirmed`, in minutes.
pub const DEFAULT_CONFIRM_MINUTES: u32 = 5;

/// Default per-call device timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// The operation to run against a device group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    /// Validate staged configuration on the devices without applying it
    Check,
    /// Apply the configuration
    Commit,
    /// Apply with an automatic revert window
    CommitConfirmed,
    /// Undo the configuration file (or roll back one generation)
    Rollback,
    /// Compare the running configurations of both devices
    Compare,
}

impl OperationKind {
    /// All operation kinds, in CLI order.
    pub const ALL: [OperationKind; 5] = [
        OperationKind::Check,
        OperationKind::Commit,
        OperationKind::CommitConfirmed,
        OperationKind::Rollback,
        OperationKind::Compare,
    ];

    /// Whether the operation changes device configuration.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            OperationKind::Commit | OperationKind::CommitConfirmed | OperationKind::Rollback
        )
    }

    /// Whether a configuration file is mandatory for this operation.
    pub fn requires_config_file(&self) -> bool {
        matches!(
            self,
            OperationKind::Check | OperationKind::Commit | OperationKind::CommitConfirmed
        )
    }

    /// The CLI name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Check => "check",
            OperationKind::Commit => "commit",
            OperationKind::CommitConfirmed => "commit-confirmed",
            OperationKind::Rollback => "rollback",
            OperationKind::Compare => "compare",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "check" => Ok(OperationKind::Check),
            "commit" => Ok(OperationKind::Commit),
            "commit-confirmed" => Ok(OperationKind::CommitConfirmed),
            "rollback" => Ok(OperationKind::Rollback),
            "compare" => Ok(OperationKind::Compare),
            other => Err(Error::Config(format!(
                "Unknown operation '{}'. Expected one of: check, commit, commit-confirmed, rollback, compare",
                other
            ))),
        }
    }
}

/// Invocation flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFlags {
    /// Connect and check only; print the execution plan
    pub dry_run: bool,
    /// Persist running configuration before mutating
    pub backup: bool,
    /// Drive both devices concurrently
    pub parallel: bool,
    /// Verbose diagnostics
    pub verbose: bool,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
    /// Commit-confirmed window in minutes
    pub confirm_minutes: u32,
}

impl Default for RunFlags {
    fn default() -> Self {
        Self {
            dry_run: false,
            backup: false,
            parallel: false,
            verbose: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            confirm_minutes: DEFAULT_CONFIRM_MINUTES,
        }
    }
}

impl RunFlags {
    /// Per-call timeout as a [`std::time::Duration`].
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

/// The unit of work for one invocation.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    /// Target device pair
    pub group: DeviceGroup,
    /// Validated statements; empty for compare and generation rollback
    pub statements: Vec<ConfigurationStatement>,
    /// Operation to run
    pub kind: OperationKind,
    /// Invocation flags
    pub flags: RunFlags,
}

impl OperationRequest {
    /// Build a request, checking that the operation has what it needs.
    pub fn new(
        group: DeviceGroup,
        statements: Vec<ConfigurationStatement>,
        kind: OperationKind,
        flags: RunFlags,
    ) -> Result<Self> {
        if kind.requires_config_file() && statements.is_empty() {
            return Err(Error::Config(format!(
                "Operation '{}' requires a configuration file",
                kind
            )));
        }
        if kind == OperationKind::CommitConfirmed && !(1..=65535).contains(&flags.confirm_minutes)
        {
            return Err(Error::Config(format!(
                "Confirm window must be between 1 and 65535 minutes, got {}",
                flags.confirm_minutes
            )));
        }
        if flags.timeout_secs == 0 {
            return Err(Error::Config("Timeout must be at least 1 second".into()));
        }
        Ok(Self {
            group,
            statements,
            kind,
            flags,
        })
    }

    /// Whether this is a rollback that undoes the given file.
    pub fn is_file_rollback(&self) -> bool {
        self.kind == OperationKind::Rollback && !self.statements.is_empty()
    }
}

/// State of a confirmation window as last observed.
///
/// Confirmation happens in a later `commit` invocation, so a window is only
/// ever seen pending or, once its deadline has passed, reverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitWindowState {
    /// Waiting for a follow-up commit
    Pending,
    /// Deadline passed; the device reverted on its own
    AutoRolledBack,
}

/// Tracks a `commit confirmed` window on one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitWindow {
    /// When the confirmed commit was issued
    pub committed_at: DateTime<Utc>,
    /// Deadline for the follow-up commit
    pub deadline: DateTime<Utc>,
    /// Window length
    pub minutes: u32,
    /// Current state
    pub state: CommitWindowState,
}

impl CommitWindow {
    /// Open a window at `committed_at`.
    pub fn open(committed_at: DateTime<Utc>, minutes: u32) -> Self {
        Self {
            committed_at,
            deadline: committed_at + Duration::minutes(i64::from(minutes)),
            minutes,
            state: CommitWindowState::Pending,
        }
    }

    /// Best-effort expiry observation; only a later query can know for sure.
    pub fn observe(&mut self, now: DateTime<Utc>) -> CommitWindowState {
        if self.state == CommitWindowState::Pending && now >= self.deadline {
            self.state = CommitWindowState::AutoRolledBack;
        }
        self.state
    }

    /// Time left before the device reverts.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.deadline - now).max(Duration::zero())
    }
}
