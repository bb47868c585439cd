//! Device capability interface.
//!
//! The push engine never talks to a transport directly. It opens a
//! [`DeviceSession`] through a [`DeviceTransport`] and drives the session
//! through the capabilities below. [`junos::JunosCliTransport`] is the
//! production implementation; tests plug in in-memory doubles.
//!
//! Every session must be released exactly once by whoever opened it, on
//! success and failure paths alike.

pub mod junos;

pub use junos::{JunosCliTransport, JunosSession};

use crate::error::{Error, Result};
use crate::inventory::DeviceTarget;
use crate::validator::ConfigurationStatement;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Configuration database status of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    /// Nobody else is editing and nothing is pending
    Unlocked,
    /// Another user holds the configuration
    LockedByOther,
    /// The candidate holds uncommitted changes
    PendingChanges,
}

impl LockState {
    /// Whether a mutating operation may proceed.
    pub fn is_unlocked(&self) -> bool {
        matches!(self, LockState::Unlocked)
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockState::Unlocked => write!(f, "unlocked"),
            LockState::LockedByOther => write!(f, "locked by another user"),
            LockState::PendingChanges => write!(f, "uncommitted changes pending"),
        }
    }
}

/// Result of `commit check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the device accepted the candidate
    pub passed: bool,
    /// Device output
    pub message: String,
}

/// Result of a commit variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResult {
    /// When the device acknowledged the commit
    pub committed_at: DateTime<Utc>,
    /// Confirmation window, for `commit confirmed`
    pub confirm_minutes: Option<u32>,
    /// Device output
    pub message: String,
}

/// Opens sessions to devices.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Open an authenticated session.
    ///
    /// Fails with [`Error::Connectivity`] on refusal, auth failure or timeout.
    async fn connect(&self, target: &DeviceTarget, timeout: Duration)
        -> Result<Box<dyn DeviceSession>>;

    /// Check that the device answers on its management port.
    ///
    /// Returns the round-trip time of a TCP connect.
    async fn probe(&self, target: &DeviceTarget, timeout: Duration) -> Result<Duration> {
        probe_tcp(target, timeout).await
    }
}

/// One open session to a device.
#[async_trait]
pub trait DeviceSession: Send + Sync {
    /// The device this session talks to.
    fn target(&self) -> &DeviceTarget;

    /// Report whether the configuration database is free to edit.
    async fn check_lock_status(&mut self) -> Result<LockState>;

    /// Running configuration as `set` lines.
    async fn fetch_running_config(&mut self) -> Result<Vec<String>>;

    /// Stage statements into the candidate configuration.
    ///
    /// Fails with [`Error::Load`] naming the first offending statement.
    async fn load_statements(&mut self, statements: &[ConfigurationStatement]) -> Result<()>;

    /// Validate the candidate without applying it.
    async fn commit_check(&mut self) -> Result<ValidationResult>;

    /// Apply the candidate.
    async fn commit(&mut self) -> Result<CommitResult>;

    /// Apply the candidate with an automatic revert after `minutes`.
    async fn commit_confirmed(&mut self, minutes: u32) -> Result<CommitResult>;

    /// Stage the configuration from `steps` commits ago into the candidate.
    async fn rollback(&mut self, steps: u32) -> Result<()>;

    /// Drop anything staged in the candidate.
    async fn discard_changes(&mut self) -> Result<()>;

    /// Unlock and disconnect.
    async fn release(&mut self) -> Result<()>;
}

/// TCP reachability check of the device's SSH port.
pub async fn probe_tcp(target: &DeviceTarget, timeout: Duration) -> Result<Duration> {
    let addr = target.socket_addr();
    let started = Instant::now();
    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(&addr)).await {
        Ok(Ok(_)) => Ok(started.elapsed()),
        Ok(Err(e)) => Err(Error::connectivity(
            &target.host,
            format!("port {} unreachable: {}", target.port, e),
        )),
        Err(_) => Err(Error::connectivity(
            &target.host,
            format!("no answer on port {} within {}s", target.port, timeout.as_secs()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{Credentials, DeviceRole};

    #[test]
    fn test_lock_state_gate() {
        assert!(LockState::Unlocked.is_unlocked());
        assert!(!LockState::LockedByOther.is_unlocked());
        assert!(!LockState::PendingChanges.is_unlocked());
        assert_eq!(LockState::PendingChanges.to_string(), "uncommitted changes pending");
    }

    #[tokio::test]
    async fn test_probe_tcp_reachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let target = DeviceTarget::new("127.0.0.1", Credentials::new("u", "p"), "g", DeviceRole::Node1)
            .with_port(port);
        assert!(probe_tcp(&target, Duration::from_secs(2)).await.is_ok());
    }

    #[tokio::test]
    async fn test_probe_tcp_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let target = DeviceTarget::new("127.0.0.1", Credentials::new("u", "p"), "g", DeviceRole::Node1)
            .with_port(port);
        let err = probe_tcp(&target, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, Error::Connectivity { .. }));
    }
}
