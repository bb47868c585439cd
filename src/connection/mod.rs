//! Connection layer for remote device communication.
//!
//! This module provides the low-level transport used by the Junos device
//! session: open an SSH session, run a command, close. The device layer in
//! [`crate::device`] builds Junos semantics on top of the [`Connection`]
//! trait, so tests can swap the transport for an in-memory double.
//!
//! # Supported Transports
//!
//! - **SSH** via `russh` (pure Rust, `russh` feature, default)
//!
//! # Example
//!
//! ```rust,ignore
//! use junos_push::connection::{ConnectionConfig, RusshConnection, Connection};
//!
//! let config = ConnectionConfig::new("10.0.0.1", 22, "netops", "secret");
//! let conn = RusshConnection::connect(&config).await?;
//! let result = conn.execute("show version", None).await?;
//! println!("{}", result.stdout);
//! conn.close().await?;
//! ```

/// Pure Rust SSH implementation using russh.
#[cfg(feature = "russh")]
pub mod russh;

use crate::inventory::DeviceTarget;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "russh")]
pub use self::russh::RusshConnection;

/// Russh-related error type - wraps russh::Error for the Handler trait
#[cfg(feature = "russh")]
#[derive(Debug)]
pub struct RusshError(pub ::russh::Error);

#[cfg(feature = "russh")]
impl From<::russh::Error> for RusshError {
    fn from(err: ::russh::Error) -> Self {
        RusshError(err)
    }
}

#[cfg(feature = "russh")]
impl std::fmt::Display for RusshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Russh error: {}", self.0)
    }
}

#[cfg(feature = "russh")]
impl std::error::Error for RusshError {}

#[cfg(feature = "russh")]
impl From<::russh::Error> for ConnectionError {
    fn from(err: ::russh::Error) -> Self {
        ConnectionError::SshError(format!("Russh error: {}", err))
    }
}

/// Errors that can occur during connection operations.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Failed to establish initial connection to the host.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication was rejected by the remote host.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Command execution failed (not to be confused with non-zero exit code).
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    /// Connection or operation timed out.
    #[error("Connection timeout after {0} seconds")]
    Timeout(u64),

    /// SSH-specific error from the underlying implementation.
    #[error("SSH error: {0}")]
    SshError(String),

    /// I/O error during connection operations.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Connection was closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// The result of executing a command on a connection.
///
/// ```rust
/// use junos_push::connection::CommandResult;
///
/// let result = CommandResult::success("commit complete".into(), String::new());
/// assert!(result.success);
///
/// let failed = CommandResult::failure(1, String::new(), "error: syntax error".into());
/// assert_eq!(failed.combined_output(), "error: syntax error");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit code of the command (0 typically indicates success).
    pub exit_code: i32,
    /// Content written to standard output.
    pub stdout: String,
    /// Content written to standard error.
    pub stderr: String,
    /// Convenience flag: `true` if `exit_code == 0`.
    pub success: bool,
}

impl CommandResult {
    /// Create a new successful command result
    pub fn success(stdout: String, stderr: String) -> Self {
        Self {
            exit_code: 0,
            stdout,
            stderr,
            success: true,
        }
    }

    /// Create a new failed command result
    pub fn failure(exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            success: false,
        }
    }

    /// Get the combined output (stdout + stderr)
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Options for command execution
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Timeout in seconds (None for no timeout)
    pub timeout: Option<u64>,
}

impl ExecuteOptions {
    /// Create new execute options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Everything needed to open a session to one device.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Host address
    pub host: String,
    /// SSH port
    pub port: u16,
    /// Login user
    pub user: String,
    /// Login password
    pub password: String,
    /// Connect and inactivity timeout
    pub timeout: Duration,
}

impl ConnectionConfig {
    /// Create a connection config with a 60 second timeout.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Build from an inventory target.
    pub fn for_target(target: &DeviceTarget, timeout: Duration) -> Self {
        Self::new(
            target.host.clone(),
            target.port,
            target.credentials.user.clone(),
            target.credentials.password.clone(),
        )
        .with_timeout(timeout)
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// The connection trait that transport implementations must implement.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the connection identifier (usually `user@host:port`)
    fn identifier(&self) -> &str;

    /// Check if the connection is still alive
    async fn is_alive(&self) -> bool;

    /// Execute a command on the remote device
    async fn execute(
        &self,
        command: &str,
        options: Option<ExecuteOptions>,
    ) -> ConnectionResult<CommandResult>;

    /// Close the connection
    async fn close(&self) -> ConnectionResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_output() {
        let result = CommandResult::failure(1, "out".into(), "err".into());
        assert_eq!(result.combined_output(), "out\nerr");
        assert!(!result.success);
    }

    #[test]
    fn test_config_debug_hides_password() {
        let config = ConnectionConfig::new("10.0.0.1", 22, "netops", "hunter2");
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_config_for_target() {
        use crate::inventory::{Credentials, DeviceRole};
        let target = DeviceTarget::new("10.0.0.2", Credentials::new("netops", "pw"), "core", DeviceRole::Node2)
            .with_port(830);
        let config = ConnectionConfig::for_target(&target, Duration::from_secs(7));
        assert_eq!(config.port, 830);
        assert_eq!(config.user, "netops");
        assert_eq!(config.timeout, Duration::from_secs(7));
    }

}
