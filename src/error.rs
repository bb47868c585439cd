//! Error types for junos-push.
//!
//! Every failure the push engine can produce is one variant of [`Error`].
//! Device-scoped variants are captured into a device's outcome by the
//! executor; only [`Error::Validation`] and [`Error::Inventory`] abort an
//! invocation before any device is contacted.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for junos-push operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for junos-push.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Input Errors
    // ========================================================================
    /// The configuration file is malformed.
    #[error("Configuration validation failed: {message}")]
    Validation {
        /// Summary message
        message: String,
        /// Per-line problems, in file order
        problems: Vec<String>,
    },

    /// The inventory could not be loaded or the group could not be resolved.
    #[error("Inventory error: {0}")]
    Inventory(String),

    /// Invalid engine configuration or invocation parameters.
    #[error("Invalid configuration: {0}")]
    Config(String),

    // ========================================================================
    // Device Errors
    // ========================================================================
    /// Transport failure, refused connection, auth failure or timeout.
    #[error("Cannot reach '{host}': {message}")]
    Connectivity {
        /// Target host
        host: String,
        /// Error message
        message: String,
    },

    /// The device is locked by another user or has uncommitted changes.
    #[error("Precondition failed on '{host}': {message}")]
    Precondition {
        /// Target host
        host: String,
        /// Error message
        message: String,
    },

    /// The device rejected the staged statements.
    #[error("Device '{host}' rejected statement '{statement}': {message}")]
    Load {
        /// Target host
        host: String,
        /// First offending statement
        statement: String,
        /// Device diagnostic
        message: String,
    },

    /// A commit variant failed on the device.
    #[error("Commit failed on '{host}': {message}")]
    Commit {
        /// Target host
        host: String,
        /// Device diagnostic
        message: String,
    },

    /// Fetching a running configuration for comparison failed.
    #[error("Comparison failed: {0}")]
    Comparison(String),

    /// Writing a configuration backup failed.
    #[error("Backup failed for '{host}': {message}")]
    Backup {
        /// Target host
        host: String,
        /// Error message
        message: String,
    },

    /// An outcome slot was written twice.
    #[error("Outcome for {0} already recorded")]
    DuplicateOutcome(String),

    // ========================================================================
    // I/O Errors
    // ========================================================================
    /// Failed to read a file.
    #[error("Failed to read '{path}': {source}")]
    FileRead {
        /// Path that failed
        path: PathBuf,
        /// Source error
        #[source]
        source: std::io::Error,
    },

    /// Generic I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fieldless discriminant of [`Error`], recorded in device outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input configuration
    Validation,
    /// Inventory resolution failure
    Inventory,
    /// Invalid configuration
    Config,
    /// Transport failure or timeout
    Connectivity,
    /// Device locked or holding pending changes
    Precondition,
    /// Device rejected staged statements
    Load,
    /// Commit call failed
    Commit,
    /// Compare fetch failure
    Comparison,
    /// Backup could not be written
    Backup,
    /// Internal bookkeeping error
    Internal,
    /// Local I/O failure
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Inventory => "InventoryError",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Connectivity => "ConnectivityError",
            ErrorKind::Precondition => "PreconditionError",
            ErrorKind::Load => "LoadError",
            ErrorKind::Commit => "CommitError",
            ErrorKind::Comparison => "ComparisonError",
            ErrorKind::Backup => "BackupError",
            ErrorKind::Internal => "InternalError",
            ErrorKind::Io => "IoError",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Create a validation error from collected per-line problems.
    pub fn validation(message: impl Into<String>, problems: Vec<String>) -> Self {
        Error::Validation {
            message: message.into(),
            problems,
        }
    }

    /// Create a connectivity error.
    pub fn connectivity(host: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Connectivity {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create a precondition error.
    pub fn precondition(host: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Precondition {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create a load error naming the first offending statement.
    pub fn load(
        host: impl Into<String>,
        statement: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Load {
            host: host.into(),
            statement: statement.into(),
            message: message.into(),
        }
    }

    /// Create a commit error.
    pub fn commit(host: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Commit {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create a backup error.
    pub fn backup(host: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Backup {
            host: host.into(),
            message: message.into(),
        }
    }

    /// The error's kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Inventory(_) => ErrorKind::Inventory,
            Error::Config(_) => ErrorKind::Config,
            Error::Connectivity { .. } => ErrorKind::Connectivity,
            Error::Precondition { .. } => ErrorKind::Precondition,
            Error::Load { .. } => ErrorKind::Load,
            Error::Commit { .. } => ErrorKind::Commit,
            Error::Comparison(_) => ErrorKind::Comparison,
            Error::Backup { .. } => ErrorKind::Backup,
            Error::DuplicateOutcome(_) => ErrorKind::Internal,
            Error::FileRead { .. } | Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether the error aborts the whole invocation rather than one device.
    pub fn is_invocation_fatal(&self) -> bool {
        matches!(
            self,
            Error::Validation { .. } | Error::Inventory(_) | Error::Config(_)
        )
    }
}
