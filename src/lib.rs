//! # junos-push - Configuration Push for Junos Device Pairs
//!
//! junos-push validates a file of Junos `set`/`delete` statements and
//! applies it to the two devices of an inventory group (typically a
//! redundant pair) with a safety-first sequence: validate, preflight,
//! optional backup, stage, commit variant, release.
//!
//! ## Core Concepts
//!
//! - **Device group**: exactly two devices, `node1` and `node2`
//! - **Operations**: `check`, `commit`, `commit-confirmed`, `rollback`, `compare`
//! - **Preflight**: read-only reachability, lock and existence checks
//! - **Outcomes**: every device ends with exactly one [`report::DeviceOutcome`]
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         CLI Interface                         │
//! │                  (clap-based argument parsing)                │
//! └──────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          PushRunner                           │
//! │        inventory -> validator -> preflight -> executor        │
//! └──────────────────────────────────────────────────────────────┘
//!          │                     │                     │
//!          ▼                     ▼                     ▼
//! ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐
//! │   DiffEngine    │   │  BackupStore    │   │ DeviceTransport │
//! │   (compare)     │   │  (snapshots)    │   │  (sessions)     │
//! └─────────────────┘   └─────────────────┘   └─────────────────┘
//!                                                      │
//!                                                      ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │              Junos CLI over SSH (russh connection)            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use junos_push::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let runner = PushRunner::new(Arc::new(JunosCliTransport::new()));
//!     let output = runner
//!         .run(&RunOptions {
//!             group: "core".into(),
//!             config_file: Some("change.set".into()),
//!             operation: OperationKind::CommitConfirmed,
//!             ..Default::default()
//!         })
//!         .await?;
//!
//!     for line in output.report.summary_lines() {
//!         println!("{}", line);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    // Connection types
    #[cfg(feature = "russh")]
    pub use crate::connection::RusshConnection;
    pub use crate::connection::{
        CommandResult, Connection, ConnectionConfig, ConnectionError, ConnectionResult,
        ExecuteOptions,
    };

    // Device capabilities
    pub use crate::device::{
        DeviceSession, DeviceTransport, JunosCliTransport, LockState, ValidationResult,
    };

    // Error handling
    pub use crate::error::{Error, ErrorKind, Result};

    // Inventory
    pub use crate::inventory::{Credentials, DeviceGroup, DeviceRole, DeviceTarget, Inventory};

    // Requests and execution
    pub use crate::executor::{DeviceState, OperationExecutor};
    pub use crate::operation::{CommitWindow, OperationKind, OperationRequest, RunFlags};
    pub use crate::preflight::{PreflightChecker, PreflightReport, Verdict};
    pub use crate::report::{DeviceOutcome, RunReport, RunStatus};
    pub use crate::runner::{PushRunner, RunOptions};

    // Configuration files
    pub use crate::validator::{ConfigValidator, ConfigurationStatement, ValidatedConfig};

    // Compare and backups
    pub use crate::backup::{BackupStore, FsBackupStore};
    pub use crate::diff::{ConfigDiff, DiffEngine, IgnoreList};
}

// ============================================================================
// Core Modules
// ============================================================================

/// Error types and result aliases.
///
/// [`Error`](error::Error) covers every failure; [`ErrorKind`](error::ErrorKind)
/// is its fieldless tag as recorded in device outcomes.
pub mod error;

/// Engine configuration layered from defaults, inventory, environment and CLI.
pub mod config;

/// Operation kinds, invocation flags and the commit-confirmed window.
pub mod operation;

/// Configuration file validation and normalization.
pub mod validator;

/// Device inventory: INI groups of exactly two devices.
pub mod inventory;

// ============================================================================
// Infrastructure
// ============================================================================

/// SSH command execution.
///
/// Provides the [`Connection`](connection::Connection) trait and its russh
/// implementation.
pub mod connection;

/// Device capability traits and the Junos CLI session.
pub mod device;

/// Pre-change configuration snapshots.
pub mod backup;

/// Running-configuration comparison with ignore lists and similar-line pairing.
pub mod diff;

// ============================================================================
// Execution Engine
// ============================================================================

/// Read-only checks run before an operation.
pub mod preflight;

/// Per-device state machines and the operation executor.
pub mod executor;

/// Device outcomes and run reports.
pub mod report;

/// End-to-end invocation.
pub mod runner;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
