//! End-to-end invocation: inventory, validation, preflight, execution.
//!
//! [`PushRunner::prepare`] does everything that can fail before a device is
//! contacted; its errors abort the invocation. [`PushRunner::execute`] never
//! fails as a whole: device problems end up in the [`RunReport`].

use crate::backup::{BackupStore, FsBackupStore};
use crate::config::Config;
use crate::device::DeviceTransport;
use crate::diff::{DiffEngine, IgnoreList};
use crate::error::{Error, Result};
use crate::executor::OperationExecutor;
use crate::inventory::Inventory;
use crate::operation::{OperationKind, OperationRequest, RunFlags};
use crate::preflight::{PreflightChecker, PreflightReport};
use crate::report::RunReport;
use crate::validator::{ConfigValidator, ValidatedConfig};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Invocation parameters.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Inventory group to target
    pub group: String,
    /// Configuration file of set/delete statements
    pub config_file: Option<PathBuf>,
    /// Operation to run
    pub operation: OperationKind,
    /// Inventory file
    pub inventory: PathBuf,
    /// Connect and check only
    pub dry_run: bool,
    /// Verbose diagnostics
    pub verbose: bool,
    /// Drive both devices concurrently
    pub parallel: bool,
    /// Back up before mutating
    pub backup: bool,
    /// Per-call timeout override, seconds
    pub timeout: Option<u64>,
    /// Commit-confirmed window override, minutes
    pub confirm_minutes: Option<u32>,
    /// Treat preflight warnings as failures
    pub strict: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            group: String::new(),
            config_file: None,
            operation: OperationKind::Check,
            inventory: PathBuf::from("config.ini"),
            dry_run: false,
            verbose: false,
            parallel: false,
            backup: false,
            timeout: None,
            confirm_minutes: None,
            strict: false,
        }
    }
}

/// Everything resolved before any device is contacted.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    /// Effective configuration
    pub config: Config,
    /// The request to execute
    pub request: OperationRequest,
    /// Validation result of the configuration file
    pub validated: Option<ValidatedConfig>,
    /// Compare ignore list
    pub ignore: IgnoreList,
}

/// Everything an invocation produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    /// Validation result of the configuration file
    pub validation: Option<ValidatedConfig>,
    /// Preflight results, for non-compare operations
    pub preflight: Option<PreflightReport>,
    /// Execution report
    pub report: RunReport,
}

/// Runs one invocation against a device transport.
pub struct PushRunner {
    transport: Arc<dyn DeviceTransport>,
    backup_store: Option<Arc<dyn BackupStore>>,
}

impl PushRunner {
    /// Create a runner over `transport`.
    pub fn new(transport: Arc<dyn DeviceTransport>) -> Self {
        Self {
            transport,
            backup_store: None,
        }
    }

    /// Use `store` instead of a file store in the configured backup directory.
    pub fn with_backup_store(mut self, store: Arc<dyn BackupStore>) -> Self {
        self.backup_store = Some(store);
        self
    }

    /// Load the inventory, validate the file and build the request.
    pub fn prepare(&self, options: &RunOptions) -> Result<PreparedRun> {
        let inventory = Inventory::load(&options.inventory)?;

        let mut config = Config::from_inventory(&inventory);
        if let Some(timeout) = options.timeout {
            config.timeout = timeout;
        }
        if let Some(minutes) = options.confirm_minutes {
            config.confirm_minutes = minutes;
        }
        config.strict_preflight |= options.strict;
        config.validate()?;

        let group = inventory.resolve_group(&options.group)?;

        let validated = match (&options.config_file, options.operation) {
            (Some(path), OperationKind::Compare) => {
                warn!(path = %path.display(), "Compare ignores the configuration file");
                None
            }
            (Some(path), _) => Some(ConfigValidator::new().validate_file(path)?),
            (None, kind) if kind.requires_config_file() => {
                return Err(Error::Config(format!(
                    "Operation '{}' requires a configuration file (-c)",
                    kind
                )));
            }
            (None, _) => None,
        };

        if let Some(validated) = &validated {
            for warning in &validated.warnings {
                warn!("{}", warning);
            }
        }

        let flags = RunFlags {
            dry_run: options.dry_run,
            backup: options.backup,
            parallel: options.parallel,
            verbose: options.verbose,
            timeout_secs: config.timeout,
            confirm_minutes: config.confirm_minutes,
        };
        let statements = validated
            .as_ref()
            .map(|v| v.statements.clone())
            .unwrap_or_default();
        let request = OperationRequest::new(group, statements, options.operation, flags)?;
        let ignore = IgnoreList::new(&config.ignore_patterns)?;

        info!(
            group = %request.group.name,
            operation = %request.kind,
            statements = request.statements.len(),
            "Invocation prepared"
        );

        Ok(PreparedRun {
            config,
            request,
            validated,
            ignore,
        })
    }

    /// Run preflight (except for compare) and execute the request.
    pub async fn execute(&self, prepared: &PreparedRun) -> RunOutput {
        let request = &prepared.request;
        let store = self.backup_store.clone().unwrap_or_else(|| {
            Arc::new(FsBackupStore::new(prepared.config.backup_dir.clone())) as Arc<dyn BackupStore>
        });

        let executor = OperationExecutor::new(Arc::clone(&self.transport))
            .with_backup_store(store)
            .with_diff_engine(DiffEngine::new(prepared.ignore.clone()))
            .with_strict(prepared.config.strict_preflight);

        let preflight = if request.kind == OperationKind::Compare {
            None
        } else {
            let checker = PreflightChecker::new(Arc::clone(&self.transport))
                .with_ignore_list(prepared.ignore.clone())
                .with_strict(prepared.config.strict_preflight);
            Some(checker.check(request).await)
        };

        let report = executor
            .execute_with_preflight(request, preflight.as_ref())
            .await;

        RunOutput {
            validation: prepared.validated.clone(),
            preflight,
            report,
        }
    }

    /// [`prepare`](Self::prepare) then [`execute`](Self::execute).
    pub async fn run(&self, options: &RunOptions) -> Result<RunOutput> {
        let prepared = self.prepare(options)?;
        Ok(self.execute(&prepared).await)
    }
}
