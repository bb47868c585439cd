//! Operation executor.
//!
//! Drives each device of a group through its [`DeviceState`] machine:
//!
//! 1. connect
//! 2. check lock status (skipped for compare)
//! 3. back up the running configuration, when asked to
//! 4. stage the statements, or `rollback 1` for a generation rollback
//! 5. run the commit variant of the operation
//! 6. release the session
//!
//! Release always runs once a session is open, on success and failure
//! alike. In parallel mode each device runs in its own task; in sequential
//! mode node1 finishes before node2 starts. Either way one device failing
//! never cancels the other, and every device ends with exactly one
//! [`DeviceOutcome`].

pub mod state;

pub use state::{DeviceFlow, DeviceState};

use crate::backup::{BackupRecord, BackupStore};
use crate::device::{DeviceSession, DeviceTransport};
use crate::diff::{ConfigDiff, DiffEngine};
use crate::error::{Error, Result};
use crate::inventory::{DeviceRole, DeviceTarget};
use crate::operation::{CommitWindow, OperationKind, OperationRequest};
use crate::preflight::{bounded, PreflightReport};
use crate::report::{DeviceOutcome, ReportCollector, RunReport};
use crate::validator::{invert, ConfigurationStatement};
use chrono::Utc;
use futures::future::join_all;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

fn timed_out(what: &str, timeout: Duration) -> String {
    format!("{} timed out after {}s", what, timeout.as_secs())
}

/// Everything a device flow accumulates besides its state.
#[derive(Debug, Default)]
struct Progress {
    diagnostics: Vec<String>,
    backup: Option<BackupRecord>,
    commit_window: Option<CommitWindow>,
    plan: Option<Vec<String>>,
}

impl Progress {
    fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!("{}", message);
        self.diagnostics.push(message);
    }

    fn finish(
        self,
        target: &DeviceTarget,
        flow: &DeviceFlow,
        started: Instant,
        error: Option<Error>,
        released: bool,
    ) -> DeviceOutcome {
        let success = error.is_none() && flow.state() != DeviceState::Failed;
        DeviceOutcome {
            host: target.host.clone(),
            role: target.role,
            success,
            final_state: flow.final_state(),
            transitions: flow.history().to_vec(),
            released,
            elapsed: started.elapsed(),
            diagnostics: self.diagnostics,
            error_kind: error.as_ref().map(Error::kind),
            error: error.map(|e| e.to_string()),
            backup: self.backup,
            commit_window: self.commit_window,
            plan: self.plan,
        }
    }
}

/// Statements to stage: the file itself, or its inverse for a rollback.
fn effective_statements(request: &OperationRequest) -> Cow<'_, [ConfigurationStatement]> {
    if request.kind == OperationKind::Rollback {
        Cow::Owned(invert(&request.statements))
    } else {
        Cow::Borrowed(&request.statements)
    }
}

fn record(collector: &ReportCollector, outcome: DeviceOutcome) {
    let host = outcome.host.clone();
    if let Err(e) = collector.record(outcome) {
        error!(host = %host, error = %e, "Dropping second outcome");
    }
}

/// Executes one [`OperationRequest`] against a device pair.
#[derive(Clone)]
pub struct OperationExecutor {
    transport: Arc<dyn DeviceTransport>,
    backup_store: Option<Arc<dyn BackupStore>>,
    diff: DiffEngine,
    strict: bool,
}

impl OperationExecutor {
    /// Create an executor over `transport`.
    pub fn new(transport: Arc<dyn DeviceTransport>) -> Self {
        Self {
            transport,
            backup_store: None,
            diff: DiffEngine::default(),
            strict: false,
        }
    }

    /// Where to persist pre-change backups.
    pub fn with_backup_store(mut self, store: Arc<dyn BackupStore>) -> Self {
        self.backup_store = Some(store);
        self
    }

    /// Diff engine used by compare.
    pub fn with_diff_engine(mut self, diff: DiffEngine) -> Self {
        self.diff = diff;
        self
    }

    /// Treat preflight warnings as blocking.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Execute without a preflight gate.
    pub async fn execute(&self, request: &OperationRequest) -> RunReport {
        self.execute_with_preflight(request, None).await
    }

    /// Execute, skipping mutating work on devices whose preflight blocks.
    #[instrument(skip(self, request, preflight), fields(group = %request.group.name, operation = %request.kind))]
    pub async fn execute_with_preflight(
        &self,
        request: &OperationRequest,
        preflight: Option<&PreflightReport>,
    ) -> RunReport {
        let started_at = Utc::now();
        let started = Instant::now();

        if request.kind == OperationKind::Compare {
            let (outcomes, compare) = self.compare(request).await;
            return RunReport {
                group: request.group.name.clone(),
                operation: request.kind,
                dry_run: request.flags.dry_run,
                started_at,
                elapsed: started.elapsed(),
                outcomes,
                compare,
            };
        }

        info!(
            devices = %request.group.iter().map(|d| d.host.as_str()).collect::<Vec<_>>().join(", "),
            parallel = request.flags.parallel,
            dry_run = request.flags.dry_run,
            "Starting operation"
        );

        let collector = Arc::new(ReportCollector::new());
        let mut runnable = Vec::with_capacity(2);
        for target in request.group.iter() {
            let blocked = preflight
                .filter(|_| request.kind.is_mutating())
                .and_then(|p| p.result(target.role))
                .filter(|r| r.blocks(self.strict));
            if let Some(result) = blocked {
                let err = result.blocking_error();
                warn!(host = %target.host, error = %err, "Preflight blocks device");
                record(&collector, DeviceOutcome::not_started(target, &err));
            } else {
                runnable.push(target.clone());
            }
        }

        if request.flags.parallel {
            let request = Arc::new(request.clone());
            let handles: Vec<_> = runnable
                .into_iter()
                .map(|target| {
                    let executor = self.clone();
                    let request = Arc::clone(&request);
                    let collector = Arc::clone(&collector);
                    tokio::spawn(async move {
                        let outcome = executor.run_device(&request, &target).await;
                        record(&collector, outcome);
                    })
                })
                .collect();

            for joined in join_all(handles).await {
                if let Err(e) = joined {
                    error!("Device task aborted: {}", e);
                }
            }
        } else {
            for target in runnable {
                let outcome = self.run_device(request, &target).await;
                record(&collector, outcome);
            }
        }

        // An aborted task leaves its slot empty
        for target in request.group.iter() {
            if collector.get(target.role).is_none() {
                record(
                    &collector,
                    DeviceOutcome::aborted(target, "device task ended without an outcome"),
                );
            }
        }

        let outcomes = match Arc::try_unwrap(collector) {
            Ok(collector) => collector.into_outcomes(),
            Err(shared) => DeviceRole::BOTH
                .iter()
                .filter_map(|role| shared.get(*role).cloned())
                .collect(),
        };

        let report = RunReport {
            group: request.group.name.clone(),
            operation: request.kind,
            dry_run: request.flags.dry_run,
            started_at,
            elapsed: started.elapsed(),
            outcomes,
            compare: None,
        };
        info!(status = ?report.status(), elapsed_ms = report.elapsed.as_millis() as u64, "Operation finished");
        report
    }

    #[instrument(skip(self, request, target), fields(host = %target.host, role = %target.role))]
    async fn run_device(&self, request: &OperationRequest, target: &DeviceTarget) -> DeviceOutcome {
        let started = Instant::now();
        let timeout = request.flags.timeout();
        let mut flow = DeviceFlow::new(&target.host);
        let mut progress = Progress::default();

        let mut session = match self.open(target, timeout).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Connect failed");
                flow.fail();
                return progress.finish(target, &flow, started, Some(e), false);
            }
        };
        flow.advance(DeviceState::Connected);

        let result = self
            .drive(session.as_mut(), request, &mut flow, &mut progress)
            .await;
        if let Err(e) = &result {
            warn!(error = %e, state = %flow.state(), "Device operation failed");
            flow.fail();
        }

        let released = self.release(session.as_mut(), timeout, &mut progress).await;
        if result.is_ok() {
            flow.advance(DeviceState::Released);
        }

        let outcome = progress.finish(target, &flow, started, result.err(), released);
        info!(
            success = outcome.success,
            final_state = %outcome.final_state,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "Device finished"
        );
        outcome
    }

    async fn drive(
        &self,
        session: &mut dyn DeviceSession,
        request: &OperationRequest,
        flow: &mut DeviceFlow,
        progress: &mut Progress,
    ) -> Result<()> {
        let host = session.target().host.clone();
        let timeout = request.flags.timeout();

        let lock = bounded(timeout, session.check_lock_status(), || {
            Error::connectivity(&host, timed_out("lock status query", timeout))
        })
        .await?;
        if !lock.is_unlocked() {
            return Err(Error::precondition(&host, format!("configuration is {}", lock)));
        }
        flow.advance(DeviceState::Locked);

        if request.flags.dry_run {
            let plan = plan(request, session.target(), self.backup_store.is_some());
            progress.note(format!("dry run: {} step(s) planned, nothing applied", plan.len()));
            progress.plan = Some(plan);
            return Ok(());
        }

        if request.kind.is_mutating() && request.flags.backup {
            self.backup(session, timeout, progress).await?;
        }

        let loaded = if request.kind == OperationKind::Rollback && !request.is_file_rollback() {
            bounded(timeout, session.rollback(1), || {
                Error::load(&host, "rollback 1", timed_out("rollback", timeout))
            })
            .await
        } else {
            let statements = effective_statements(request);
            let first = statements.first().map(|s| s.text.clone()).unwrap_or_default();
            bounded(timeout, session.load_statements(&statements), || {
                Error::load(&host, first, timed_out("load", timeout))
            })
            .await
        };
        if let Err(e) = loaded {
            discard(session, timeout, progress).await;
            return Err(e);
        }
        flow.advance(DeviceState::Loaded);
        progress.note(match request.kind {
            OperationKind::Rollback if !request.is_file_rollback() => {
                "staged previous configuration generation".to_string()
            }
            _ => format!("staged {} statement(s)", request.statements.len()),
        });

        if request.kind == OperationKind::Check {
            let checked = bounded(timeout, session.commit_check(), || {
                Error::commit(&host, timed_out("commit check", timeout))
            })
            .await;
            discard(session, timeout, progress).await;
            let checked = checked?;
            if !checked.passed {
                return Err(Error::commit(
                    &host,
                    format!("commit check failed: {}", checked.message.trim()),
                ));
            }
            progress.note("commit check passed");
            flow.advance(DeviceState::CheckedOnly);
            return Ok(());
        }

        let minutes = request.flags.confirm_minutes;
        let applied = if request.kind == OperationKind::CommitConfirmed {
            match tokio::time::timeout(timeout, session.commit_confirmed(minutes)).await {
                Ok(result) => result,
                Err(_) => {
                    // The device may have committed before the reply was lost
                    warn!(host = %host, minutes, "Commit confirmed timed out");
                    progress.note(format!(
                        "commit confirmed may have been applied: a {} minute confirmation window may be open, check the device and confirm or let it roll back",
                        minutes
                    ));
                    Err(Error::commit(&host, timed_out("commit confirmed", timeout)))
                }
            }
        } else {
            bounded(timeout, session.commit(), || {
                Error::commit(&host, timed_out("commit", timeout))
            })
            .await
        };
        let committed = match applied {
            Ok(committed) => committed,
            Err(e) => {
                discard(session, timeout, progress).await;
                return Err(e);
            }
        };

        match request.kind {
            OperationKind::CommitConfirmed => {
                let window = CommitWindow::open(committed.committed_at, minutes);
                progress.note(format!(
                    "commit confirmed; reverts at {} unless confirmed",
                    window.deadline.format("%H:%M:%S UTC")
                ));
                progress.commit_window = Some(window);
                flow.advance(DeviceState::ConfirmedPending);
            }
            OperationKind::Rollback => {
                progress.note("rollback committed");
                flow.advance(DeviceState::RolledBack);
            }
            _ => {
                progress.note("commit complete");
                flow.advance(DeviceState::Committed);
            }
        }
        Ok(())
    }

    async fn backup(
        &self,
        session: &mut dyn DeviceSession,
        timeout: Duration,
        progress: &mut Progress,
    ) -> Result<()> {
        let host = session.target().host.clone();
        let store = self
            .backup_store
            .clone()
            .ok_or_else(|| Error::backup(&host, "no backup store configured"))?;

        let running = bounded(timeout, session.fetch_running_config(), || {
            Error::backup(&host, timed_out("configuration fetch", timeout))
        })
        .await
        .map_err(|e| match e {
            Error::Backup { .. } => e,
            other => Error::backup(&host, other.to_string()),
        })?;

        // File I/O stays off the runtime threads
        let target = session.target().clone();
        let record = tokio::task::spawn_blocking(move || store.save(&target, &running))
            .await
            .map_err(|e| Error::backup(&host, format!("backup task failed: {}", e)))??;
        progress.note(format!("backup saved to {}", record.path.display()));
        progress.backup = Some(record);
        Ok(())
    }

    async fn open(&self, target: &DeviceTarget, timeout: Duration) -> Result<Box<dyn DeviceSession>> {
        bounded(timeout, self.transport.connect(target, timeout), || {
            Error::connectivity(&target.host, timed_out("connect", timeout))
        })
        .await
    }

    async fn release(
        &self,
        session: &mut dyn DeviceSession,
        timeout: Duration,
        progress: &mut Progress,
    ) -> bool {
        let host = session.target().host.clone();
        match bounded(timeout, session.release(), || {
            Error::connectivity(&host, timed_out("release", timeout))
        })
        .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(host = %host, error = %e, "Release failed");
                progress.note(format!("release failed: {}", e));
                false
            }
        }
    }

    /// Fetch and diff both running configurations. Neither device is locked.
    async fn compare(&self, request: &OperationRequest) -> (Vec<DeviceOutcome>, Option<ConfigDiff>) {
        let started = Instant::now();
        let timeout = request.flags.timeout();
        let [node1, node2] = request.group.devices();

        let (first, second) = if request.flags.parallel {
            futures::join!(self.open(node1, timeout), self.open(node2, timeout))
        } else {
            let first = self.open(node1, timeout).await;
            (first, self.open(node2, timeout).await)
        };

        let mut flows = [DeviceFlow::new(&node1.host), DeviceFlow::new(&node2.host)];
        let mut progress = [Progress::default(), Progress::default()];

        match (first, second) {
            (Ok(mut a), Ok(mut b)) => {
                flows[0].advance(DeviceState::Connected);
                flows[1].advance(DeviceState::Connected);

                let diff = self.diff.compare(a.as_mut(), b.as_mut(), timeout).await;
                let released = [
                    self.release(a.as_mut(), timeout, &mut progress[0]).await,
                    self.release(b.as_mut(), timeout, &mut progress[1]).await,
                ];

                match diff {
                    Ok(diff) => {
                        let [p1, p2] = progress;
                        let mut outcomes = Vec::with_capacity(2);
                        for (i, (target, mut p)) in [(node1, p1), (node2, p2)].into_iter().enumerate() {
                            flows[i].advance(DeviceState::Released);
                            p.note(format!(
                                "{} line(s) compared, {} unique, {} similar",
                                if i == 0 { diff.summary.total_a } else { diff.summary.total_b },
                                if i == 0 { diff.summary.unique_a } else { diff.summary.unique_b },
                                diff.summary.similar_pairs
                            ));
                            outcomes.push(p.finish(target, &flows[i], started, None, released[i]));
                        }
                        (outcomes, Some(diff))
                    }
                    Err(e) => {
                        warn!(error = %e, "Comparison failed");
                        let [p1, p2] = progress;
                        let mut outcomes = Vec::with_capacity(2);
                        for (i, (target, p)) in [(node1, p1), (node2, p2)].into_iter().enumerate() {
                            flows[i].fail();
                            let err = Error::Comparison(e.to_string());
                            outcomes.push(p.finish(target, &flows[i], started, Some(err), released[i]));
                        }
                        (outcomes, None)
                    }
                }
            }
            (first, second) => {
                let [p1, p2] = progress;
                let [f1, f2] = &mut flows;
                let outcomes = vec![
                    self.compare_leftover(node1, node2, first, f1, p1, started, timeout).await,
                    self.compare_leftover(node2, node1, second, f2, p2, started, timeout).await,
                ];
                (outcomes, None)
            }
        }
    }

    /// Outcome of one side of a compare whose peer (or itself) never connected.
    #[allow(clippy::too_many_arguments)]
    async fn compare_leftover(
        &self,
        target: &DeviceTarget,
        peer: &DeviceTarget,
        connected: Result<Box<dyn DeviceSession>>,
        flow: &mut DeviceFlow,
        mut progress: Progress,
        started: Instant,
        timeout: Duration,
    ) -> DeviceOutcome {
        match connected {
            Ok(mut session) => {
                flow.advance(DeviceState::Connected);
                flow.fail();
                let released = self.release(session.as_mut(), timeout, &mut progress).await;
                let err = Error::Comparison(format!("peer {} unavailable", peer.host));
                progress.finish(target, flow, started, Some(err), released)
            }
            Err(e) => {
                flow.fail();
                progress.finish(target, flow, started, Some(e), false)
            }
        }
    }
}

async fn discard(session: &mut dyn DeviceSession, timeout: Duration, progress: &mut Progress) {
    let host = session.target().host.clone();
    match bounded(timeout, session.discard_changes(), || {
        Error::commit(&host, timed_out("discard", timeout))
    })
    .await
    {
        Ok(()) => debug!(host = %host, "Candidate discarded"),
        Err(e) => {
            warn!(host = %host, error = %e, "Failed to discard candidate");
            progress.note(format!("discard failed: {}", e));
        }
    }
}

/// What a dry run would do on `target` after the lock check.
fn plan(request: &OperationRequest, target: &DeviceTarget, has_store: bool) -> Vec<String> {
    let mut steps = Vec::new();
    if request.kind.is_mutating() && request.flags.backup {
        if has_store {
            steps.push(format!("back up running configuration of {}", target.host));
        } else {
            steps.push("back up running configuration (no backup store configured)".to_string());
        }
    }

    if request.kind == OperationKind::Rollback && !request.is_file_rollback() {
        steps.push("stage rollback 1".to_string());
    } else {
        let statements = effective_statements(request);
        steps.push(format!("stage {} statement(s):", statements.len()));
        steps.extend(statements.iter().map(|s| format!("  {}", s.text)));
    }

    steps.push(match request.kind {
        OperationKind::Check => "commit check, then discard the candidate".to_string(),
        OperationKind::CommitConfirmed => {
            format!("commit confirmed {}", request.flags.confirm_minutes)
        }
        _ => "commit".to_string(),
    });
    steps.push("release session".to_string());
    steps
}
