//! Read-only checks run against both devices before an operation.
//!
//! Per device, in order, stopping at the first failure:
//!
//! 1. reachability: TCP probe of the management port, then a session
//! 2. lock status: the configuration database must be free
//! 3. existence: how much of the proposed change is already in place
//!
//! The two devices are checked independently; one failing never stops the
//! other from being checked. Nothing is ever written to a device here.

use crate::device::{DeviceSession, DeviceTransport, LockState};
use crate::diff::IgnoreList;
use crate::error::{Error, ErrorKind, Result};
use crate::inventory::{DeviceRole, DeviceTarget};
use crate::operation::{OperationKind, OperationRequest};
use crate::validator::{invert, ConfigurationStatement, StatementKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Preflight classification of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Safe to proceed
    Pass,
    /// May proceed; something deserves attention
    Warn,
    /// Must not proceed
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Warn => write!(f, "WARN"),
            Verdict::Fail => write!(f, "FAIL"),
        }
    }
}

/// How much of a change is already in the running configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistenceStatus {
    /// Nothing is in place yet
    AllNew,
    /// Some statements are already in effect
    PartiallyPresent,
    /// Every statement is already in effect
    FullyPresent,
    /// No statements proposed
    NoChanges,
}

impl fmt::Display for ExistenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExistenceStatus::AllNew => write!(f, "all new"),
            ExistenceStatus::PartiallyPresent => write!(f, "partially present"),
            ExistenceStatus::FullyPresent => write!(f, "fully present"),
            ExistenceStatus::NoChanges => write!(f, "no changes"),
        }
    }
}

/// Proposed statements split by whether their effect is already in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistenceReport {
    /// Number of proposed statements
    pub proposed: usize,
    /// Statements already in effect
    pub present: Vec<String>,
    /// Statements that would change the device
    pub new: Vec<String>,
    /// Classification
    pub status: ExistenceStatus,
}

impl ExistenceReport {
    /// Classify `statements` against the running configuration.
    ///
    /// A `set` is in effect when the exact line is running. A `delete` is
    /// in effect when nothing at or below its path is running.
    pub fn analyze(statements: &[ConfigurationStatement], running: &[&str]) -> Self {
        let running_set: HashSet<&str> = running.iter().copied().collect();
        let mut present = Vec::new();
        let mut new = Vec::new();

        for stmt in statements {
            let in_effect = match stmt.kind {
                StatementKind::Set => running_set.contains(stmt.text.as_str()),
                StatementKind::Delete => {
                    let exact = format!("set {}", stmt.path());
                    let below = format!("{} ", exact);
                    !running
                        .iter()
                        .any(|line| *line == exact || line.starts_with(&below))
                }
                _ => continue,
            };
            if in_effect {
                present.push(stmt.text.clone());
            } else {
                new.push(stmt.text.clone());
            }
        }

        let proposed = present.len() + new.len();
        let status = if proposed == 0 {
            ExistenceStatus::NoChanges
        } else if present.is_empty() {
            ExistenceStatus::AllNew
        } else if new.is_empty() {
            ExistenceStatus::FullyPresent
        } else {
            ExistenceStatus::PartiallyPresent
        };

        Self {
            proposed,
            present,
            new,
            status,
        }
    }
}

/// Preflight result for one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightResult {
    /// Device address
    pub host: String,
    /// Role within the group
    pub role: DeviceRole,
    /// Overall verdict
    pub verdict: Verdict,
    /// Why the verdict is what it is, in check order
    pub reasons: Vec<String>,
    /// Time to reach the device and open a session
    pub response_time: Option<Duration>,
    /// Configuration database status
    pub lock_state: Option<LockState>,
    /// Existence analysis, when statements were proposed
    pub existence: Option<ExistenceReport>,
    /// Error kind behind a `Fail`
    pub error_kind: Option<ErrorKind>,
}

impl PreflightResult {
    fn new(target: &DeviceTarget) -> Self {
        Self {
            host: target.host.clone(),
            role: target.role,
            verdict: Verdict::Pass,
            reasons: Vec::new(),
            response_time: None,
            lock_state: None,
            existence: None,
            error_kind: None,
        }
    }

    fn warn(&mut self, reason: impl Into<String>) {
        self.verdict = self.verdict.max(Verdict::Warn);
        self.reasons.push(reason.into());
    }

    fn fail(&mut self, error: &Error) {
        self.verdict = Verdict::Fail;
        self.error_kind = Some(error.kind());
        self.reasons.push(error.to_string());
    }

    fn note(&mut self, reason: impl Into<String>) {
        self.reasons.push(reason.into());
    }

    /// Whether a mutating operation must not proceed on this device.
    pub fn blocks(&self, strict: bool) -> bool {
        match self.verdict {
            Verdict::Fail => true,
            Verdict::Warn => strict,
            Verdict::Pass => false,
        }
    }

    /// The error a blocked device is reported with.
    pub fn blocking_error(&self) -> Error {
        let message = format!("preflight {}: {}", self.verdict, self.reasons.join("; "));
        match self.error_kind {
            Some(ErrorKind::Connectivity) => Error::connectivity(&self.host, message),
            _ => Error::precondition(&self.host, message),
        }
    }
}

/// Preflight results for both devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightReport {
    /// Operation checked for
    pub operation: OperationKind,
    /// Whether warnings block
    pub strict: bool,
    /// Results, node1 first
    pub results: Vec<PreflightResult>,
}

impl PreflightReport {
    /// Result for `role`.
    pub fn result(&self, role: DeviceRole) -> Option<&PreflightResult> {
        self.results.iter().find(|r| r.role == role)
    }

    /// Worst verdict across both devices.
    pub fn verdict(&self) -> Verdict {
        self.results
            .iter()
            .map(|r| r.verdict)
            .max()
            .unwrap_or(Verdict::Pass)
    }

    /// Whether `role` may run a mutating operation.
    pub fn allows(&self, role: DeviceRole) -> bool {
        self.result(role).map_or(true, |r| !r.blocks(self.strict))
    }
}

/// Runs the read-only preflight sequence.
pub struct PreflightChecker {
    transport: Arc<dyn DeviceTransport>,
    ignore: IgnoreList,
    strict: bool,
}

impl PreflightChecker {
    /// Create a checker.
    pub fn new(transport: Arc<dyn DeviceTransport>) -> Self {
        Self {
            transport,
            ignore: IgnoreList::default(),
            strict: false,
        }
    }

    /// Lines to leave out of the existence check.
    pub fn with_ignore_list(mut self, ignore: IgnoreList) -> Self {
        self.ignore = ignore;
        self
    }

    /// Treat warnings as blocking.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Check both devices of the request's group.
    #[instrument(skip(self, request), fields(group = %request.group.name, operation = %request.kind))]
    pub async fn check(&self, request: &OperationRequest) -> PreflightReport {
        let [node1, node2] = request.group.devices();
        let (first, second) = futures::join!(
            self.check_device(node1, request),
            self.check_device(node2, request)
        );

        let report = PreflightReport {
            operation: request.kind,
            strict: self.strict,
            results: vec![first, second],
        };
        info!(verdict = %report.verdict(), "Preflight complete");
        report
    }

    async fn check_device(&self, target: &DeviceTarget, request: &OperationRequest) -> PreflightResult {
        let mut result = PreflightResult::new(target);
        let timeout = request.flags.timeout();
        let started = Instant::now();

        if let Err(e) = self.transport.probe(target, timeout).await {
            warn!(host = %target.host, error = %e, "Device unreachable");
            result.fail(&e);
            return result;
        }

        let mut session = match bounded(timeout, self.transport.connect(target, timeout), || {
            Error::connectivity(&target.host, format!("connect timed out after {}s", timeout.as_secs()))
        })
        .await
        {
            Ok(session) => session,
            Err(e) => {
                warn!(host = %target.host, error = %e, "Cannot open session");
                result.fail(&e);
                return result;
            }
        };
        let response_time = started.elapsed();
        result.response_time = Some(response_time);
        result.note(format!("reachable in {} ms", response_time.as_millis()));

        self.check_session(session.as_mut(), request, &mut result).await;

        if let Err(e) = bounded(timeout, session.release(), || {
            Error::connectivity(&target.host, "release timed out")
        })
        .await
        {
            warn!(host = %target.host, error = %e, "Failed to release preflight session");
        }

        debug!(host = %target.host, verdict = %result.verdict, "Device preflight done");
        result
    }

    async fn check_session(
        &self,
        session: &mut dyn DeviceSession,
        request: &OperationRequest,
        result: &mut PreflightResult,
    ) {
        let host = session.target().host.clone();
        let timeout = request.flags.timeout();

        let lock = match bounded(timeout, session.check_lock_status(), || {
            Error::connectivity(&host, "lock status query timed out")
        })
        .await
        {
            Ok(lock) => lock,
            Err(e) => {
                result.fail(&e);
                return;
            }
        };
        result.lock_state = Some(lock);
        if !lock.is_unlocked() {
            result.fail(&Error::precondition(&host, format!("configuration is {}", lock)));
            return;
        }

        if request.statements.is_empty() {
            return;
        }

        let running = match bounded(timeout, session.fetch_running_config(), || {
            Error::connectivity(&host, "configuration fetch timed out")
        })
        .await
        {
            Ok(running) => running,
            Err(e) => {
                result.warn(format!("could not check existing configuration: {}", e));
                return;
            }
        };

        let effective = if request.kind == OperationKind::Rollback {
            invert(&request.statements)
        } else {
            request.statements.clone()
        };
        let (kept, _) = self.ignore.filter(&running);
        let existence = ExistenceReport::analyze(&effective, &kept);
        debug!(
            host = %host,
            status = %existence.status,
            present = existence.present.len(),
            new = existence.new.len(),
            "Existence check"
        );

        match (existence.status, request.kind) {
            (ExistenceStatus::FullyPresent, OperationKind::Commit | OperationKind::CommitConfirmed) => {
                result.warn(format!(
                    "all {} statement(s) already in effect; the push would be a no-op",
                    existence.proposed
                ));
            }
            (ExistenceStatus::FullyPresent, OperationKind::Rollback) => {
                result.warn("configuration is already absent; nothing to undo");
            }
            (ExistenceStatus::PartiallyPresent, _) => {
                result.note(format!(
                    "{} of {} statement(s) already in effect",
                    existence.present.len(),
                    existence.proposed
                ));
            }
            (status, _) => result.note(format!("configuration {}", status)),
        }
        result.existence = Some(existence);
    }
}

/// Bound a device call by `timeout`.
pub(crate) async fn bounded<T, F>(
    timeout: Duration,
    call: F,
    on_timeout: impl FnOnce() -> Error,
) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stmts(lines: &[&str]) -> Vec<ConfigurationStatement> {
        lines
            .iter()
            .enumerate()
            .map(|(i, l)| ConfigurationStatement::new(i + 1, *l))
            .collect()
    }

    #[test]
    fn test_existence_all_new() {
        let report = ExistenceReport::analyze(
            &stmts(&["set vlans v10 vlan-id 10"]),
            &["set system host-name r1"],
        );
        assert_eq!(report.status, ExistenceStatus::AllNew);
        assert_eq!(report.new.len(), 1);
    }

    #[test]
    fn test_existence_partial_and_full() {
        let running = ["set vlans v10 vlan-id 10", "set system host-name r1"];
        let partial = ExistenceReport::analyze(
            &stmts(&["set vlans v10 vlan-id 10", "set vlans v20 vlan-id 20"]),
            &running,
        );
        assert_eq!(partial.status, ExistenceStatus::PartiallyPresent);
        assert_eq!(partial.present, vec!["set vlans v10 vlan-id 10"]);

        let full = ExistenceReport::analyze(&stmts(&["set system host-name r1"]), &running);
        assert_eq!(full.status, ExistenceStatus::FullyPresent);
    }

    #[test]
    fn test_existence_delete_semantics() {
        let running = ["set vlans v10 vlan-id 10"];
        let report = ExistenceReport::analyze(
            &stmts(&["delete vlans v10", "delete vlans v20"]),
            &running,
        );
        assert_eq!(report.new, vec!["delete vlans v10"]);
        assert_eq!(report.present, vec!["delete vlans v20"]);
        assert_eq!(report.status, ExistenceStatus::PartiallyPresent);
    }

    #[test]
    fn test_existence_no_statements() {
        let report = ExistenceReport::analyze(&[], &["set a"]);
        assert_eq!(report.status, ExistenceStatus::NoChanges);
    }

    #[test]
    fn test_blocks() {
        let mut result = PreflightResult::new(&DeviceTarget::new(
            "r1",
            crate::inventory::Credentials::new("u", "p"),
            "g",
            DeviceRole::Node1,
        ));
        assert!(!result.blocks(true));
        result.warn("no-op");
        assert!(!result.blocks(false));
        assert!(result.blocks(true));
        result.fail(&Error::precondition("r1", "locked"));
        assert!(result.blocks(false));
        assert!(matches!(result.blocking_error(), Error::Precondition { .. }));
    }
}
