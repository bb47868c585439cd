//! Per-device outcomes and the run report.
//!
//! Every request resolves to exactly one [`DeviceOutcome`] per device. The
//! [`ReportCollector`] holds one write-once slot per role, so a device
//! cannot be reported twice even when both devices finish concurrently.

use crate::backup::BackupRecord;
use crate::diff::ConfigDiff;
use crate::error::{Error, ErrorKind, Result};
use crate::executor::DeviceState;
use crate::inventory::{DeviceRole, DeviceTarget};
use crate::operation::{CommitWindow, CommitWindowState, OperationKind};
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happened on one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceOutcome {
    /// Device address
    pub host: String,
    /// Role within the group
    pub role: DeviceRole,
    /// Whether the operation succeeded on this device
    pub success: bool,
    /// Last state reached before release
    pub final_state: DeviceState,
    /// Every state visited
    pub transitions: Vec<DeviceState>,
    /// Whether the session was released
    pub released: bool,
    /// Wall time spent on this device
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
    /// Human-readable notes, in order
    pub diagnostics: Vec<String>,
    /// Error message, on failure
    pub error: Option<String>,
    /// Error kind, on failure
    pub error_kind: Option<ErrorKind>,
    /// Backup written before mutating
    pub backup: Option<BackupRecord>,
    /// Open confirmation window, for commit-confirmed
    pub commit_window: Option<CommitWindow>,
    /// What a dry run would have done
    pub plan: Option<Vec<String>>,
}

impl DeviceOutcome {
    fn unstarted(target: &DeviceTarget, message: String, kind: ErrorKind) -> Self {
        Self {
            host: target.host.clone(),
            role: target.role,
            success: false,
            final_state: DeviceState::Failed,
            transitions: vec![DeviceState::Idle, DeviceState::Failed],
            released: false,
            elapsed: Duration::ZERO,
            diagnostics: Vec::new(),
            error: Some(message),
            error_kind: Some(kind),
            backup: None,
            commit_window: None,
            plan: None,
        }
    }

    /// An outcome for a device that never got past `Idle`.
    pub fn not_started(target: &DeviceTarget, error: &Error) -> Self {
        Self::unstarted(target, error.to_string(), error.kind())
    }

    /// An outcome for a device whose task ended without reporting.
    pub fn aborted(target: &DeviceTarget, message: impl Into<String>) -> Self {
        Self::unstarted(target, message.into(), ErrorKind::Internal)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Write-once outcome slots, one per role.
#[derive(Debug, Default)]
pub struct ReportCollector {
    slots: [OnceCell<DeviceOutcome>; 2],
}

impl ReportCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a device's outcome.
    ///
    /// Fails with [`Error::DuplicateOutcome`] if the role already has one.
    pub fn record(&self, outcome: DeviceOutcome) -> Result<()> {
        let role = outcome.role;
        self.slots[role.index()]
            .set(outcome)
            .map_err(|_| Error::DuplicateOutcome(role.to_string()))
    }

    /// The outcome recorded for `role`, if any.
    pub fn get(&self, role: DeviceRole) -> Option<&DeviceOutcome> {
        self.slots[role.index()].get()
    }

    /// Whether both slots are filled.
    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(|slot| slot.get().is_some())
    }

    /// Take the recorded outcomes, node1 first.
    pub fn into_outcomes(self) -> Vec<DeviceOutcome> {
        self.slots
            .into_iter()
            .filter_map(|slot| slot.into_inner())
            .collect()
    }
}

/// Overall result classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every device succeeded
    Success,
    /// One device succeeded, the other failed
    PartialFailure,
    /// No device succeeded
    Failure,
}

/// Result of one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Group name
    pub group: String,
    /// Operation that ran
    pub operation: OperationKind,
    /// Whether this was a dry run
    pub dry_run: bool,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Total wall time
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
    /// One outcome per device, node1 first
    pub outcomes: Vec<DeviceOutcome>,
    /// Diff, for compare
    pub compare: Option<ConfigDiff>,
}

impl RunReport {
    /// Whether every device succeeded.
    pub fn all_succeeded(&self) -> bool {
        !self.outcomes.is_empty() && self.outcomes.iter().all(|o| o.success)
    }

    /// Classify the run.
    pub fn status(&self) -> RunStatus {
        let succeeded = self.outcomes.iter().filter(|o| o.success).count();
        if succeeded == self.outcomes.len() && succeeded > 0 {
            RunStatus::Success
        } else if succeeded == 0 {
            RunStatus::Failure
        } else {
            RunStatus::PartialFailure
        }
    }

    /// Whether one device changed and the other did not.
    pub fn is_partial_failure(&self) -> bool {
        self.status() == RunStatus::PartialFailure
    }

    /// Outcome for `role`.
    pub fn outcome(&self, role: DeviceRole) -> Option<&DeviceOutcome> {
        self.outcomes.iter().find(|o| o.role == role)
    }

    /// Failed outcomes.
    pub fn failures(&self) -> impl Iterator<Item = &DeviceOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }

    /// Devices left with a commit that reverts unless confirmed.
    pub fn open_commit_windows(&self) -> Vec<(&str, &CommitWindow)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.commit_window.as_ref().map(|w| (o.host.as_str(), w)))
            .filter(|(_, w)| w.state == CommitWindowState::Pending)
            .collect()
    }

    /// Re-check every confirmation window against `now`.
    pub fn observe_commit_windows(&mut self, now: DateTime<Utc>) {
        for window in self.outcomes.iter_mut().filter_map(|o| o.commit_window.as_mut()) {
            window.observe(now);
        }
    }

    /// Process exit code: 0 only if every device succeeded.
    pub fn exit_code(&self) -> i32 {
        if self.all_succeeded() {
            0
        } else {
            1
        }
    }

    /// Short closing lines for the operator.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let succeeded = self.outcomes.iter().filter(|o| o.success).count();
        lines.push(format!(
            "{} on group '{}': {}/{} device(s) succeeded in {:.1}s",
            self.operation,
            self.group,
            succeeded,
            self.outcomes.len(),
            self.elapsed.as_secs_f64()
        ));

        if self.is_partial_failure() && self.operation.is_mutating() && !self.dry_run {
            let changed: Vec<&str> = self
                .outcomes
                .iter()
                .filter(|o| o.success)
                .map(|o| o.host.as_str())
                .collect();
            lines.push(format!(
                "Group is inconsistent: {} changed, the peer did not. Roll back or re-run.",
                changed.join(", ")
            ));
        }

        let now = Utc::now();
        for outcome in &self.outcomes {
            let Some(window) = &outcome.commit_window else {
                continue;
            };
            match window.state {
                CommitWindowState::Pending => lines.push(format!(
                    "{} will roll back automatically at {} unless confirmed with a plain commit ({} minute(s) left)",
                    outcome.host,
                    window.deadline.format("%Y-%m-%d %H:%M:%S UTC"),
                    window.remaining(now).num_minutes().max(1)
                )),
                CommitWindowState::AutoRolledBack => lines.push(format!(
                    "{}: confirmation window closed at {}; the device has likely rolled back",
                    outcome.host,
                    window.deadline.format("%Y-%m-%d %H:%M:%S UTC")
                )),
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::Credentials;

    fn outcome(role: DeviceRole, success: bool) -> DeviceOutcome {
        let target = DeviceTarget::new(
            format!("10.0.0.{}", role.index() + 1),
            Credentials::new("u", "p"),
            "core",
            role,
        );
        let mut outcome = DeviceOutcome::not_started(&target, &Error::commit("x", "boom"));
        outcome.success = success;
        outcome
    }

    fn report(outcomes: Vec<DeviceOutcome>) -> RunReport {
        RunReport {
            group: "core".into(),
            operation: OperationKind::Commit,
            dry_run: false,
            started_at: Utc::now(),
            elapsed: Duration::from_millis(1500),
            outcomes,
            compare: None,
        }
    }

    #[test]
    fn test_duplicate_outcome_rejected() {
        let collector = ReportCollector::new();
        collector.record(outcome(DeviceRole::Node1, true)).unwrap();
        let err = collector.record(outcome(DeviceRole::Node1, false)).unwrap_err();
        assert!(matches!(err, Error::DuplicateOutcome(_)));
        assert!(collector.get(DeviceRole::Node1).unwrap().success);
        assert!(!collector.is_complete());
    }

    #[test]
    fn test_outcomes_in_role_order() {
        let collector = ReportCollector::new();
        collector.record(outcome(DeviceRole::Node2, false)).unwrap();
        collector.record(outcome(DeviceRole::Node1, true)).unwrap();
        assert!(collector.is_complete());
        let outcomes = collector.into_outcomes();
        assert_eq!(outcomes[0].role, DeviceRole::Node1);
        assert_eq!(outcomes[1].role, DeviceRole::Node2);
    }

    #[test]
    fn test_status_classification() {
        let ok = report(vec![outcome(DeviceRole::Node1, true), outcome(DeviceRole::Node2, true)]);
        assert_eq!(ok.status(), RunStatus::Success);
        assert_eq!(ok.exit_code(), 0);

        let partial = report(vec![outcome(DeviceRole::Node1, true), outcome(DeviceRole::Node2, false)]);
        assert!(partial.is_partial_failure());
        assert_eq!(partial.exit_code(), 1);
        assert!(partial.summary_lines().iter().any(|l| l.contains("inconsistent")));

        let failed = report(vec![outcome(DeviceRole::Node1, false), outcome(DeviceRole::Node2, false)]);
        assert_eq!(failed.status(), RunStatus::Failure);
    }

    #[test]
    fn test_open_window_warning() {
        let mut first = outcome(DeviceRole::Node1, true);
        first.commit_window = Some(CommitWindow::open(Utc::now(), 5));
        let rep = report(vec![first, outcome(DeviceRole::Node2, true)]);
        assert_eq!(rep.open_commit_windows().len(), 1);
        assert!(rep
            .summary_lines()
            .iter()
            .any(|l| l.contains("roll back automatically")));
    }

    #[test]
    fn test_report_serializes() {
        let rep = report(vec![outcome(DeviceRole::Node1, true)]);
        let json = serde_json::to_value(&rep).unwrap();
        assert_eq!(json["elapsed"], 1500);
        assert_eq!(json["operation"], "commit");
    }

    #[test]
    fn test_expired_window_is_no_longer_open() {
        let committed_at = Utc::now() - chrono::Duration::minutes(10);
        let mut expired = outcome(DeviceRole::Node1, true);
        expired.commit_window = Some(CommitWindow::open(committed_at, 5));
        let mut pending = outcome(DeviceRole::Node2, true);
        pending.commit_window = Some(CommitWindow::open(Utc::now(), 5));

        let mut report = report(vec![expired, pending]);
        report.operation = OperationKind::CommitConfirmed;
        assert_eq!(report.open_commit_windows().len(), 2);

        report.observe_commit_windows(Utc::now());
        let open = report.open_commit_windows();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].0, "10.0.0.2");

        let lines = report.summary_lines();
        assert!(lines.iter().any(|l| l.starts_with("10.0.0.1: confirmation window closed")));
        assert!(lines.iter().any(|l| l.starts_with("10.0.0.2 will roll back") && l.contains("minute(s) left")));
    }

}
