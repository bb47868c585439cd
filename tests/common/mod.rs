//! Shared test utilities and fixtures for the junos-push test suite.
//!
//! This module provides:
//! - An in-memory Junos device ([`MockDevice`]) with call counters
//! - A [`MockTransport`] handing out sessions to those devices
//! - Builders for groups, statements, requests and inventory files
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tempfile::TempDir;

use junos_push::device::{
    CommitResult, DeviceSession, DeviceTransport, LockState, ValidationResult,
};
use junos_push::error::{Error, Result};
use junos_push::inventory::{Credentials, DeviceGroup, DeviceRole, DeviceTarget};
use junos_push::operation::{OperationKind, OperationRequest, RunFlags};
use junos_push::validator::{ConfigurationStatement, StatementKind};

pub const NODE1: &str = "10.0.0.1";
pub const NODE2: &str = "10.0.0.2";

// ============================================================================
// Mock Device
// ============================================================================

/// Tracks how many device calls are in progress across all devices.
#[derive(Debug, Default)]
pub struct Concurrency {
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
}

impl Concurrency {
    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Highest number of simultaneous calls seen.
    pub fn max(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// An in-memory Junos device.
///
/// Commits apply staged `set`/`delete` statements to the running
/// configuration, so tests can assert on the resulting state.
#[derive(Debug)]
pub struct MockDevice {
    pub host: String,
    lock_state: RwLock<LockState>,
    running: RwLock<Vec<String>>,
    history: RwLock<Vec<Vec<String>>>,
    candidate: RwLock<Option<Vec<String>>>,
    loaded: RwLock<Vec<String>>,
    calls: RwLock<Vec<String>>,
    delay: RwLock<Duration>,
    concurrency: RwLock<Option<Arc<Concurrency>>>,

    pub fail_connect: AtomicBool,
    pub fail_fetch: AtomicBool,
    pub fail_load: AtomicBool,
    pub fail_commit: AtomicBool,
    pub reject_check: AtomicBool,
    pub hang_commit: AtomicBool,

    pub connects: AtomicU32,
    pub lock_checks: AtomicU32,
    pub fetches: AtomicU32,
    pub loads: AtomicU32,
    pub commit_checks: AtomicU32,
    pub commits: AtomicU32,
    pub commit_confirmeds: AtomicU32,
    pub rollbacks: AtomicU32,
    pub discards: AtomicU32,
    pub releases: AtomicU32,
    pub last_confirm_minutes: AtomicU32,
}

impl MockDevice {
    /// Create an unlocked device with an empty running configuration.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            lock_state: RwLock::new(LockState::Unlocked),
            running: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
            candidate: RwLock::new(None),
            loaded: RwLock::new(Vec::new()),
            calls: RwLock::new(Vec::new()),
            delay: RwLock::new(Duration::ZERO),
            concurrency: RwLock::new(None),
            fail_connect: AtomicBool::new(false),
            fail_fetch: AtomicBool::new(false),
            fail_load: AtomicBool::new(false),
            fail_commit: AtomicBool::new(false),
            reject_check: AtomicBool::new(false),
            hang_commit: AtomicBool::new(false),
            connects: AtomicU32::new(0),
            lock_checks: AtomicU32::new(0),
            fetches: AtomicU32::new(0),
            loads: AtomicU32::new(0),
            commit_checks: AtomicU32::new(0),
            commits: AtomicU32::new(0),
            commit_confirmeds: AtomicU32::new(0),
            rollbacks: AtomicU32::new(0),
            discards: AtomicU32::new(0),
            releases: AtomicU32::new(0),
            last_confirm_minutes: AtomicU32::new(0),
        }
    }

    /// Replace the running configuration.
    pub fn with_running(self, lines: &[&str]) -> Self {
        *self.running.write() = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    /// Set the lock state reported to the engine.
    pub fn set_lock_state(&self, state: LockState) {
        *self.lock_state.write() = state;
    }

    /// Sleep this long inside every call.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.write() = delay;
    }

    /// Flip a failure switch.
    pub fn set(&self, flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
    }

    pub fn running(&self) -> Vec<String> {
        self.running.read().clone()
    }

    pub fn loaded(&self) -> Vec<String> {
        self.loaded.read().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.read().clone()
    }

    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    /// Number of calls that could change the device.
    pub fn mutating_calls(&self) -> u32 {
        Self::count(&self.loads)
            + Self::count(&self.commits)
            + Self::count(&self.commit_confirmeds)
            + Self::count(&self.rollbacks)
            + Self::count(&self.commit_checks)
    }

    async fn call(&self, name: &str) {
        self.calls.write().push(name.to_string());
        let concurrency = self.concurrency.read().clone();
        if let Some(c) = &concurrency {
            c.enter();
        }
        let delay = *self.delay.read();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(c) = &concurrency {
            c.exit();
        }
    }

    fn apply_candidate(&self) {
        let candidate = self.candidate.write().take().unwrap_or_default();
        let mut running = self.running.write();
        self.history.write().push(running.clone());

        if let Some(first) = candidate.first() {
            if let Some(rest) = first.strip_prefix("#rollback ") {
                let steps: usize = rest.parse().unwrap_or(1);
                let history = self.history.read();
                let index = history.len().saturating_sub(steps + 1);
                *running = history.get(index).cloned().unwrap_or_default();
                return;
            }
        }

        for text in candidate {
            let stmt = ConfigurationStatement::new(0, text);
            match stmt.kind {
                StatementKind::Set => {
                    if !running.contains(&stmt.text) {
                        running.push(stmt.text.clone());
                    }
                }
                StatementKind::Delete => {
                    let exact = format!("set {}", stmt.path());
                    let below = format!("{} ", exact);
                    running.retain(|line| *line != exact && !line.starts_with(&below));
                }
                _ => {}
            }
        }
    }
}

// ============================================================================
// Mock Session
// ============================================================================

pub struct MockSession {
    device: Arc<MockDevice>,
    target: DeviceTarget,
}

#[async_trait]
impl DeviceSession for MockSession {
    fn target(&self) -> &DeviceTarget {
        &self.target
    }

    async fn check_lock_status(&mut self) -> Result<LockState> {
        self.device.call("check_lock_status").await;
        self.device.lock_checks.fetch_add(1, Ordering::SeqCst);
        Ok(*self.device.lock_state.read())
    }

    async fn fetch_running_config(&mut self) -> Result<Vec<String>> {
        self.device.call("fetch_running_config").await;
        self.device.fetches.fetch_add(1, Ordering::SeqCst);
        if self.device.fail_fetch.load(Ordering::SeqCst) {
            return Err(Error::connectivity(&self.device.host, "show configuration failed"));
        }
        Ok(self.device.running())
    }

    async fn load_statements(&mut self, statements: &[ConfigurationStatement]) -> Result<()> {
        self.device.call("load_statements").await;
        self.device.loads.fetch_add(1, Ordering::SeqCst);
        let texts: Vec<String> = statements.iter().map(|s| s.text.clone()).collect();
        *self.device.loaded.write() = texts.clone();
        if self.device.fail_load.load(Ordering::SeqCst) {
            let first = texts.first().cloned().unwrap_or_default();
            return Err(Error::load(&self.device.host, first, "syntax error"));
        }
        *self.device.candidate.write() = Some(texts);
        Ok(())
    }

    async fn commit_check(&mut self) -> Result<ValidationResult> {
        self.device.call("commit_check").await;
        self.device.commit_checks.fetch_add(1, Ordering::SeqCst);
        let passed = !self.device.reject_check.load(Ordering::SeqCst);
        Ok(ValidationResult {
            passed,
            message: if passed {
                "configuration check succeeds".into()
            } else {
                "error: commit failed: (missing mandatory statements)".into()
            },
        })
    }

    async fn commit(&mut self) -> Result<CommitResult> {
        self.device.call("commit").await;
        self.device.commits.fetch_add(1, Ordering::SeqCst);
        if self.device.hang_commit.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if self.device.fail_commit.load(Ordering::SeqCst) {
            return Err(Error::commit(&self.device.host, "error: configuration check-out failed"));
        }
        self.device.apply_candidate();
        Ok(CommitResult {
            committed_at: Utc::now(),
            confirm_minutes: None,
            message: "commit complete".into(),
        })
    }

    async fn commit_confirmed(&mut self, minutes: u32) -> Result<CommitResult> {
        self.device.call("commit_confirmed").await;
        self.device.commit_confirmeds.fetch_add(1, Ordering::SeqCst);
        self.device
            .last_confirm_minutes
            .store(minutes, Ordering::SeqCst);
        if self.device.hang_commit.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if self.device.fail_commit.load(Ordering::SeqCst) {
            return Err(Error::commit(&self.device.host, "error: commit confirmed failed"));
        }
        self.device.apply_candidate();
        Ok(CommitResult {
            committed_at: Utc::now(),
            confirm_minutes: Some(minutes),
            message: "commit complete".into(),
        })
    }

    async fn rollback(&mut self, steps: u32) -> Result<()> {
        self.device.call("rollback").await;
        self.device.rollbacks.fetch_add(1, Ordering::SeqCst);
        *self.device.candidate.write() = Some(vec![format!("#rollback {}", steps)]);
        Ok(())
    }

    async fn discard_changes(&mut self) -> Result<()> {
        self.device.call("discard_changes").await;
        self.device.discards.fetch_add(1, Ordering::SeqCst);
        *self.device.candidate.write() = None;
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        self.device.call("release").await;
        self.device.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Mock Transport
// ============================================================================

/// Hands out sessions to [`MockDevice`]s by host.
#[derive(Debug, Default)]
pub struct MockTransport {
    devices: HashMap<String, Arc<MockDevice>>,
    pub concurrency: Arc<Concurrency>,
}

impl MockTransport {
    /// A transport for two default devices.
    pub fn pair() -> Self {
        Self::with_devices(MockDevice::new(NODE1), MockDevice::new(NODE2))
    }

    /// A transport for the given devices.
    pub fn with_devices(node1: MockDevice, node2: MockDevice) -> Self {
        let concurrency = Arc::new(Concurrency::default());
        let mut devices = HashMap::new();
        for device in [node1, node2] {
            *device.concurrency.write() = Some(Arc::clone(&concurrency));
            devices.insert(device.host.clone(), Arc::new(device));
        }
        Self {
            devices,
            concurrency,
        }
    }

    pub fn device(&self, host: &str) -> &MockDevice {
        &self.devices[host]
    }

    pub fn node1(&self) -> &MockDevice {
        self.device(NODE1)
    }

    pub fn node2(&self) -> &MockDevice {
        self.device(NODE2)
    }
}

#[async_trait]
impl DeviceTransport for MockTransport {
    async fn connect(
        &self,
        target: &DeviceTarget,
        _timeout: Duration,
    ) -> Result<Box<dyn DeviceSession>> {
        let device = self
            .devices
            .get(&target.host)
            .cloned()
            .ok_or_else(|| Error::connectivity(&target.host, "no such device"))?;
        device.connects.fetch_add(1, Ordering::SeqCst);
        if device.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::connectivity(&target.host, "Connection refused"));
        }
        Ok(Box::new(MockSession {
            device,
            target: target.clone(),
        }))
    }

    async fn probe(&self, target: &DeviceTarget, _timeout: Duration) -> Result<Duration> {
        match self.devices.get(&target.host) {
            Some(device) if !device.fail_connect.load(Ordering::SeqCst) => {
                Ok(Duration::from_millis(1))
            }
            _ => Err(Error::connectivity(&target.host, "port 22 unreachable")),
        }
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn group() -> DeviceGroup {
    let creds = Credentials::new("netops", "secret");
    DeviceGroup::new(
        "core",
        DeviceTarget::new(NODE1, creds.clone(), "core", DeviceRole::Node1),
        DeviceTarget::new(NODE2, creds, "core", DeviceRole::Node2),
    )
}

pub fn statements(lines: &[&str]) -> Vec<ConfigurationStatement> {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| ConfigurationStatement::new(i + 1, *line))
        .collect()
}

pub fn request(kind: OperationKind, lines: &[&str]) -> OperationRequest {
    request_with(kind, lines, RunFlags::default())
}

pub fn request_with(kind: OperationKind, lines: &[&str], flags: RunFlags) -> OperationRequest {
    OperationRequest::new(group(), statements(lines), kind, flags).expect("valid request")
}

pub fn flags(f: impl FnOnce(&mut RunFlags)) -> RunFlags {
    let mut flags = RunFlags::default();
    f(&mut flags);
    flags
}

/// A temp dir holding an inventory and a configuration file.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("temp dir"),
        }
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        let mut file = std::fs::File::create(&path).expect("create file");
        file.write_all(content.as_bytes()).expect("write file");
        path
    }

    /// An inventory with group `core` pointing at the mock devices.
    pub fn inventory(&self) -> PathBuf {
        self.write(
            "config.ini",
            &format!(
                "[settings]\nuser = netops\npassword = secret\nbackup_dir = {}\n\n\
                 [ignore_those_lines_in_compare]\n1 = last-changed\n\n\
                 [core]\nr1 = {}\nr2 = {}\n\n[lonely]\nr3 = 10.0.0.3\n",
                self.dir.path().join("backups").display(),
                NODE1,
                NODE2
            ),
        )
    }
}
