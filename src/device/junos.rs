//! Junos CLI device session.
//!
//! Drives a Junos device through its CLI over a [`Connection`]. Each call
//! is one `cli -c '...'` invocation. Junos discards a private candidate when
//! configure mode exits, so staged statements are kept locally and replayed
//! in the same script as the commit variant that applies them:
//!
//! ```text
//! cli -c 'configure private; set ...; set ...; commit confirmed 5; exit'
//! ```
//!
//! [`DeviceSession::load_statements`] still sends the statements to the
//! device immediately (followed by `rollback 0`) so syntax rejections
//! surface at load time, before anything is committed.

use super::{CommitResult, DeviceSession, DeviceTransport, LockState, ValidationResult};
use crate::connection::{CommandResult, Connection, ExecuteOptions};
use crate::error::{Error, Result};
use crate::inventory::DeviceTarget;
use crate::validator::ConfigurationStatement;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Output markers of a rejected command.
const REJECTION_MARKERS: &[&str] = &["error:", "syntax error", "unknown command"];

/// Output markers of pending uncommitted changes.
const PENDING_MARKERS: &[&str] = &[
    "configuration has been changed but not committed",
    "uncommitted changes",
    "shared configuration database modified",
];

/// Words that appear in Junos diagnostics but never identify a statement.
const DIAGNOSTIC_NOISE: &[&str] = &["error", "syntax", "expecting", "unknown", "command", "or"];

/// Build a `cli -c` invocation running `commands` in order.
pub fn cli_command(commands: &[&str]) -> String {
    let script = commands.join("; ");
    format!("cli -c '{}'", script.replace('\'', "'\\''"))
}

/// Build a `configure private` script around `commands`.
pub fn configure_script(commands: &[&str]) -> String {
    let mut all = Vec::with_capacity(commands.len() + 2);
    all.push("configure private");
    all.extend_from_slice(commands);
    all.push("exit");
    cli_command(&all)
}

/// The first line of `output` that reports a rejection, with its index.
pub fn find_rejection(output: &str) -> Option<(usize, &str)> {
    output.lines().enumerate().find(|(_, line)| {
        let lower = line.to_lowercase();
        REJECTION_MARKERS.iter().any(|marker| lower.contains(marker))
    })
}

/// Pick the statement a rejection refers to.
///
/// Junos echoes the offending token above its caret line; the first staged
/// statement containing one of the diagnostic's words is reported, falling
/// back to the first statement.
pub fn offending_statement<'a>(output: &str, statements: &'a [String]) -> Option<&'a str> {
    let lines: Vec<&str> = output.lines().collect();
    let (index, _) = find_rejection(output)?;
    let start = index.saturating_sub(2);

    let tokens: Vec<String> = lines[start..=index]
        .iter()
        .flat_map(|line| line.split_whitespace())
        .map(|token| {
            token
                .trim_matches(|c: char| matches!(c, '.' | ',' | ':' | ';' | '\'' | '"' | '^'))
                .to_lowercase()
        })
        .filter(|token| token.len() > 1 && !DIAGNOSTIC_NOISE.contains(&token.as_str()))
        .collect();

    statements
        .iter()
        .find(|statement| {
            statement
                .split_whitespace()
                .skip(1)
                .any(|word| tokens.iter().any(|t| t == &word.to_lowercase()))
        })
        .or_else(|| statements.first())
        .map(String::as_str)
}

/// Classify the output of `configure; show | compare; status; exit`.
pub fn parse_lock_status(output: &str, own_user: &str) -> LockState {
    let lower = output.to_lowercase();

    if lower.contains("locked by") {
        return LockState::LockedByOther;
    }

    let mut in_status = false;
    let mut has_diff = false;
    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("Users currently editing") {
            in_status = true;
            continue;
        }
        if in_status {
            if !trimmed.is_empty() && !trimmed.starts_with('[') {
                let user = trimmed.split_whitespace().next().unwrap_or_default();
                if user != own_user && trimmed.contains("exclusive") {
                    return LockState::LockedByOther;
                }
            }
        } else if trimmed.starts_with("[edit ") || line.starts_with("+ ") || line.starts_with("- ") {
            // `show | compare` output: the shared candidate differs from running
            has_diff = true;
        }
    }

    if has_diff || PENDING_MARKERS.iter().any(|marker| lower.contains(marker)) {
        LockState::PendingChanges
    } else {
        LockState::Unlocked
    }
}

// ============================================================================
// Session
// ============================================================================

/// A Junos CLI session over one connection.
pub struct JunosSession {
    target: DeviceTarget,
    connection: Arc<dyn Connection>,
    timeout: Duration,
    staged: Vec<String>,
    released: bool,
}

impl JunosSession {
    /// Wrap an open connection.
    pub fn new(target: DeviceTarget, connection: Arc<dyn Connection>, timeout: Duration) -> Self {
        Self {
            target,
            connection,
            timeout,
            staged: Vec::new(),
            released: false,
        }
    }

    /// Configuration commands staged for the next commit variant.
    pub fn staged(&self) -> &[String] {
        &self.staged
    }

    fn host(&self) -> &str {
        &self.target.host
    }

    async fn run(&self, command: String) -> std::result::Result<CommandResult, String> {
        trace!(host = %self.host(), command = %command, "Running Junos CLI");
        self.connection
            .execute(
                &command,
                Some(ExecuteOptions::new().with_timeout(self.timeout.as_secs().max(1))),
            )
            .await
            .map_err(|e| e.to_string())
    }

    /// Run the staged commands followed by `tail` inside `configure private`.
    async fn run_staged_with(&self, tail: &str) -> std::result::Result<CommandResult, String> {
        let mut commands: Vec<&str> = self.staged.iter().map(String::as_str).collect();
        commands.push(tail);
        self.run(configure_script(&commands)).await
    }

    /// Send commands to the device and discard them, reporting rejections.
    async fn verify(&self, commands: &[String]) -> Result<()> {
        let mut script: Vec<&str> = commands.iter().map(String::as_str).collect();
        script.push("show | compare");
        script.push("rollback 0");

        let first = commands.first().cloned().unwrap_or_default();
        let result = self
            .run(configure_script(&script))
            .await
            .map_err(|e| Error::load(self.host(), &first, e))?;

        let output = result.combined_output();
        if let Some((_, line)) = find_rejection(&output) {
            let statement = offending_statement(&output, commands).unwrap_or(first.as_str());
            return Err(Error::load(self.host(), statement, line.trim()));
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceSession for JunosSession {
    fn target(&self) -> &DeviceTarget {
        &self.target
    }

    async fn check_lock_status(&mut self) -> Result<LockState> {
        let result = self
            .run(cli_command(&["configure", "show | compare", "status", "exit"]))
            .await
            .map_err(|e| Error::connectivity(self.host(), e))?;

        let state = parse_lock_status(&result.combined_output(), &self.target.credentials.user);
        debug!(host = %self.host(), state = ?state, "Lock status");
        Ok(state)
    }

    async fn fetch_running_config(&mut self) -> Result<Vec<String>> {
        let result = self
            .run(cli_command(&["show configuration | display set | no-more"]))
            .await
            .map_err(|e| Error::connectivity(self.host(), e))?;

        let output = result.combined_output();
        if !result.success {
            let reason = match find_rejection(&output) {
                Some((_, line)) => line.trim().to_string(),
                None if output.trim().is_empty() => format!("exit code {}", result.exit_code),
                None => output.trim().to_string(),
            };
            return Err(Error::connectivity(
                self.host(),
                format!("show configuration failed: {}", reason),
            ));
        }

        Ok(result
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(String::from)
            .collect())
    }

    async fn load_statements(&mut self, statements: &[ConfigurationStatement]) -> Result<()> {
        let commands: Vec<String> = statements.iter().map(|s| s.text.clone()).collect();
        self.verify(&commands).await?;
        debug!(host = %self.host(), count = commands.len(), "Statements staged");
        self.staged.extend(commands);
        Ok(())
    }

    async fn commit_check(&mut self) -> Result<ValidationResult> {
        let result = self
            .run_staged_with("commit check")
            .await
            .map_err(|e| Error::commit(self.host(), e))?;

        let output = result.combined_output();
        let passed = output.contains("configuration check succeeds") && find_rejection(&output).is_none();
        Ok(ValidationResult {
            passed,
            message: output.trim().to_string(),
        })
    }

    async fn commit(&mut self) -> Result<CommitResult> {
        let result = self
            .run_staged_with("commit")
            .await
            .map_err(|e| Error::commit(self.host(), e))?;

        let output = result.combined_output();
        if !output.contains("commit complete") {
            return Err(Error::commit(self.host(), output.trim()));
        }
        self.staged.clear();
        Ok(CommitResult {
            committed_at: Utc::now(),
            confirm_minutes: None,
            message: output.trim().to_string(),
        })
    }

    async fn commit_confirmed(&mut self, minutes: u32) -> Result<CommitResult> {
        let command = format!("commit confirmed {}", minutes);
        let result = self
            .run_staged_with(&command)
            .await
            .map_err(|e| Error::commit(self.host(), e))?;

        let output = result.combined_output();
        if !output.contains("commit complete") {
            return Err(Error::commit(self.host(), output.trim()));
        }
        self.staged.clear();
        Ok(CommitResult {
            committed_at: Utc::now(),
            confirm_minutes: Some(minutes),
            message: output.trim().to_string(),
        })
    }

    async fn rollback(&mut self, steps: u32) -> Result<()> {
        let command = format!("rollback {}", steps);
        self.verify(std::slice::from_ref(&command)).await?;
        self.staged.push(command);
        Ok(())
    }

    async fn discard_changes(&mut self) -> Result<()> {
        self.staged.clear();
        let result = self
            .run(configure_script(&["rollback 0"]))
            .await
            .map_err(|e| Error::commit(self.host(), e))?;
        if let Some((_, line)) = find_rejection(&result.combined_output()) {
            return Err(Error::commit(self.host(), format!("discard failed: {}", line.trim())));
        }
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.staged.clear();
        self.connection
            .close()
            .await
            .map_err(|e| Error::connectivity(self.host(), e.to_string()))
    }
}

impl Drop for JunosSession {
    fn drop(&mut self) {
        if !self.released {
            warn!(host = %self.target.host, "Junos session dropped without release");
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Opens [`JunosSession`]s over SSH.
#[derive(Debug, Clone, Default)]
pub struct JunosCliTransport;

impl JunosCliTransport {
    /// Create the transport.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeviceTransport for JunosCliTransport {
    #[cfg(feature = "russh")]
    async fn connect(
        &self,
        target: &DeviceTarget,
        timeout: Duration,
    ) -> Result<Box<dyn DeviceSession>> {
        use crate::connection::{ConnectionConfig, RusshConnection};

        let config = ConnectionConfig::for_target(target, timeout);
        let connection = RusshConnection::connect(&config)
            .await
            .map_err(|e| Error::connectivity(&target.host, e.to_string()))?;
        Ok(Box::new(JunosSession::new(
            target.clone(),
            Arc::new(connection),
            timeout,
        )))
    }

    #[cfg(not(feature = "russh"))]
    async fn connect(
        &self,
        target: &DeviceTarget,
        _timeout: Duration,
    ) -> Result<Box<dyn DeviceSession>> {
        Err(Error::connectivity(
            &target.host,
            "built without an SSH transport (enable the `russh` feature)",
        ))
    }
}
