//! Output formatting for junos-push
//!
//! Provides colored output, a progress spinner, and JSON output.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use junos_push::diff::{ChangeType, ConfigDiff};
use junos_push::error::ErrorKind;
use junos_push::preflight::{PreflightReport, Verdict};
use junos_push::report::{DeviceOutcome, RunReport, RunStatus};
use junos_push::runner::RunOutput;
use junos_push::validator::ValidatedConfig;
use std::time::{Duration, Instant};

/// Device result status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Operation succeeded without changing the device
    Ok,
    /// Operation changed the device
    Changed,
    /// Operation failed
    Failed,
    /// Device could not be reached
    Unreachable,
}

impl DeviceStatus {
    /// Classify an outcome
    pub fn of(outcome: &DeviceOutcome, report: &RunReport) -> Self {
        if !outcome.success {
            return match outcome.error_kind {
                Some(ErrorKind::Connectivity) => DeviceStatus::Unreachable,
                _ => DeviceStatus::Failed,
            };
        }
        if report.operation.is_mutating() && !report.dry_run {
            DeviceStatus::Changed
        } else {
            DeviceStatus::Ok
        }
    }

    /// Get the colored string representation
    pub fn colored_string(&self) -> String {
        match self {
            DeviceStatus::Ok => "ok".green().to_string(),
            DeviceStatus::Changed => "changed".yellow().to_string(),
            DeviceStatus::Failed => "failed".red().bold().to_string(),
            DeviceStatus::Unreachable => "unreachable".red().bold().to_string(),
        }
    }

    /// Get the plain string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Ok => "ok",
            DeviceStatus::Changed => "changed",
            DeviceStatus::Failed => "failed",
            DeviceStatus::Unreachable => "unreachable",
        }
    }
}

/// Output formatter for different output modes
pub struct OutputFormatter {
    /// Use colored output
    use_color: bool,
    /// JSON output mode
    json_mode: bool,
    /// Verbosity level
    verbosity: u8,
    /// Start time for duration calculations
    start_time: Instant,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(use_color: bool, json_mode: bool, verbosity: u8) -> Self {
        // Respect NO_COLOR environment variable
        let use_color = use_color && std::env::var("NO_COLOR").is_err();
        colored::control::set_override(use_color);

        Self {
            use_color,
            json_mode,
            verbosity,
            start_time: Instant::now(),
        }
    }

    /// Print a banner/header
    pub fn banner(&self, title: &str) {
        if self.json_mode {
            return;
        }

        let line = "=".repeat(title.len() + 4);
        if self.use_color {
            println!("\n{}", line.bright_blue());
            println!("{}", format!("  {}  ", title).bright_blue().bold());
            println!("{}\n", line.bright_blue());
        } else {
            println!("\n{}", line);
            println!("  {}  ", title);
            println!("{}\n", line);
        }
    }

    /// Print a section header
    pub fn section(&self, title: &str) {
        if self.json_mode {
            return;
        }

        if self.use_color {
            println!("\n{}", title.cyan().bold());
            println!("{}", "-".repeat(title.len()).cyan());
        } else {
            println!("\n{}", title);
            println!("{}", "-".repeat(title.len()));
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.json_mode {
            let err = serde_json::json!({
                "type": "error",
                "message": message
            });
            eprintln!("{}", err);
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "ERROR:".red().bold(), message);
        } else {
            eprintln!("ERROR: {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.json_mode {
            let warn = serde_json::json!({
                "type": "warning",
                "message": message
            });
            eprintln!("{}", warn);
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "WARNING:".yellow().bold(), message);
        } else {
            eprintln!("WARNING: {}", message);
        }
    }

    /// Print an info message (respects verbosity)
    pub fn info(&self, message: &str) {
        if self.verbosity < 1 || self.json_mode {
            return;
        }

        if self.use_color {
            println!("{} {}", "INFO:".blue(), message);
        } else {
            println!("INFO: {}", message);
        }
    }

    /// Print a list of items
    pub fn list(&self, title: &str, items: &[String]) {
        if self.json_mode || items.is_empty() {
            return;
        }

        if self.use_color {
            println!("\n{}:", title.bright_white().bold());
        } else {
            println!("\n{}:", title);
        }

        for item in items {
            if self.use_color {
                println!("  {} {}", "-".bright_black(), item);
            } else {
                println!("  - {}", item);
            }
        }
    }

    /// Create a spinner for indeterminate progress
    pub fn create_spinner(&self, message: &str) -> Option<ProgressBar> {
        if self.json_mode {
            return None;
        }

        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .ok()?;
        let sp = ProgressBar::new_spinner();
        sp.set_style(style);
        sp.set_message(message.to_string());
        sp.enable_steady_tick(Duration::from_millis(100));

        Some(sp)
    }

    /// Print the configuration file summary
    pub fn validation(&self, validated: &ValidatedConfig) {
        if self.json_mode {
            return;
        }

        let stats = &validated.stats;
        self.section("CONFIGURATION");
        println!(
            "{} line(s): {} set, {} delete, {} comment, {} blank; {} hierarchy(ies)",
            stats.total_lines,
            stats.set_commands,
            stats.delete_commands,
            stats.comment_lines,
            stats.blank_lines,
            stats.unique_hierarchies
        );
        for warning in &validated.warnings {
            self.warning(warning);
        }
        if self.verbosity >= 1 {
            for stmt in &validated.statements {
                println!("  {:>4}  {}", stmt.line_number, stmt.text);
            }
        }
    }

    /// Print preflight verdicts
    pub fn preflight(&self, report: &PreflightReport) {
        if self.json_mode {
            return;
        }

        self.section("PREFLIGHT");
        for result in &report.results {
            let verdict = if self.use_color {
                match result.verdict {
                    Verdict::Pass => result.verdict.to_string().green().to_string(),
                    Verdict::Warn => result.verdict.to_string().yellow().to_string(),
                    Verdict::Fail => result.verdict.to_string().red().bold().to_string(),
                }
            } else {
                result.verdict.to_string()
            };
            println!("{:<5} {} ({})", verdict, result.host, result.role);
            for reason in &result.reasons {
                println!("      {}", reason);
            }
            if self.verbosity >= 1 {
                if let Some(existence) = &result.existence {
                    for line in &existence.new {
                        println!("      new: {}", line);
                    }
                }
            }
        }
        if report.strict && report.verdict() == Verdict::Warn {
            self.warning("strict mode: preflight warnings block mutating operations");
        }
    }

    /// Print one device result
    pub fn device_result(&self, outcome: &DeviceOutcome, report: &RunReport) {
        let status = DeviceStatus::of(outcome, report);

        let status_str = if self.use_color {
            status.colored_string()
        } else {
            status.as_str().to_string()
        };

        let host_str = if self.use_color {
            outcome.host.bright_white().bold().to_string()
        } else {
            outcome.host.clone()
        };

        print!(
            "{}: [{}] ({}) {} in {}",
            status_str,
            host_str,
            outcome.role,
            outcome.final_state,
            format_duration(outcome.elapsed)
        );
        if let Some(error) = &outcome.error {
            print!(" => {}", error);
        }
        println!();

        if self.verbosity >= 1 {
            for note in &outcome.diagnostics {
                println!("    {}", note.bright_black());
            }
        }
        if let Some(plan) = &outcome.plan {
            for step in plan {
                println!("    would {}", step);
            }
        }
        if let Some(backup) = &outcome.backup {
            println!("    backup: {} ({} bytes)", backup.path.display(), backup.size);
        }
    }

    /// Print a compare diff
    pub fn compare(&self, diff: &ConfigDiff) {
        self.section(&format!("COMPARE [{} <> {}]", diff.host_a, diff.host_b));

        if diff.identical {
            let msg = "Running configurations are identical";
            if self.use_color {
                println!("{}", msg.green().bold());
            } else {
                println!("{}", msg);
            }
        }

        for line in &diff.unique_a {
            let row = format!("- {}", line);
            if self.use_color {
                println!("{}", row.red());
            } else {
                println!("{}", row);
            }
        }
        for line in &diff.unique_b {
            let row = format!("+ {}", line);
            if self.use_color {
                println!("{}", row.green());
            } else {
                println!("{}", row);
            }
        }
        for pair in &diff.similar {
            let words = pair.word_diff(self.use_color);
            println!("~ {}", words.a_highlighted);
            println!("~ {}", words.b_highlighted);
        }

        if self.verbosity >= 1 {
            let only_a = diff.lines.iter().filter(|l| l.change == ChangeType::OnlyA).count();
            let only_b = diff.lines.len() - only_a;
            println!("raw diff: {} line(s) only on {}, {} only on {}", only_a, diff.host_a, only_b, diff.host_b);
        }

        let s = &diff.summary;
        println!(
            "\n{}: {} line(s), {}: {} line(s), {} identical, {} similar pair(s), {} ignored",
            diff.host_a,
            s.total_a,
            diff.host_b,
            s.total_b,
            s.identical,
            s.similar_pairs,
            s.ignored_a + s.ignored_b
        );
        self.list("Sync hints", &diff.sync_hints());
    }

    /// Print the run recap
    pub fn recap(&self, report: &RunReport) {
        let header = if report.dry_run { "DRY RUN RECAP" } else { "RECAP" };
        let stars = "*".repeat(80 - header.len());
        if self.use_color {
            println!("\n{} {}", header.bright_white().bold(), stars.bright_black());
        } else {
            println!("\n{} {}", header, stars);
        }

        for outcome in &report.outcomes {
            self.device_result(outcome, report);
        }

        if let Some(diff) = &report.compare {
            self.compare(diff);
        }

        println!();
        for line in report.summary_lines() {
            println!("{}", line);
        }

        let duration_str = format_duration(self.start_time.elapsed());
        if self.use_color {
            println!("{} {}", "Run took".bright_black(), duration_str.bright_white());
        } else {
            println!("Run took {}", duration_str);
        }

        let (text, ok) = match report.status() {
            RunStatus::Success => ("Operation completed successfully.", true),
            RunStatus::PartialFailure => ("Operation failed on one device.", false),
            RunStatus::Failure => ("Operation failed.", false),
        };
        if self.use_color {
            if ok {
                println!("{}", text.green().bold());
            } else {
                println!("{}", text.red().bold());
            }
        } else {
            println!("{}", text);
        }
    }

    /// Print the whole output as one JSON document
    pub fn json(&self, output: &RunOutput) -> serde_json::Result<()> {
        println!("{}", serde_json::to_string_pretty(output)?);
        Ok(())
    }
}

/// Format a duration as a human-readable string
fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if secs >= 3600 {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;
        format!("{}h {}m {}s", hours, mins, secs)
    } else if secs >= 60 {
        let mins = secs / 60;
        let secs = secs % 60;
        format!("{}m {}s", mins, secs)
    } else if secs > 0 {
        format!("{}.{:03}s", secs, millis)
    } else {
        format!("{}ms", millis)
    }
}
