//! Configuration file validation.
//!
//! Turns the raw content of a Junos "set" file into an ordered list of
//! [`ConfigurationStatement`]s plus statistics and warnings. Validation is a
//! pure transform: it never touches a device or the filesystem (except
//! [`ConfigValidator::validate_file`], which only reads the input).
//!
//! # Accepted grammar
//!
//! Every non-blank, non-comment line must start with `set` or `delete`.
//! Comments start with `#`; inline comments outside double quotes are
//! stripped. Whitespace runs are collapsed, CRLF and LF are both accepted.
//!
//! ```rust
//! use junos_push::validator::ConfigValidator;
//!
//! let validated = ConfigValidator::new()
//!     .validate("# core vlan\nset vlans core vlan-id 100\n")
//!     .unwrap();
//! assert_eq!(validated.statements.len(), 1);
//! assert_eq!(validated.stats.comment_lines, 1);
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// Top-level Junos hierarchies recognised without a warning.
const KNOWN_HIERARCHIES: &[&str] = &[
    "interfaces",
    "protocols",
    "routing-options",
    "policy-options",
    "firewall",
    "security",
    "system",
    "chassis",
    "forwarding-options",
    "class-of-service",
    "access",
    "ethernet-switching-options",
    "vlans",
    "switch-options",
    "poe",
    "virtual-chassis",
    "snmp",
    "services",
    "applications",
    "groups",
    "apply-groups",
    "routing-instances",
    "policy-statement",
];

// ============================================================================
// Statement Types
// ============================================================================

/// Classification of one input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    /// `set ...` statement
    Set,
    /// `delete ...` statement
    Delete,
    /// Comment line (`# ...`)
    Comment,
    /// Empty or whitespace-only line
    Blank,
    /// Anything else; rejected by validation
    Other,
}

impl StatementKind {
    /// Classify a cleaned line by its first token.
    pub fn classify(cleaned: &str) -> Self {
        if cleaned.is_empty() {
            return StatementKind::Blank;
        }
        if cleaned.starts_with('#') {
            return StatementKind::Comment;
        }
        match cleaned.split_whitespace().next().map(str::to_lowercase).as_deref() {
            Some("set") => StatementKind::Set,
            Some("delete") => StatementKind::Delete,
            _ => StatementKind::Other,
        }
    }

    /// Whether this kind is a configuration statement (set/delete).
    pub fn is_statement(&self) -> bool {
        matches!(self, StatementKind::Set | StatementKind::Delete)
    }
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatementKind::Set => write!(f, "set"),
            StatementKind::Delete => write!(f, "delete"),
            StatementKind::Comment => write!(f, "comment"),
            StatementKind::Blank => write!(f, "blank"),
            StatementKind::Other => write!(f, "other"),
        }
    }
}

/// One normalized configuration statement.
///
/// Immutable once parsed; shared by reference across both device flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationStatement {
    /// 1-based line number in the input file
    pub line_number: usize,
    /// The raw line as read (line ending removed)
    pub raw: String,
    /// Normalized statement text sent to devices
    pub text: String,
    /// Classification tag
    pub kind: StatementKind,
}

impl ConfigurationStatement {
    /// Build a statement from already-normalized text.
    pub fn new(line_number: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            line_number,
            raw: text.clone(),
            kind: StatementKind::classify(&text),
            text,
        }
    }

    /// The configuration path after the verb (`set`/`delete`).
    pub fn path(&self) -> &str {
        self.text
            .split_once(' ')
            .map(|(_, rest)| rest)
            .unwrap_or_default()
    }

    /// The top-level hierarchy (second token), if any.
    pub fn hierarchy(&self) -> Option<&str> {
        self.text.split_whitespace().nth(1)
    }

    /// The inverse statement: `set X` becomes `delete X` and vice versa.
    ///
    /// Non-statement lines are returned unchanged.
    pub fn inverted(&self) -> Self {
        let (kind, verb) = match self.kind {
            StatementKind::Set => (StatementKind::Delete, "delete"),
            StatementKind::Delete => (StatementKind::Set, "set"),
            _ => return self.clone(),
        };
        Self {
            line_number: self.line_number,
            raw: self.raw.clone(),
            text: format!("{} {}", verb, self.path()),
            kind,
        }
    }
}

/// Invert a statement list for undo-this-file rollbacks, preserving order.
pub fn invert(statements: &[ConfigurationStatement]) -> Vec<ConfigurationStatement> {
    statements.iter().map(ConfigurationStatement::inverted).collect()
}

// ============================================================================
// Validation Output
// ============================================================================

/// Summary statistics of a validated file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigStatistics {
    /// Lines in the input
    pub total_lines: usize,
    /// `set` statements
    pub set_commands: usize,
    /// `delete` statements
    pub delete_commands: usize,
    /// Comment lines (including lines that were only an inline comment)
    pub comment_lines: usize,
    /// Blank lines
    pub blank_lines: usize,
    /// Distinct top-level hierarchies touched
    pub unique_hierarchies: usize,
}

impl ConfigStatistics {
    /// Number of configuration statements.
    pub fn statement_count(&self) -> usize {
        self.set_commands + self.delete_commands
    }
}

/// The result of validating a configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedConfig {
    /// Set/delete statements in file order
    pub statements: Vec<ConfigurationStatement>,
    /// Line statistics
    pub stats: ConfigStatistics,
    /// Non-fatal findings
    pub warnings: Vec<String>,
}

// ============================================================================
// Validator
// ============================================================================

/// Validates and cleans Junos "set" configuration files.
#[derive(Debug, Clone)]
pub struct ConfigValidator {
    known_hierarchies: HashSet<&'static str>,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidator {
    /// Create a validator with the built-in hierarchy list.
    pub fn new() -> Self {
        Self {
            known_hierarchies: KNOWN_HIERARCHIES.iter().copied().collect(),
        }
    }

    /// Read and validate a configuration file.
    ///
    /// Files that are not valid UTF-8 are decoded as Latin-1.
    pub fn validate_file(&self, path: &Path) -> Result<ValidatedConfig> {
        if !path.is_file() {
            return Err(Error::validation(
                format!("Configuration file not found: {}", path.display()),
                vec![],
            ));
        }
        let bytes = std::fs::read(path).map_err(|source| Error::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = bytes.len(), "Validating configuration file");
        self.validate(&decode_config_bytes(bytes))
    }

    /// Validate configuration content.
    pub fn validate(&self, content: &str) -> Result<ValidatedConfig> {
        let mut statements = Vec::new();
        let mut stats = ConfigStatistics::default();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut hierarchies = HashSet::new();

        for (index, raw) in content.lines().enumerate() {
            let line_number = index + 1;
            let raw = raw.trim_end_matches('\r');
            stats.total_lines += 1;

            if raw.trim().is_empty() {
                stats.blank_lines += 1;
                continue;
            }
            if raw.trim_start().starts_with('#') {
                stats.comment_lines += 1;
                continue;
            }

            let cleaned = clean_line(raw);
            if cleaned.is_empty() {
                stats.comment_lines += 1;
                continue;
            }

            if raw.ends_with(' ') || raw.ends_with('\t') {
                warnings.push(format!("Line {}: Trailing whitespace detected", line_number));
            }

            let statement = ConfigurationStatement {
                line_number,
                raw: raw.to_string(),
                kind: StatementKind::classify(&cleaned),
                text: cleaned,
            };

            match statement.kind {
                StatementKind::Set => stats.set_commands += 1,
                StatementKind::Delete => stats.delete_commands += 1,
                _ => {}
            }

            self.check_statement(&statement, &mut errors, &mut warnings);

            if let Some(hierarchy) = statement.hierarchy() {
                hierarchies.insert(hierarchy.to_string());
            }
            statements.push(statement);
        }

        stats.unique_hierarchies = hierarchies.len();

        if !errors.is_empty() {
            return Err(Error::validation(
                format!("{} error(s) in configuration", errors.len()),
                errors,
            ));
        }
        if statements.is_empty() {
            return Err(Error::validation(
                "Configuration file is empty after removing comments and blank lines",
                vec![],
            ));
        }

        warnings.extend(conflicting_statements(&statements));

        debug!(
            statements = statements.len(),
            warnings = warnings.len(),
            "Configuration validated"
        );

        Ok(ValidatedConfig {
            statements,
            stats,
            warnings,
        })
    }

    /// Grammar checks for a single classified statement.
    fn check_statement(
        &self,
        statement: &ConfigurationStatement,
        errors: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) {
        let line = statement.line_number;
        let tokens: Vec<&str> = statement.text.split_whitespace().collect();

        match statement.kind {
            StatementKind::Set => {
                if tokens.len() < 3 {
                    errors.push(format!(
                        "Line {}: Set command too short - missing configuration hierarchy",
                        line
                    ));
                    return;
                }
            }
            StatementKind::Delete => {
                if tokens.len() < 2 {
                    errors.push(format!("Line {}: Incomplete delete command", line));
                    return;
                }
            }
            _ => {
                errors.push(format!(
                    "Line {}: Invalid command '{}' - must start with: set, delete",
                    line,
                    tokens.first().copied().unwrap_or_default()
                ));
                return;
            }
        }

        if statement.text.matches('"').count() % 2 != 0 {
            errors.push(format!("Line {}: Unmatched quotes in configuration", line));
            return;
        }
        if statement.text.matches('[').count() != statement.text.matches(']').count() {
            errors.push(format!("Line {}: Unmatched brackets in configuration", line));
            return;
        }

        if statement.text.contains("..") {
            warnings.push(format!(
                "Line {}: Double dots (..) in configuration path - verify this is intended",
                line
            ));
        }

        if let Some(hierarchy) = statement.hierarchy() {
            if !self
                .known_hierarchies
                .iter()
                .any(|known| hierarchy.starts_with(known))
            {
                warnings.push(format!(
                    "Line {}: Unrecognized configuration hierarchy '{}' - verify this is correct",
                    line, hierarchy
                ));
            }
        }
    }
}

/// Flag `delete` statements that remove a path the same file also sets.
fn conflicting_statements(statements: &[ConfigurationStatement]) -> Vec<String> {
    let sets: HashMap<&str, usize> = statements
        .iter()
        .filter(|s| s.kind == StatementKind::Set)
        .map(|s| (s.path(), s.line_number))
        .collect();

    let mut warnings = Vec::new();
    for delete in statements.iter().filter(|s| s.kind == StatementKind::Delete) {
        let path = delete.path();
        let clash = sets
            .iter()
            .filter(|(set_path, _)| *set_path == &path || set_path.starts_with(&format!("{} ", path)))
            .map(|(_, line)| *line)
            .min();
        if let Some(set_line) = clash {
            warnings.push(format!(
                "Line {}: delete of '{}' overlaps set on line {} - mixed set/delete without context",
                delete.line_number, path, set_line
            ));
        }
    }
    warnings
}

/// Strip inline comments outside quotes and collapse whitespace.
fn clean_line(raw: &str) -> String {
    let mut in_quotes = false;
    let mut end = raw.len();
    for (i, c) in raw.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => {
                end = i;
                break;
            }
            _ => {}
        }
    }
    raw[..end].split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode file bytes as UTF-8, falling back to Latin-1.
pub fn decode_config_bytes(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => e.into_bytes().iter().map(|&b| b as char).collect(),
    }
}
