//! Engine configuration for junos-push.
//!
//! [`Config`] is built once at invocation start and passed by reference to
//! every component that needs it. Values are layered in this order, later
//! sources winning:
//! - Built-in defaults
//! - The inventory `[settings]` section
//! - Environment variables (`JUNOS_PUSH_*`)
//! - Command-line arguments

use crate::error::{Error, Result};
use crate::inventory::Inventory;
use crate::operation::{DEFAULT_CONFIRM_MINUTES, DEFAULT_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-call device timeout in seconds
    pub timeout: u64,
    /// Default commit-confirmed window in minutes
    pub confirm_minutes: u32,
    /// Directory for configuration backups
    pub backup_dir: PathBuf,
    /// Treat preflight warnings as failures
    pub strict_preflight: bool,
    /// Lines to ignore when comparing running configurations
    pub ignore_patterns: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT_SECS,
            confirm_minutes: DEFAULT_CONFIRM_MINUTES,
            backup_dir: PathBuf::from("backups"),
            strict_preflight: false,
            ignore_patterns: Vec::new(),
        }
    }
}

impl Config {
    /// Build the configuration from an inventory plus environment overrides.
    pub fn from_inventory(inventory: &Inventory) -> Self {
        let mut config = Config::default();
        let settings = inventory.settings();

        if let Some(dir) = &settings.backup_dir {
            config.backup_dir = dir.clone();
        }
        if let Some(strict) = settings.strict {
            config.strict_preflight = strict;
        }
        config.ignore_patterns = inventory.ignore_patterns().to_vec();

        config.apply_env_overrides();
        config
    }

    /// Apply `JUNOS_PUSH_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(timeout) = std::env::var("JUNOS_PUSH_TIMEOUT") {
            if let Ok(t) = timeout.parse() {
                self.timeout = t;
            }
        }

        if let Ok(minutes) = std::env::var("JUNOS_PUSH_CONFIRM_MINUTES") {
            if let Ok(m) = minutes.parse() {
                self.confirm_minutes = m;
            }
        }

        if let Ok(dir) = std::env::var("JUNOS_PUSH_BACKUP_DIR") {
            self.backup_dir = PathBuf::from(dir);
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.timeout == 0 {
            return Err(Error::Config("timeout must be at least 1 second".into()));
        }
        if !(1..=65535).contains(&self.confirm_minutes) {
            return Err(Error::Config(format!(
                "confirm window must be between 1 and 65535 minutes, got {}",
                self.confirm_minutes
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.timeout, 60);
        assert_eq!(config.confirm_minutes, 5);
        assert_eq!(config.backup_dir, PathBuf::from("backups"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_inventory_settings() {
        let inventory = Inventory::parse(
            "[settings]\nuser=u\npassword=p\nport=830\nbackup_dir=/var/tmp/bk\nstrict=yes\n\
             [ignore_those_lines_in_compare]\nx = last-changed\n",
        )
        .unwrap();
        let config = Config::from_inventory(&inventory);
        if std::env::var("JUNOS_PUSH_BACKUP_DIR").is_err() {
            assert_eq!(config.backup_dir, PathBuf::from("/var/tmp/bk"));
        }
        assert!(config.strict_preflight);
        assert_eq!(config.ignore_patterns, vec!["last-changed".to_string()]);
    }

    #[test]
    fn test_validate_ranges() {
        let config = Config {
            confirm_minutes: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
        let config = Config {
            timeout: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
