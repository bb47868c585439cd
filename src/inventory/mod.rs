//! Device inventory for junos-push.
//!
//! The inventory is an INI file with three kinds of sections:
//!
//! ```ini
//! [settings]
//! user = netops
//! password = secret
//!
//! [ignore_those_lines_in_compare]
//! 1 = last-changed
//! 2 = /^set system host-name /
//!
//! [core]
//! r1 = 10.0.0.1
//! r2 = 10.0.0.2 port=2222
//! ```
//!
//! Every section other than `settings` and `ignore_those_lines_in_compare`
//! is a device group. Group members become `node1` and `node2` in file order.

pub mod group;
pub mod host;

pub use group::DeviceGroup;
pub use host::{Credentials, DeviceRole, DeviceTarget, HostParseError, DEFAULT_SSH_PORT};

use crate::error::{Error, Result};
use crate::validator::decode_config_bytes;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::debug;

const SETTINGS_SECTION: &str = "settings";
const IGNORE_SECTION: &str = "ignore_those_lines_in_compare";

/// Values from the `[settings]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventorySettings {
    /// Shared credentials
    pub credentials: Option<Credentials>,
    /// Default SSH port
    pub port: Option<u16>,
    /// Backup directory
    pub backup_dir: Option<PathBuf>,
    /// Strict preflight
    pub strict: Option<bool>,
}

/// A loaded inventory.
#[derive(Debug, Clone)]
pub struct Inventory {
    settings: InventorySettings,
    ignore_patterns: Vec<String>,
    groups: IndexMap<String, Vec<(String, String)>>,
}

impl Inventory {
    /// Load an inventory file.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            Error::Inventory(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let inventory = Self::parse(&decode_config_bytes(bytes))?;
        debug!(
            path = %path.display(),
            groups = inventory.groups.len(),
            ignore_patterns = inventory.ignore_patterns.len(),
            "Loaded inventory"
        );
        Ok(inventory)
    }

    /// Parse inventory content.
    pub fn parse(content: &str) -> Result<Self> {
        let mut sections: IndexMap<String, Vec<(String, String)>> = IndexMap::new();
        let mut current: Option<String> = None;

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let section = line[1..line.len() - 1].trim().to_string();
                sections.entry(section.clone()).or_default();
                current = Some(section);
                continue;
            }

            let Some(section) = current.as_ref() else {
                return Err(Error::Inventory(format!(
                    "Line {}: entry outside of any section",
                    index + 1
                )));
            };

            let (key, value) = line.split_once('=').ok_or_else(|| {
                Error::Inventory(format!("Line {}: expected 'key = value'", index + 1))
            })?;

            if let Some(entries) = sections.get_mut(section) {
                entries.push((key.trim().to_string(), unquote(value.trim()).to_string()));
            }
        }

        let settings = match sections.shift_remove(SETTINGS_SECTION) {
            Some(entries) => parse_settings(&entries)?,
            None => {
                return Err(Error::Inventory(
                    "Missing [settings] section in inventory".into(),
                ))
            }
        };

        let ignore_patterns = sections
            .shift_remove(IGNORE_SECTION)
            .unwrap_or_default()
            .into_iter()
            .map(|(_, value)| value)
            .filter(|value| !value.is_empty())
            .collect();

        Ok(Self {
            settings,
            ignore_patterns,
            groups: sections,
        })
    }

    /// Settings section values.
    pub fn settings(&self) -> &InventorySettings {
        &self.settings
    }

    /// Ignore-list patterns for compare, in file order.
    pub fn ignore_patterns(&self) -> &[String] {
        &self.ignore_patterns
    }

    /// Group names, in file order.
    pub fn group_names(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).collect()
    }

    /// Resolve a group name into its device pair.
    ///
    /// Fails if the group is unknown, does not hold exactly two devices,
    /// or no credentials are configured.
    pub fn resolve_group(&self, name: &str) -> Result<DeviceGroup> {
        let entries = self.groups.get(name).ok_or_else(|| {
            Error::Inventory(format!(
                "Group '{}' not found. Available groups: {}",
                name,
                self.group_names().join(", ")
            ))
        })?;

        if entries.len() != 2 {
            return Err(Error::Inventory(format!(
                "Group '{}' must have exactly 2 devices, found {}",
                name,
                entries.len()
            )));
        }

        let credentials = self.settings.credentials.as_ref().ok_or_else(|| {
            Error::Inventory("Missing user or password in [settings] section".into())
        })?;
        let port = self.settings.port.unwrap_or(DEFAULT_SSH_PORT);

        let targets = entries
            .iter()
            .zip(DeviceRole::BOTH)
            .map(|((key, value), role)| {
                DeviceTarget::parse(key, value, credentials, port, name, role).map_err(|e| {
                    Error::Inventory(format!("Group '{}', device '{}': {}", name, key, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        DeviceGroup::from_targets(name, targets)
    }
}

fn parse_settings(entries: &[(String, String)]) -> Result<InventorySettings> {
    let mut settings = InventorySettings::default();
    let mut user = None;
    let mut password = None;

    for (key, value) in entries {
        match key.to_lowercase().as_str() {
            "user" => user = Some(value.clone()),
            "password" => password = Some(value.clone()),
            "port" => {
                settings.port = Some(value.parse().map_err(|_| {
                    Error::Inventory(format!("Invalid port in [settings]: {}", value))
                })?)
            }
            "backup_dir" => settings.backup_dir = Some(PathBuf::from(value)),
            "strict" => settings.strict = Some(parse_bool(value)),
            _ => {}
        }
    }

    settings.credentials = match (user, password) {
        (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
            Some(Credentials::new(user, password))
        }
        _ => None,
    };

    Ok(settings)
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "yes" | "on" | "1")
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}
