//! Device definition for the junos-push inventory.
//!
//! A [`DeviceTarget`] is one managed Junos device: the address to connect
//! to, the credentials to use and its place (group and role) in the pair.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default SSH port for Junos devices.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Login credentials for a device.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Login user
    pub user: String,
    /// Login password
    #[serde(skip_serializing)]
    pub password: String,
}

impl Credentials {
    /// Create credentials.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"********")
            .finish()
    }
}

/// Position of a device within its pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    /// First device of the group
    Node1,
    /// Second device of the group
    Node2,
}

impl DeviceRole {
    /// Both roles, in order.
    pub const BOTH: [DeviceRole; 2] = [DeviceRole::Node1, DeviceRole::Node2];

    /// Slot index of the role (0 or 1).
    pub fn index(&self) -> usize {
        match self {
            DeviceRole::Node1 => 0,
            DeviceRole::Node2 => 1,
        }
    }

    /// The other device of the pair.
    pub fn peer(&self) -> DeviceRole {
        match self {
            DeviceRole::Node1 => DeviceRole::Node2,
            DeviceRole::Node2 => DeviceRole::Node1,
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceRole::Node1 => write!(f, "node1"),
            DeviceRole::Node2 => write!(f, "node2"),
        }
    }
}

/// Errors parsing a device entry.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HostParseError {
    /// The entry is blank
    #[error("empty device entry")]
    EmptyInput,
    /// `port=` is not a valid port number
    #[error("invalid port: {0}")]
    InvalidPort(String),
    /// Unknown `key=value` override
    #[error("unknown device option: {0}")]
    UnknownOption(String),
}

/// Identity of one managed device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTarget {
    /// Inventory key the device was listed under
    pub name: String,
    /// Address to connect to
    pub host: String,
    /// SSH port
    pub port: u16,
    /// Credentials used to log in
    pub credentials: Credentials,
    /// Group the device belongs to
    pub group: String,
    /// Role within the group
    pub role: DeviceRole,
}

impl DeviceTarget {
    /// Create a target with the default port.
    pub fn new(
        host: impl Into<String>,
        credentials: Credentials,
        group: impl Into<String>,
        role: DeviceRole,
    ) -> Self {
        let host = host.into();
        Self {
            name: host.clone(),
            host,
            port: DEFAULT_SSH_PORT,
            credentials,
            group: group.into(),
            role,
        }
    }

    /// Set the SSH port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `host:port` socket address string.
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Parse an inventory value such as `10.0.0.1 port=830 user=ops`.
    ///
    /// Per-device `user`/`password` override the shared credentials.
    pub fn parse(
        name: &str,
        input: &str,
        defaults: &Credentials,
        default_port: u16,
        group: &str,
        role: DeviceRole,
    ) -> Result<Self, HostParseError> {
        let parts: Vec<&str> = input.split_whitespace().collect();
        let Some((host, options)) = parts.split_first() else {
            return Err(HostParseError::EmptyInput);
        };

        let mut target = DeviceTarget::new(*host, defaults.clone(), group, role)
            .with_port(default_port);
        target.name = name.to_string();

        for option in options {
            match option.split_once('=') {
                Some(("port", value)) => {
                    target.port = value
                        .parse()
                        .map_err(|_| HostParseError::InvalidPort(value.to_string()))?;
                }
                Some(("user", value)) => target.credentials.user = value.to_string(),
                Some(("password", value)) => target.credentials.password = value.to_string(),
                _ => return Err(HostParseError::UnknownOption(option.to_string())),
            }
        }

        Ok(target)
    }
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.host, self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new("netops", "secret")
    }

    #[test]
    fn test_parse_plain_host() {
        let target =
            DeviceTarget::parse("r1", "10.0.0.1", &creds(), 22, "core", DeviceRole::Node1).unwrap();
        assert_eq!(target.host, "10.0.0.1");
        assert_eq!(target.name, "r1");
        assert_eq!(target.port, 22);
        assert_eq!(target.credentials.user, "netops");
    }

    #[test]
    fn test_parse_overrides() {
        let target = DeviceTarget::parse(
            "r2",
            "10.0.0.2 port=2222 user=admin password=other",
            &creds(),
            22,
            "core",
            DeviceRole::Node2,
        )
        .unwrap();
        assert_eq!(target.port, 2222);
        assert_eq!(target.credentials, Credentials::new("admin", "other"));
        assert_eq!(target.socket_addr(), "10.0.0.2:2222");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            DeviceTarget::parse("r", "  ", &creds(), 22, "g", DeviceRole::Node1),
            Err(HostParseError::EmptyInput)
        );
        assert!(matches!(
            DeviceTarget::parse("r", "h port=abc", &creds(), 22, "g", DeviceRole::Node1),
            Err(HostParseError::InvalidPort(_))
        ));
        assert!(matches!(
            DeviceTarget::parse("r", "h vrf=mgmt", &creds(), 22, "g", DeviceRole::Node1),
            Err(HostParseError::UnknownOption(_))
        ));
    }

    #[test]
    fn test_ipv6_socket_addr() {
        let target = DeviceTarget::new("fd00::1", creds(), "g", DeviceRole::Node1);
        assert_eq!(target.socket_addr(), "[fd00::1]:22");
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let rendered = format!("{:?}", creds());
        assert!(!rendered.contains("secret"));
    }
}
