//! Device pair definition.

use super::host::{DeviceRole, DeviceTarget};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A named group of exactly two devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceGroup {
    /// Group name
    pub name: String,
    devices: [DeviceTarget; 2],
}

impl DeviceGroup {
    /// Build a group from its two devices.
    pub fn new(name: impl Into<String>, node1: DeviceTarget, node2: DeviceTarget) -> Self {
        Self {
            name: name.into(),
            devices: [node1, node2],
        }
    }

    /// Build a group, enforcing the two-device invariant.
    pub fn from_targets(name: impl Into<String>, targets: Vec<DeviceTarget>) -> Result<Self> {
        let name = name.into();
        let count = targets.len();
        let devices: [DeviceTarget; 2] = targets.try_into().map_err(|_| {
            Error::Inventory(format!(
                "Group '{}' must have exactly 2 devices, found {}",
                name, count
            ))
        })?;
        Ok(Self { name, devices })
    }

    /// The device holding `role`.
    pub fn device(&self, role: DeviceRole) -> &DeviceTarget {
        &self.devices[role.index()]
    }

    /// First device.
    pub fn node1(&self) -> &DeviceTarget {
        &self.devices[0]
    }

    /// Second device.
    pub fn node2(&self) -> &DeviceTarget {
        &self.devices[1]
    }

    /// Both devices, node1 first.
    pub fn devices(&self) -> &[DeviceTarget; 2] {
        &self.devices
    }

    /// Iterate over both devices.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceTarget> {
        self.devices.iter()
    }
}
