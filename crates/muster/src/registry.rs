//! Static device catalog.
//!
//! Built once from configuration at startup; read-only afterwards. Every
//! controllable target - local camera or remote controller - is one
//! `Device`. Concurrent sub-targets are modeled as distinct devices, so
//! the process tracker can enforce one running process per device.

use musterconf::{CameraConfig, ControllerConfig, MusterConfig};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Stable device name, unique across the whole catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceName(pub String);

impl DeviceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a device's processes run, for scoped listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceKind {
    Local,
    Remote { rpi_type: String },
}

/// SSH endpoint of a remote controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAddress {
    pub host: String,
    pub port: u16,
    pub user: String,
}

impl std::fmt::Display for RemoteAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// A controllable recording target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Device {
    LocalCamera {
        name: DeviceName,
        state_file: PathBuf,
        record_command: String,
        preview_command: String,
    },
    RemoteController {
        name: DeviceName,
        rpi_type: String,
        address: RemoteAddress,
        script: PathBuf,
        options: BTreeMap<String, String>,
        description: String,
    },
}

/// Borrowed view of a remote controller, for the dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct RemoteSpec<'a> {
    pub name: &'a DeviceName,
    pub address: &'a RemoteAddress,
    pub script: &'a Path,
    pub options: &'a BTreeMap<String, String>,
}

impl Device {
    pub fn name(&self) -> &DeviceName {
        match self {
            Device::LocalCamera { name, .. } => name,
            Device::RemoteController { name, .. } => name,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Device::LocalCamera { .. })
    }

    pub fn kind(&self) -> DeviceKind {
        match self {
            Device::LocalCamera { .. } => DeviceKind::Local,
            Device::RemoteController { rpi_type, .. } => DeviceKind::Remote {
                rpi_type: rpi_type.clone(),
            },
        }
    }

    /// Human description for the dashboard.
    pub fn description(&self) -> String {
        match self {
            Device::LocalCamera { name, state_file, .. } => {
                format!("Camera {} ({})", name, state_file.display())
            }
            Device::RemoteController {
                rpi_type,
                address,
                description,
                options,
                ..
            } => {
                let options_str = options
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "{} [{}] host: {} ({})",
                    description, rpi_type, address, options_str
                )
            }
        }
    }

    pub fn as_remote(&self) -> Option<RemoteSpec<'_>> {
        match self {
            Device::RemoteController {
                name,
                address,
                script,
                options,
                ..
            } => Some(RemoteSpec {
                name,
                address,
                script,
                options,
            }),
            Device::LocalCamera { .. } => None,
        }
    }
}

impl From<&CameraConfig> for Device {
    fn from(cam: &CameraConfig) -> Self {
        Device::LocalCamera {
            name: DeviceName::new(&cam.name),
            state_file: cam.state_file.clone(),
            record_command: cam.record_command.clone(),
            preview_command: cam.preview_command.clone(),
        }
    }
}

impl From<&ControllerConfig> for Device {
    fn from(ctl: &ControllerConfig) -> Self {
        Device::RemoteController {
            name: DeviceName::new(&ctl.name),
            rpi_type: ctl.rpi_type.clone(),
            address: RemoteAddress {
                host: ctl.host.clone(),
                port: ctl.port,
                user: ctl.user.clone(),
            },
            script: ctl.script.clone(),
            options: ctl.options.clone(),
            description: ctl.description.clone(),
        }
    }
}

/// Read-only catalog of configured devices.
pub struct Registry {
    devices: Vec<Device>,
    by_name: HashMap<DeviceName, usize>,
}

impl Registry {
    pub fn from_config(config: &MusterConfig) -> Self {
        let devices: Vec<Device> = config
            .cameras
            .iter()
            .map(Device::from)
            .chain(config.controllers.iter().map(Device::from))
            .collect();

        let by_name = devices
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name().clone(), i))
            .collect();

        Self { devices, by_name }
    }

    pub fn get(&self, name: &DeviceName) -> Option<&Device> {
        self.by_name.get(name).map(|&i| &self.devices[i])
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn cameras(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(|d| d.is_local())
    }

    pub fn controllers(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(|d| !d.is_local())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
