//! Minimal configuration loading for Muster.
//!
//! This crate provides configuration loading with minimal dependencies:
//! the static device catalog (cameras and remote controllers), storage
//! and bind settings. Everything here is read once at startup; the
//! runtime never mutates it.
//!
//! # Config File Locations
//!
//! Files are discovered in order (last match wins; device tables do not
//! merge across files, so the winning file must be complete):
//! 1. `/etc/muster/config.toml` (system)
//! 2. `~/.config/muster/config.toml` (user)
//! 3. `./muster.toml` (local override)
//! 4. CLI `--config` path, when given
//!
//! Environment variables (`MUSTER_*`) overlay scalar settings afterwards.
//!
//! # Example Config
//!
//! ```toml
//! data_root = "/data/acquisition"
//!
//! [bind]
//! http_port = 8077
//!
//! [remote]
//! timeout_secs = 10
//!
//! [[camera]]
//! name = "CAM0"
//! state_file = "~/camera_states/CAM0.xml"
//!
//! [[controller]]
//! name = "pwm0"
//! rpi_type = "pwm"
//! host = "10.0.0.31"
//! user = "pi"
//! script = "~/pwm/main.py"
//! description = "PWM pulse generator"
//! [controller.options]
//! frequency = "30"
//! ```

pub mod loader;

pub use loader::{discover_config_files, discover_config_files_with_override, expand_path};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("No config file found (looked in /etc/muster, ~/.config/muster, ./muster.toml)")]
    NotFound,
}

/// Complete Muster configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MusterConfig {
    /// Root directory under which session folders are created.
    #[serde(default = "MusterConfig::default_data_root")]
    pub data_root: PathBuf,

    #[serde(default)]
    pub bind: BindConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Local cameras, in display order.
    #[serde(default, rename = "camera")]
    pub cameras: Vec<CameraConfig>,

    /// Remote single-board controllers.
    #[serde(default, rename = "controller")]
    pub controllers: Vec<ControllerConfig>,
}

impl MusterConfig {
    fn default_data_root() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join("acquisition"))
            .unwrap_or_else(|| PathBuf::from("acquisition"))
    }

    /// Load config from the standard locations.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_override(None)
    }

    /// Load config, optionally preferring a CLI-provided path.
    pub fn load_with_override(
        cli_path: Option<&std::path::Path>,
    ) -> Result<Self, ConfigError> {
        let files = discover_config_files_with_override(cli_path);
        let path = files.last().ok_or(ConfigError::NotFound)?;
        let mut config = loader::load_from_file(path)?;
        loader::apply_env_overrides(&mut config);
        Ok(config)
    }
}

/// Network bind settings for this process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindConfig {
    /// HTTP port for the dashboard API and health endpoint.
    /// Default: 8077
    #[serde(default = "BindConfig::default_http_port")]
    pub http_port: u16,
}

impl BindConfig {
    fn default_http_port() -> u16 {
        8077
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            http_port: Self::default_http_port(),
        }
    }
}

/// Remote management channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Upper bound for any single remote command, in seconds.
    /// Default: 10
    #[serde(default = "RemoteConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RemoteConfig {
    fn default_timeout_secs() -> u64 {
        10
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Default tracing filter when RUST_LOG is unset.
    /// Default: "info"
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// One local camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Stable camera name, used as device identity and recording filename.
    pub name: String,

    /// Path to the camera state file handed to the acquisition command.
    pub state_file: PathBuf,

    /// Command that records to a target path.
    /// Default: "record_video"
    #[serde(default = "CameraConfig::default_record_command")]
    pub record_command: String,

    /// Command that opens a live preview (no output file).
    /// Default: "live_stream"
    #[serde(default = "CameraConfig::default_preview_command")]
    pub preview_command: String,
}

impl CameraConfig {
    fn default_record_command() -> String {
        "record_video".to_string()
    }

    fn default_preview_command() -> String {
        "live_stream".to_string()
    }
}

/// One remote single-board controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Stable controller name, used as device identity.
    pub name: String,

    /// Controller role, e.g. "pwm". Used for scoped process listings.
    pub rpi_type: String,

    /// Network address of the controller.
    pub host: String,

    /// SSH port. Default: 22
    #[serde(default = "ControllerConfig::default_port")]
    pub port: u16,

    /// Login user on the controller.
    pub user: String,

    /// Path to the acquisition script on the controller.
    pub script: PathBuf,

    /// Human-readable description for the dashboard.
    #[serde(default)]
    pub description: String,

    /// Options passed to the script as `--key value` pairs.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl ControllerConfig {
    fn default_port() -> u16 {
        22
    }
}
