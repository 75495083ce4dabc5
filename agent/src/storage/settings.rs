//! Settings file management

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::model::ReadinessPolicy;
use crate::logs::LogLevel;

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Also write daily rolling log files into the logs directory
    #[serde(default)]
    pub log_to_file: bool,

    /// Local HTTP server
    #[serde(default)]
    pub server: ServerSettings,

    /// Artifact storage overrides
    #[serde(default)]
    pub storage: StorageSettings,

    /// Device bridge tools
    #[serde(default)]
    pub devices: DeviceSettings,

    /// Share-link service
    #[serde(default)]
    pub share: ShareSettings,

    /// Orchestrator timings
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    /// Background download bookkeeping
    #[serde(default)]
    pub downloads: DownloadSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            server: ServerSettings::default(),
            storage: StorageSettings::default(),
            devices: DeviceSettings::default(),
            share: ShareSettings::default(),
            orchestrator: OrchestratorSettings::default(),
            downloads: DownloadSettings::default(),
        }
    }
}

/// Local HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8791
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Storage overrides; unset values fall back to the storage layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Base directory replacing the default layout root
    #[serde(default)]
    pub base_dir: Option<String>,

    /// Directory holding artifacts
    #[serde(default)]
    pub artifacts_dir: Option<String>,

    /// Directory for temporary downloads
    #[serde(default)]
    pub temp_dir: Option<String>,
}

/// Device bridge settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Path to the android debug bridge executable
    #[serde(default = "default_adb_path")]
    pub adb_path: String,

    /// Path to the tidevice executable
    #[serde(default = "default_tidevice_path")]
    pub tidevice_path: String,

    /// How indeterminate screen/lock probes are treated
    #[serde(default)]
    pub readiness_policy: ReadinessPolicy,
}

fn default_adb_path() -> String {
    "adb".to_string()
}

fn default_tidevice_path() -> String {
    "tidevice".to_string()
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            adb_path: default_adb_path(),
            tidevice_path: default_tidevice_path(),
            readiness_policy: ReadinessPolicy::default(),
        }
    }
}

/// Share-link service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareSettings {
    /// Origin of the distribution service
    #[serde(default = "default_share_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_share_timeout")]
    pub timeout_secs: u64,
}

fn default_share_base_url() -> String {
    "https://www.pgyer.com".to_string()
}

fn default_share_timeout() -> u64 {
    30
}

impl Default for ShareSettings {
    fn default() -> Self {
        Self {
            base_url: default_share_base_url(),
            timeout_secs: default_share_timeout(),
        }
    }
}

/// Orchestrator settle delays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    #[serde(default = "default_uninstall_settle")]
    pub uninstall_settle_ms: u64,

    #[serde(default = "default_launch_settle")]
    pub launch_settle_ms: u64,
}

fn default_uninstall_settle() -> u64 {
    1000
}

fn default_launch_settle() -> u64 {
    5000
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            uninstall_settle_ms: default_uninstall_settle(),
            launch_settle_ms: default_launch_settle(),
        }
    }
}

impl OrchestratorSettings {
    pub fn uninstall_settle(&self) -> Duration {
        Duration::from_millis(self.uninstall_settle_ms)
    }

    pub fn launch_settle(&self) -> Duration {
        Duration::from_millis(self.launch_settle_ms)
    }
}

/// Download task retention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettings {
    /// How long finished tasks stay pollable
    #[serde(default = "default_task_retention")]
    pub task_retention_secs: u64,

    /// How often the reaper runs
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
}

fn default_task_retention() -> u64 {
    3600
}

fn default_reap_interval() -> u64 {
    60
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            task_retention_secs: default_task_retention(),
            reap_interval_secs: default_reap_interval(),
        }
    }
}
