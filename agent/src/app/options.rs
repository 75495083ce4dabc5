//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::orchestrator::Timings;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{DeviceSettings, OrchestratorSettings, Settings, ShareSettings};
use crate::workers::reaper;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage configuration
    pub storage: StorageOptions,

    /// Enable local HTTP server
    pub enable_socket_server: bool,

    /// Enable the download task reaper
    pub enable_reaper: bool,

    /// Server configuration
    pub server: ServerOptions,

    /// Device bridge tools
    pub devices: DeviceSettings,

    /// Share-link service
    pub share: ShareSettings,

    /// Orchestrator settle delays
    pub timings: Timings,

    /// Reaper worker options
    pub reaper: reaper::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageOptions::default(),
            enable_socket_server: true,
            enable_reaper: true,
            server: ServerOptions::default(),
            devices: DeviceSettings::default(),
            share: ShareSettings::default(),
            timings: Timings::from(&OrchestratorSettings::default()),
            reaper: reaper::Options::default(),
        }
    }
}

impl AppOptions {
    /// Options from a settings file, with storage rooted at `layout` unless overridden
    pub fn from_settings(settings: &Settings, layout: StorageLayout) -> Self {
        let layout = match &settings.storage.base_dir {
            Some(base) => StorageLayout::new(base),
            None => layout,
        };
        let artifacts_dir = settings
            .storage
            .artifacts_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| layout.artifacts_dir().path().to_path_buf());
        let temp_dir = settings
            .storage
            .temp_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| layout.temp_dir().path().to_path_buf());

        Self {
            storage: StorageOptions {
                layout,
                artifacts_dir,
                temp_dir,
            },
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            devices: settings.devices.clone(),
            share: settings.share.clone(),
            timings: Timings::from(&settings.orchestrator),
            reaper: reaper::Options::from(&settings.downloads),
            ..Default::default()
        }
    }
}

/// Lifecycle options for the agent
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Storage configuration options
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Storage layout paths
    pub layout: StorageLayout,

    /// Where stored artifacts live
    pub artifacts_dir: PathBuf,

    /// Where temporary downloads are written
    pub temp_dir: PathBuf,
}

impl Default for StorageOptions {
    fn default() -> Self {
        let layout = StorageLayout::default();
        Self {
            artifacts_dir: layout.artifacts_dir().path().to_path_buf(),
            temp_dir: layout.temp_dir().path().to_path_buf(),
            layout,
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8791,
        }
    }
}
