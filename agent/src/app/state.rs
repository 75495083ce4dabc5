//! Application state management

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::info;

use crate::app::options::AppOptions;
use crate::artifact::{ArtifactRegistry, ArtifactResolver};
use crate::device::gateway::DeviceGateway;
use crate::device::shell::CommandRunner;
use crate::downloads::{DownloadService, DownloadTracker};
use crate::errors::AgentError;
use crate::filesys::dir::Dir;
use crate::orchestrator::Orchestrator;
use crate::share::ShareLinkResolver;
use crate::utils::SystemClock;

/// Main application state
pub struct AppState {
    /// Attached devices
    pub gateway: Arc<DeviceGateway>,

    /// Stored artifacts and their metadata
    pub registry: Arc<ArtifactRegistry>,

    /// Background download progress
    pub tracker: Arc<DownloadTracker>,

    /// Background download starter
    pub downloads: DownloadService,

    /// Install-old / install-new runner
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Initialize application state; device commands go through `runner`
    pub async fn init(
        options: &AppOptions,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, AgentError> {
        info!("Initializing application state...");

        Dir::new(&options.storage.artifacts_dir).create().await?;
        Dir::new(&options.storage.temp_dir).create().await?;

        let clock = Arc::new(SystemClock);
        let timeout = Duration::from_secs(options.share.timeout_secs);

        let gateway = Arc::new(DeviceGateway::new(
            runner,
            &options.devices.adb_path,
            &options.devices.tidevice_path,
            options.devices.readiness_policy,
        ));

        let share = Arc::new(ShareLinkResolver::new(
            &options.share.base_url,
            timeout,
            clock.clone(),
        )?);
        let http = Client::builder().connect_timeout(timeout).build()?;

        let resolver = Arc::new(ArtifactResolver::new(
            &options.storage.artifacts_dir,
            &options.storage.temp_dir,
            http.clone(),
            share.clone(),
        ));

        let registry = Arc::new(ArtifactRegistry::new(&options.storage.artifacts_dir));
        let tracker = Arc::new(DownloadTracker::new(clock));
        let downloads = DownloadService::new(
            tracker.clone(),
            share,
            http,
            &options.storage.artifacts_dir,
        )
        .with_registry(registry.clone());

        let orchestrator = Arc::new(Orchestrator::new(gateway.clone(), resolver, options.timings));

        Ok(Self {
            gateway,
            registry,
            tracker,
            downloads,
            orchestrator,
        })
    }
}
