//! Server state

use std::sync::Arc;

use crate::app::state::AppState;
use crate::artifact::ArtifactRegistry;
use crate::device::gateway::DeviceGateway;
use crate::downloads::{DownloadService, DownloadTracker};
use crate::orchestrator::Orchestrator;

/// Server state shared across handlers
pub struct ServerState {
    pub gateway: Arc<DeviceGateway>,
    pub registry: Arc<ArtifactRegistry>,
    pub tracker: Arc<DownloadTracker>,
    pub downloads: DownloadService,
    pub orchestrator: Arc<Orchestrator>,
}

impl ServerState {
    pub fn from_app(app_state: &AppState) -> Self {
        Self {
            gateway: app_state.gateway.clone(),
            registry: app_state.registry.clone(),
            tracker: app_state.tracker.clone(),
            downloads: app_state.downloads.clone(),
            orchestrator: app_state.orchestrator.clone(),
        }
    }
}
