//! Periodic eviction of finished download tasks

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, info};

use crate::downloads::tracker::DownloadTracker;
use crate::storage::settings::DownloadSettings;

/// Reaper worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Time between sweeps
    pub interval: Duration,

    /// How long a finished task stays pollable
    pub retention: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            retention: Duration::from_secs(3600),
        }
    }
}

impl From<&DownloadSettings> for Options {
    fn from(settings: &DownloadSettings) -> Self {
        Self {
            interval: Duration::from_secs(settings.reap_interval_secs),
            retention: Duration::from_secs(settings.task_retention_secs),
        }
    }
}

/// Run the reaper worker
pub async fn run<S, F>(
    options: &Options,
    tracker: &DownloadTracker,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Reaper worker starting...");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Reaper worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }

        let removed = tracker.reap(options.retention);
        if removed > 0 {
            debug!("Reaped {} finished download tasks", removed);
        }
    }
}
