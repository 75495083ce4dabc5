//! Fire-and-forget downloads into artifact storage

use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Client;
use tracing::{error, info, warn};

use crate::artifact::download::{download_to, percent};
use crate::artifact::registry::ArtifactRegistry;
use crate::artifact::resolver::validate_file_name;
use crate::downloads::tracker::{DownloadTracker, TaskStatus};
use crate::errors::AgentError;
use crate::share::ShareLinkResolver;
use crate::utils::{generate_uuid, unix_secs};

/// Storage file name for a download of `url`: its last path segment, with the
/// `.ipa`/`.apk` extension enforced
pub fn download_file_name(url: &str, now_secs: u64) -> String {
    let last = url::Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments().and_then(|mut s| s.next_back()).map(str::to_string))
        .unwrap_or_default();

    let mut name = if last.is_empty() {
        format!("share_app_{}.apk", now_secs)
    } else {
        last
    };

    let ext = if url.contains(".ipa") { ".ipa" } else { ".apk" };
    if !name.ends_with(ext) {
        name.push_str(ext);
    }
    name
}

#[derive(Clone)]
pub struct DownloadService {
    tracker: Arc<DownloadTracker>,
    share: Arc<ShareLinkResolver>,
    http: Client,
    storage_dir: PathBuf,
    registry: Option<Arc<ArtifactRegistry>>,
}

impl DownloadService {
    pub fn new(
        tracker: Arc<DownloadTracker>,
        share: Arc<ShareLinkResolver>,
        http: Client,
        storage_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tracker,
            share,
            http,
            storage_dir: storage_dir.into(),
            registry: None,
        }
    }

    /// Register completed downloads with `registry`
    pub fn with_registry(mut self, registry: Arc<ArtifactRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn tracker(&self) -> &Arc<DownloadTracker> {
        &self.tracker
    }

    /// Start resolving and downloading `url` in the background; returns the task id
    pub fn start_background_download(&self, url: &str, remark: Option<String>) -> String {
        let task_id = generate_uuid();
        self.tracker.start(&task_id);

        let service = self.clone();
        let id = task_id.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            service.run(&id, &url, remark.as_deref()).await;
        });

        task_id
    }

    async fn run(&self, task_id: &str, url: &str, remark: Option<&str>) {
        match self.execute(task_id, url, remark).await {
            Ok(filename) => {
                info!("Background download {} finished: {}", task_id, filename);
                self.tracker.complete(task_id, &filename);
            }
            Err(e) => {
                error!("Background download {} failed: {}", task_id, e);
                self.tracker.fail(task_id, &e.to_string());
            }
        }
    }

    async fn execute(
        &self,
        task_id: &str,
        url: &str,
        remark: Option<&str>,
    ) -> Result<String, AgentError> {
        let direct = if self.share.is_share_link(url) {
            self.tracker
                .update(task_id, TaskStatus::Analyzing, None, "Resolving share link...");
            self.share.resolve(url).await?
        } else {
            url.to_string()
        };

        let filename = download_file_name(&direct, unix_secs());
        validate_file_name(&filename)?;

        tokio::fs::create_dir_all(&self.storage_dir).await?;
        let partial = self.storage_dir.join(format!(".{}.download", task_id));
        let target = self.storage_dir.join(&filename);

        self.tracker
            .update(task_id, TaskStatus::Downloading, None, "Downloading...");
        let result = download_to(&self.http, &direct, &partial, |done, total| {
            let pct = percent(done, total);
            let message = match pct {
                Some(p) => format!("Downloading... {}%", p),
                None => format!("Downloading... {} bytes", done),
            };
            self.tracker
                .update(task_id, TaskStatus::Downloading, pct, &message);
        })
        .await;

        if let Err(e) = result {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                warn!("Could not remove {}: {}", partial.display(), cleanup);
            }
            return Err(e);
        }
        tokio::fs::rename(&partial, &target).await?;

        if let Some(registry) = &self.registry {
            if let Err(e) = registry.register(&filename, remark).await {
                warn!("Downloaded {} but could not register it: {}", filename, e);
            }
        }
        Ok(filename)
    }
}
