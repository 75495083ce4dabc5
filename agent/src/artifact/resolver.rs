//! Turns an artifact request into a file on local disk

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use tempfile::TempPath;
use tracing::{info, warn};

use crate::artifact::download::download_to;
use crate::errors::AgentError;
use crate::share::ShareLinkResolver;

/// Where an artifact comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    /// A file name inside the artifact storage directory
    Local(String),
    /// A direct download URL or a share link
    Remote(String),
}

impl ArtifactSource {
    /// Exactly one of the two must be given and non-empty
    pub fn from_request(local: Option<&str>, remote: Option<&str>) -> Result<Self, AgentError> {
        let local = local.map(str::trim).filter(|s| !s.is_empty());
        let remote = remote.map(str::trim).filter(|s| !s.is_empty());

        match (local, remote) {
            (Some(name), None) => Ok(ArtifactSource::Local(name.to_string())),
            (None, Some(url)) => Ok(ArtifactSource::Remote(url.to_string())),
            (Some(_), Some(_)) => Err(AgentError::ValidationError(
                "Provide either an artifact name or a URL, not both".to_string(),
            )),
            (None, None) => Err(AgentError::ValidationError(
                "Either an artifact name or a URL must be provided".to_string(),
            )),
        }
    }

    pub fn describe(&self) -> &str {
        match self {
            ArtifactSource::Local(name) => name,
            ArtifactSource::Remote(url) => url,
        }
    }
}

/// A local artifact file. Temporary downloads are removed when this is dropped.
#[derive(Debug)]
pub struct ResolvedArtifact {
    path: PathBuf,
    temp: Option<TempPath>,
}

impl ResolvedArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ResolvedArtifact {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.take() {
            info!("Cleaning up temporary artifact: {}", self.path.display());
            if let Err(e) = temp.close() {
                warn!("Failed to remove {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Reject names that are not a single plain file inside the storage directory
pub fn validate_file_name(name: &str) -> Result<(), AgentError> {
    if name.is_empty()
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.starts_with('.')
    {
        return Err(AgentError::ValidationError(format!(
            "Invalid artifact name: {:?}",
            name
        )));
    }
    Ok(())
}

/// Suffix given to a temporary download of `url`
pub fn temp_suffix(url: &str) -> &'static str {
    if url.contains(".ipa") {
        ".ipa"
    } else {
        ".apk"
    }
}

pub struct ArtifactResolver {
    storage_dir: PathBuf,
    temp_dir: PathBuf,
    http: Client,
    share: Arc<ShareLinkResolver>,
}

impl ArtifactResolver {
    pub fn new(
        storage_dir: impl Into<PathBuf>,
        temp_dir: impl Into<PathBuf>,
        http: Client,
        share: Arc<ShareLinkResolver>,
    ) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            temp_dir: temp_dir.into(),
            http,
            share,
        }
    }

    /// Path of a stored artifact; the file may not exist
    pub fn local_path(&self, name: &str) -> Result<PathBuf, AgentError> {
        validate_file_name(name)?;
        Ok(self.storage_dir.join(name))
    }

    /// Follow a share link if `url` is one, otherwise return it unchanged
    pub async fn direct_url(&self, url: &str) -> Result<String, AgentError> {
        if self.share.is_share_link(url) {
            self.share.resolve(url).await
        } else {
            Ok(url.to_string())
        }
    }

    pub async fn resolve(&self, source: &ArtifactSource) -> Result<ResolvedArtifact, AgentError> {
        match source {
            ArtifactSource::Local(name) => Ok(ResolvedArtifact {
                path: self.local_path(name)?,
                temp: None,
            }),
            ArtifactSource::Remote(url) => self.fetch_temporary(url).await,
        }
    }

    async fn fetch_temporary(&self, url: &str) -> Result<ResolvedArtifact, AgentError> {
        let direct = self.direct_url(url).await?;

        tokio::fs::create_dir_all(&self.temp_dir).await?;
        let temp = tempfile::Builder::new()
            .prefix("artifact-")
            .suffix(temp_suffix(&direct))
            .tempfile_in(&self.temp_dir)?
            .into_temp_path();
        let artifact = ResolvedArtifact {
            path: temp.to_path_buf(),
            temp: Some(temp),
        };

        info!("Downloading {} to {}", direct, artifact.path.display());
        download_to(&self.http, &direct, &artifact.path, |_, _| {}).await?;
        Ok(artifact)
    }
}
