//! Stored artifacts and their `metadata.json` index

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::artifact::metadata::{self, UNKNOWN};
use crate::artifact::resolver::validate_file_name;
use crate::errors::AgentError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::utils::hex;

const INDEX_FILE: &str = "metadata.json";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub filename: String,
    /// Display name supplied by the uploader
    #[serde(default)]
    pub custom_name: String,
    #[serde(default = "unknown")]
    pub package_name: String,
    #[serde(default = "unknown")]
    pub version_name: String,
    #[serde(default = "unknown")]
    pub version_code: String,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub upload_time: String,
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

pub fn is_artifact_name(name: &str) -> bool {
    !name.starts_with('.') && (name.ends_with(".apk") || name.ends_with(".ipa"))
}

/// Give `name` the extension of `original`, `.apk` unless that is an `.ipa`
pub fn with_artifact_extension(name: &str, original: &str) -> String {
    let ext = if original.ends_with(".ipa") { ".ipa" } else { ".apk" };
    if name.ends_with(ext) {
        name.to_string()
    } else {
        format!("{}{}", name, ext)
    }
}

fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

pub struct ArtifactRegistry {
    dir: Dir,
    index: File,
    lock: Mutex<()>,
}

impl ArtifactRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = Dir::new(dir);
        let index = dir.file(INDEX_FILE);
        Self {
            dir,
            index,
            lock: Mutex::new(()),
        }
    }

    pub fn path_of(&self, filename: &str) -> Result<PathBuf, AgentError> {
        validate_file_name(filename)?;
        Ok(self.dir.path().join(filename))
    }

    async fn load(&self) -> BTreeMap<String, ArtifactRecord> {
        if !self.index.exists().await {
            return BTreeMap::new();
        }
        match self.index.read_json().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Ignoring unreadable artifact index: {}", e);
                BTreeMap::new()
            }
        }
    }

    async fn store(&self, records: &BTreeMap<String, ArtifactRecord>) -> Result<(), AgentError> {
        self.index.write_json(records).await
    }

    /// Stored artifacts, newest first. Index entries for missing files are dropped.
    pub async fn list(&self) -> Result<Vec<ArtifactRecord>, AgentError> {
        let _guard = self.lock.lock().await;
        self.dir.create().await?;

        let files: Vec<String> = self
            .dir
            .list_file_names()
            .await?
            .into_iter()
            .filter(|name| is_artifact_name(name))
            .collect();

        let mut records = self.load().await;
        let before = records.len();
        records.retain(|name, _| files.contains(name));
        if records.len() != before {
            self.store(&records).await?;
        }

        let mut listed = Vec::with_capacity(files.len());
        for name in files {
            let record = match records.get(&name) {
                Some(record) => record.clone(),
                None => self.unregistered(&name).await,
            };
            listed.push(record);
        }

        listed.sort_by(|a, b| b.upload_time.cmp(&a.upload_time));
        Ok(listed)
    }

    async fn unregistered(&self, name: &str) -> ArtifactRecord {
        let modified = tokio::fs::metadata(self.dir.path().join(name))
            .await
            .and_then(|m| m.modified())
            .map(|t| DateTime::<Local>::from(t).format(TIME_FORMAT).to_string())
            .unwrap_or_default();

        ArtifactRecord {
            filename: name.to_string(),
            custom_name: String::new(),
            package_name: unknown(),
            version_name: unknown(),
            version_code: unknown(),
            sha256: None,
            upload_time: modified,
        }
    }

    /// Parse a stored file and record it in the index
    pub async fn register(
        &self,
        filename: &str,
        remark: Option<&str>,
    ) -> Result<ArtifactRecord, AgentError> {
        let path = self.path_of(filename)?;
        if !File::new(&path).exists().await {
            return Err(AgentError::NotFound(format!("Artifact {} not found", filename)));
        }

        let parsed = metadata::inspect(&path).await;
        let digest_path = path.clone();
        let sha256 = tokio::task::spawn_blocking(move || sha256_file(&digest_path)).await??;

        let record = ArtifactRecord {
            filename: filename.to_string(),
            custom_name: remark.unwrap_or_default().to_string(),
            package_name: parsed.package_name,
            version_name: parsed.version_name,
            version_code: parsed.version_code,
            sha256: Some(sha256),
            upload_time: Local::now().format(TIME_FORMAT).to_string(),
        };

        let _guard = self.lock.lock().await;
        let mut records = self.load().await;
        records.insert(filename.to_string(), record.clone());
        self.store(&records).await?;

        info!(
            "Registered artifact {} ({} {})",
            filename, record.package_name, record.version_name
        );
        Ok(record)
    }

    /// Write uploaded bytes into storage and register them.
    /// A custom name replaces the upload's name and gets its extension enforced.
    pub async fn save_upload(
        &self,
        original_name: &str,
        contents: &[u8],
        custom_name: Option<&str>,
        remark: Option<&str>,
    ) -> Result<ArtifactRecord, AgentError> {
        let filename = match custom_name.map(str::trim).filter(|s| !s.is_empty()) {
            Some(custom) => with_artifact_extension(custom, original_name),
            None => original_name.to_string(),
        };
        let path = self.path_of(&filename)?;

        File::new(&path).write_bytes(contents).await?;
        self.register(&filename, remark).await
    }

    /// Remove a stored artifact and its index entry. Returns whether anything existed.
    pub async fn delete(&self, filename: &str) -> Result<bool, AgentError> {
        let file = File::new(self.path_of(filename)?);
        let existed = file.exists().await;
        file.delete().await?;

        let _guard = self.lock.lock().await;
        let mut records = self.load().await;
        let recorded = records.remove(filename).is_some();
        if recorded {
            self.store(&records).await?;
        }
        Ok(existed || recorded)
    }
}
