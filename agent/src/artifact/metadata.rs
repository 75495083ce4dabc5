//! Package identity extraction for `.apk` and `.ipa` archives

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use zip::ZipArchive;

use crate::artifact::axml;
use crate::errors::AgentError;

/// Package name reported when it cannot be determined
pub const UNKNOWN: &str = "Unknown";
/// Version reported when the archive could not be parsed
pub const PARSE_ERROR: &str = "Parse Error";

const ANDROID_MANIFEST: &str = "AndroidManifest.xml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub package_name: String,
    pub version_name: String,
    pub version_code: String,
}

impl ArtifactMetadata {
    /// Sentinel returned for archives that could not be read
    pub fn unparsed() -> Self {
        Self {
            package_name: UNKNOWN.to_string(),
            version_name: PARSE_ERROR.to_string(),
            version_code: PARSE_ERROR.to_string(),
        }
    }

    pub fn has_package(&self) -> bool {
        !self.package_name.is_empty() && self.package_name != UNKNOWN
    }
}

#[derive(Debug, Deserialize)]
struct InfoPlist {
    #[serde(rename = "CFBundleIdentifier")]
    bundle_identifier: String,
    #[serde(rename = "CFBundleShortVersionString", default)]
    short_version: Option<String>,
    #[serde(rename = "CFBundleVersion", default)]
    bundle_version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Apk,
    Ipa,
}

impl ArchiveKind {
    pub fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("ipa") => ArchiveKind::Ipa,
            _ => ArchiveKind::Apk,
        }
    }
}

/// Read package identity from an archive on disk. Blocking.
pub fn read_metadata(path: &Path) -> Result<ArtifactMetadata, AgentError> {
    let file = fs::File::open(path)?;
    let mut archive = ZipArchive::new(file)?;

    match ArchiveKind::of(path) {
        ArchiveKind::Apk => read_apk(&mut archive),
        ArchiveKind::Ipa => read_ipa(&mut archive),
    }
}

fn read_apk<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<ArtifactMetadata, AgentError> {
    let mut manifest = Vec::new();
    archive
        .by_name(ANDROID_MANIFEST)?
        .read_to_end(&mut manifest)?;

    let info = axml::parse_manifest(&manifest)?;
    Ok(ArtifactMetadata {
        package_name: info.package,
        version_name: info.version_name.unwrap_or_else(|| UNKNOWN.to_string()),
        version_code: info.version_code.unwrap_or_else(|| UNKNOWN.to_string()),
    })
}

/// `Payload/<name>.app/Info.plist`, one level deep only
fn is_bundle_info_plist(name: &str) -> bool {
    name.strip_prefix("Payload/")
        .and_then(|rest| rest.strip_suffix(".app/Info.plist"))
        .is_some_and(|app| !app.is_empty() && !app.contains('/'))
}

fn read_ipa<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<ArtifactMetadata, AgentError> {
    let entry = archive
        .file_names()
        .find(|name| is_bundle_info_plist(name))
        .map(str::to_string)
        .ok_or_else(|| AgentError::ParseError("No Payload/*.app/Info.plist".to_string()))?;

    let mut bytes = Vec::new();
    archive.by_name(&entry)?.read_to_end(&mut bytes)?;

    let info: InfoPlist = plist::from_bytes(&bytes)?;
    Ok(ArtifactMetadata {
        package_name: info.bundle_identifier,
        version_name: info.short_version.unwrap_or_else(|| UNKNOWN.to_string()),
        version_code: info.bundle_version.unwrap_or_else(|| UNKNOWN.to_string()),
    })
}

/// Extract metadata on the blocking pool. Failures degrade to the sentinel.
pub async fn inspect(path: &Path) -> ArtifactMetadata {
    let owned: PathBuf = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || read_metadata(&owned)).await;

    match result {
        Ok(Ok(metadata)) => {
            debug!(
                "Parsed {}: {} {} ({})",
                path.display(),
                metadata.package_name,
                metadata.version_name,
                metadata.version_code
            );
            metadata
        }
        Ok(Err(e)) => {
            error!("Failed to parse package {}: {}", path.display(), e);
            ArtifactMetadata::unparsed()
        }
        Err(e) => {
            error!("Metadata task for {} failed: {}", path.display(), e);
            ArtifactMetadata::unparsed()
        }
    }
}
