//! iOS over-the-air install manifests (`itms-services://` links)

use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

static IPA_STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<string>(https?://.*?\.ipa)</string>").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct InstallManifest {
    #[serde(default)]
    items: Vec<ManifestItem>,
}

#[derive(Debug, Deserialize)]
struct ManifestItem {
    #[serde(default)]
    assets: Vec<ManifestAsset>,
}

#[derive(Debug, Deserialize)]
struct ManifestAsset {
    kind: String,
    #[serde(default)]
    url: Option<String>,
}

pub fn is_itms_link(url: &str) -> bool {
    url.contains("itms-services://")
}

/// Manifest location carried in the `url` parameter of an itms-services link.
/// Only `%XX` escapes are decoded; a literal `+` stays as it is.
pub fn manifest_url(itms: &str) -> Option<String> {
    let (_, query) = itms.split_once('?')?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("url="))
        .map(|raw| {
            percent_decode_str(raw)
                .decode_utf8_lossy()
                .replace("install//s.plist", "install/s.plist")
        })
        .filter(|value| !value.is_empty())
}

/// URL of the `software-package` asset of the first manifest item
pub fn software_package_url(manifest: &[u8]) -> Option<String> {
    match plist::from_bytes::<InstallManifest>(manifest) {
        Ok(parsed) => {
            let found = parsed.items.into_iter().next().and_then(|item| {
                item.assets
                    .into_iter()
                    .find(|asset| asset.kind == "software-package")
                    .and_then(|asset| asset.url)
            });
            if found.is_some() {
                return found;
            }
        }
        Err(e) => debug!("Manifest is not a readable property list: {}", e),
    }

    let text = String::from_utf8_lossy(manifest);
    IPA_STRING.captures(&text).map(|caps| caps[1].to_string())
}
