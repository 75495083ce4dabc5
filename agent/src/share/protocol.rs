//! Share-link resolution handshake
//!
//! A share page embeds an app key plus optional token, signature and auth code.
//! Those values sign a request to the install endpoint, whose redirect (or JSON
//! body) names the binary. iOS builds add a hop through an install manifest.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{redirect, Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::errors::AgentError;
use crate::share::manifest::{is_itms_link, manifest_url, software_package_url};
use crate::share::markers::PageMarkers;
use crate::share::signature::{challenge_code, normalize_signature, random_component};
use crate::utils::Clock;

pub const MOBILE_BROWSER_UA: &str = "Mozilla/5.0 (Linux; Android 10; SM-G960F) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/88.0.4324.181 Mobile Safari/537.36";
pub const STORE_CLIENT_UA: &str = "itunesstored/1.0";
const ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9,en;q=0.8";

#[derive(Debug, Deserialize)]
struct InstallResponse {
    code: i64,
    #[serde(default)]
    data: Option<InstallData>,
}

#[derive(Debug, Deserialize)]
struct InstallData {
    #[serde(rename = "downloadURL", default)]
    download_url: Option<String>,
}

/// Build the signed install endpoint URL from the page markers and one clock reading
pub fn build_install_url(base_url: &str, markers: &PageMarkers, now_millis: u64) -> String {
    let code = challenge_code(markers.authcode_value(), random_component(now_millis));
    let mut url = format!(
        "{}/app/install/{}?time={}&finalCode={}",
        base_url.trim_end_matches('/'),
        markers.a_key,
        now_millis,
        code
    );

    let sign = if markers.time_sign.is_empty() {
        String::new()
    } else {
        normalize_signature(&markers.time_sign)
    };
    if !sign.is_empty() {
        url.push_str("&timeSign=");
        url.push_str(&sign);
    }
    if !markers.install_token.is_empty() {
        url.push_str("&installToken=");
        url.push_str(&markers.install_token);
    }
    url
}

/// Whether a redirect target already names an android package
pub fn is_apk_location(location: &str) -> bool {
    location.ends_with(".apk") || location.contains(".apk?")
}

/// Whether `candidate` points at a share page on the service hosted at `base_url`
pub fn is_share_link(base_url: &str, candidate: &str) -> bool {
    let (Ok(base), Ok(candidate)) = (url::Url::parse(base_url), url::Url::parse(candidate))
    else {
        return false;
    };
    let strip = |host: &str| host.trim_start_matches("www.").to_ascii_lowercase();
    let same_host = match (base.host_str(), candidate.host_str()) {
        (Some(a), Some(b)) => strip(a) == strip(b),
        _ => false,
    };
    let path = candidate.path().to_ascii_lowercase();
    same_host && !path.ends_with(".apk") && !path.ends_with(".ipa")
}

/// Clients sharing one cookie session for a single resolution
struct ShareSession {
    page: Client,
    install: Client,
}

impl ShareSession {
    fn new(share_url: &str, timeout: Duration) -> Result<Self, AgentError> {
        let jar = Arc::new(Jar::default());

        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(MOBILE_BROWSER_UA));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static(ACCEPT_LANGUAGE),
        );
        let referer = HeaderValue::from_str(share_url)
            .map_err(|e| AgentError::ValidationError(format!("Invalid share URL: {}", e)))?;
        headers.insert(header::REFERER, referer);

        let page = Client::builder()
            .default_headers(headers.clone())
            .cookie_provider(jar.clone())
            .timeout(timeout)
            .build()?;
        let install = Client::builder()
            .default_headers(headers)
            .cookie_provider(jar)
            .redirect(redirect::Policy::none())
            .timeout(timeout)
            .build()?;

        Ok(Self { page, install })
    }
}

/// Resolves share-page URLs to direct `.apk`/`.ipa` URLs
pub struct ShareLinkResolver {
    base_url: String,
    timeout: Duration,
    manifest_client: Client,
    clock: Arc<dyn Clock>,
}

impl ShareLinkResolver {
    pub fn new(base_url: &str, timeout: Duration, clock: Arc<dyn Clock>) -> Result<Self, AgentError> {
        let manifest_client = Client::builder()
            .user_agent(STORE_CLIENT_UA)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            manifest_client,
            clock,
        })
    }

    pub fn is_share_link(&self, url: &str) -> bool {
        is_share_link(&self.base_url, url)
    }

    /// Run the full handshake for a share page
    pub async fn resolve(&self, share_url: &str) -> Result<String, AgentError> {
        let session = ShareSession::new(share_url, self.timeout)?;

        info!("Visiting share page: {}", share_url);
        let response = session
            .page
            .get(share_url)
            .send()
            .await
            .map_err(|e| AgentError::ResolutionError(format!("Share page unreachable: {}", e)))?;
        if !response.status().is_success() {
            return Err(AgentError::ResolutionError(format!(
                "Share page returned {}",
                response.status()
            )));
        }
        let html = response
            .text()
            .await
            .map_err(|e| AgentError::ResolutionError(format!("Share page unreadable: {}", e)))?;

        let markers = PageMarkers::parse(&html)?;
        let install_url = build_install_url(&self.base_url, &markers, self.clock.now_millis());

        info!("Requesting install endpoint: {}", install_url);
        let response = session
            .install
            .get(&install_url)
            .send()
            .await
            .map_err(|e| {
                AgentError::ResolutionError(format!("Install endpoint unreachable: {}", e))
            })?;

        if let Some(location) = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
        {
            let location = location.to_string();
            return self.follow_location(&location).await;
        }

        if response.status() == StatusCode::OK {
            match response.json::<InstallResponse>().await {
                Ok(InstallResponse {
                    code: 0,
                    data: Some(InstallData {
                        download_url: Some(url),
                    }),
                }) if !url.is_empty() => {
                    if is_itms_link(&url) {
                        return self.resolve_manifest(&url).await;
                    }
                    info!("Install endpoint returned download URL: {}", url);
                    return Ok(url);
                }
                Ok(body) => debug!("Install endpoint answered code {}", body.code),
                Err(e) => debug!("Install endpoint body is not JSON: {}", e),
            }
        }

        Err(AgentError::ResolutionError(
            "no download URL resolved".to_string(),
        ))
    }

    async fn follow_location(&self, location: &str) -> Result<String, AgentError> {
        if is_apk_location(location) {
            info!("Found APK URL: {}", location);
            return Ok(location.to_string());
        }
        if is_itms_link(location) {
            info!("Found itms-services link, reading install manifest");
            return self.resolve_manifest(location).await;
        }
        warn!("Unrecognized redirect from install endpoint: {}", location);
        Err(AgentError::ResolutionError(format!(
            "Unrecognized redirect to {}",
            location
        )))
    }

    /// Fetch the install manifest named by an itms-services link and return its IPA URL
    pub async fn resolve_manifest(&self, itms: &str) -> Result<String, AgentError> {
        let manifest = manifest_url(itms).ok_or_else(|| {
            AgentError::ResolutionError("itms-services link has no manifest url".to_string())
        })?;

        debug!("Fetching install manifest: {}", manifest);
        let response = self
            .manifest_client
            .get(&manifest)
            .send()
            .await
            .map_err(|e| AgentError::ResolutionError(format!("Manifest unreachable: {}", e)))?;
        if !response.status().is_success() {
            return Err(AgentError::ResolutionError(format!(
                "Failed to fetch manifest: {}",
                response.status()
            )));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| AgentError::ResolutionError(format!("Manifest unreadable: {}", e)))?;

        software_package_url(&body).ok_or_else(|| {
            AgentError::ResolutionError("Failed to extract IPA URL from manifest".to_string())
        })
    }
}
