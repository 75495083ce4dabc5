//! iOS usbmux driver backed by the `tidevice` executable

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::device::shell::{CommandOutput, CommandRunner};
use crate::errors::AgentError;

/// One device reported by `tidevice list --json`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UsbmuxEntry {
    pub udid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub market_name: Option<String>,
    #[serde(default)]
    pub product_version: Option<String>,
    #[serde(default)]
    pub conn_type: Option<String>,
}

pub struct UsbmuxClient {
    runner: Arc<dyn CommandRunner>,
    tidevice_path: String,
}

impl UsbmuxClient {
    pub fn new(runner: Arc<dyn CommandRunner>, tidevice_path: impl Into<String>) -> Self {
        Self {
            runner,
            tidevice_path: tidevice_path.into(),
        }
    }

    async fn tidevice(&self, args: &[&str]) -> Result<CommandOutput, AgentError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.runner.run(&self.tidevice_path, &args).await
    }

    async fn checked(&self, action: &str, args: &[&str]) -> Result<(), AgentError> {
        let output = self.tidevice(args).await?;
        if !output.success {
            return Err(AgentError::DeviceError(format!(
                "{} failed: {}",
                action,
                output.combined()
            )));
        }
        Ok(())
    }

    /// Enumerate devices attached over usbmux
    pub async fn list(&self) -> Result<Vec<UsbmuxEntry>, AgentError> {
        let output = self.tidevice(&["list", "--json"]).await?;
        if !output.success {
            return Err(AgentError::DeviceError(format!(
                "tidevice list failed: {}",
                output.combined()
            )));
        }
        parse_device_list(&output.stdout)
    }

    pub async fn install(&self, udid: &str, path: &Path) -> Result<(), AgentError> {
        let path = path.to_string_lossy();
        self.checked(
            &format!("Install of {} on {}", path, udid),
            &["-u", udid, "install", &path],
        )
        .await
    }

    pub async fn uninstall(&self, udid: &str, bundle_id: &str) -> Result<(), AgentError> {
        self.checked(
            &format!("Uninstall of {} on {}", bundle_id, udid),
            &["-u", udid, "uninstall", bundle_id],
        )
        .await
    }

    pub async fn launch(&self, udid: &str, bundle_id: &str) -> Result<(), AgentError> {
        self.checked(
            &format!("Launch of {} on {}", bundle_id, udid),
            &["-u", udid, "launch", bundle_id],
        )
        .await
    }
}

/// Parse the JSON array printed by `tidevice list --json`
pub fn parse_device_list(output: &str) -> Result<Vec<UsbmuxEntry>, AgentError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(trimmed)?)
}
