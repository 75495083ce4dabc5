//! Platform-neutral device capabilities

use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::device::android::{AdbBridge, InstallMode};
use crate::device::ios::UsbmuxClient;
use crate::device::model::{Platform, Readiness};
use crate::errors::AgentError;

/// Operations a test phase performs on a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Install,
    Uninstall,
    Launch,
}

/// What to do when a capability fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// The failure ends the phase with an error
    Propagate,
    /// The failure is logged and the phase continues
    Ignore,
}

/// A resolved device on one of the supported platforms
#[derive(Clone)]
pub enum DeviceHandle {
    Android {
        serial: String,
        bridge: Arc<AdbBridge>,
    },
    Ios {
        udid: String,
        usbmux: Arc<UsbmuxClient>,
    },
}

impl DeviceHandle {
    pub fn serial(&self) -> &str {
        match self {
            DeviceHandle::Android { serial, .. } => serial,
            DeviceHandle::Ios { udid, .. } => udid,
        }
    }

    pub fn platform(&self) -> Platform {
        match self {
            DeviceHandle::Android { .. } => Platform::Android,
            DeviceHandle::Ios { .. } => Platform::Ios,
        }
    }

    pub fn error_policy(&self, capability: Capability) -> ErrorPolicy {
        match (self, capability) {
            (_, Capability::Install) => ErrorPolicy::Propagate,
            (_, Capability::Uninstall) => ErrorPolicy::Ignore,
            (DeviceHandle::Android { .. }, Capability::Launch) => ErrorPolicy::Propagate,
            (DeviceHandle::Ios { .. }, Capability::Launch) => ErrorPolicy::Ignore,
        }
    }

    /// Whether screen and lock state can be probed before a run
    pub fn has_readiness_checks(&self) -> bool {
        matches!(self, DeviceHandle::Android { .. })
    }

    /// Whether the foreground package can be queried
    pub fn has_foreground_query(&self) -> bool {
        matches!(self, DeviceHandle::Android { .. })
    }

    pub async fn readiness(&self) -> Readiness {
        match self {
            DeviceHandle::Android { serial, bridge } => Readiness {
                screen: bridge.probe_screen(serial).await,
                unlock: bridge.probe_unlock(serial).await,
            },
            DeviceHandle::Ios { .. } => Readiness::assumed(),
        }
    }

    pub async fn install(&self, path: &Path, mode: InstallMode) -> Result<(), AgentError> {
        let result = match self {
            DeviceHandle::Android { serial, bridge } => bridge.install(serial, path, mode).await,
            DeviceHandle::Ios { udid, usbmux } => usbmux.install(udid, path).await,
        };
        self.apply_policy(Capability::Install, result)
    }

    pub async fn uninstall(&self, package: &str) -> Result<(), AgentError> {
        let result = match self {
            DeviceHandle::Android { serial, bridge } => bridge.uninstall(serial, package).await,
            DeviceHandle::Ios { udid, usbmux } => usbmux.uninstall(udid, package).await,
        };
        self.apply_policy(Capability::Uninstall, result)
    }

    pub async fn launch(&self, package: &str) -> Result<(), AgentError> {
        let result = match self {
            DeviceHandle::Android { serial, bridge } => bridge.launch(serial, package).await,
            DeviceHandle::Ios { udid, usbmux } => usbmux.launch(udid, package).await,
        };
        self.apply_policy(Capability::Launch, result)
    }

    /// Foreground package; `Ok(None)` when unknown or unsupported
    pub async fn foreground_package(&self) -> Result<Option<String>, AgentError> {
        match self {
            DeviceHandle::Android { serial, bridge } => bridge.foreground_package(serial).await,
            DeviceHandle::Ios { .. } => Ok(None),
        }
    }

    fn apply_policy(
        &self,
        capability: Capability,
        result: Result<(), AgentError>,
    ) -> Result<(), AgentError> {
        match (result, self.error_policy(capability)) {
            (Ok(()), _) => Ok(()),
            (Err(e), ErrorPolicy::Propagate) => Err(e),
            (Err(e), ErrorPolicy::Ignore) => {
                warn!(
                    "Ignoring {:?} failure on {} device {}: {}",
                    capability,
                    self.platform(),
                    self.serial(),
                    e
                );
                Ok(())
            }
        }
    }
}
