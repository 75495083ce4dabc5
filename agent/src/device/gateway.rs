//! Device enumeration and addressing across platforms

use std::sync::Arc;

use tracing::{debug, error};

use crate::device::android::{AdbBridge, AdbEntry};
use crate::device::handle::DeviceHandle;
use crate::device::ios::{UsbmuxClient, UsbmuxEntry};
use crate::device::model::{Device, Platform, ReadinessPolicy, ReadinessProbe};
use crate::device::shell::CommandRunner;
use crate::errors::AgentError;

/// Entry point for everything that talks to attached devices
pub struct DeviceGateway {
    adb: Arc<AdbBridge>,
    usbmux: Arc<UsbmuxClient>,
    readiness_policy: ReadinessPolicy,
}

impl DeviceGateway {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        adb_path: &str,
        tidevice_path: &str,
        readiness_policy: ReadinessPolicy,
    ) -> Self {
        Self {
            adb: Arc::new(AdbBridge::new(runner.clone(), adb_path)),
            usbmux: Arc::new(UsbmuxClient::new(runner, tidevice_path)),
            readiness_policy,
        }
    }

    pub fn readiness_policy(&self) -> ReadinessPolicy {
        self.readiness_policy
    }

    /// List android and iOS devices. A failing platform contributes nothing.
    pub async fn list_devices(&self) -> Vec<Device> {
        let mut devices = Vec::new();

        match self.adb.list().await {
            Ok(entries) => {
                for entry in entries {
                    devices.push(self.describe_android(entry).await);
                }
            }
            Err(e) => error!("Error listing Android devices: {}", e),
        }

        match self.usbmux.list().await {
            Ok(entries) => devices.extend(entries.into_iter().map(describe_ios)),
            Err(e) => error!("Error listing iOS devices: {}", e),
        }

        devices
    }

    async fn describe_android(&self, entry: AdbEntry) -> Device {
        let (screen, unlock) = if entry.state == "device" {
            (
                self.adb.probe_screen(&entry.serial).await,
                self.adb.probe_unlock(&entry.serial).await,
            )
        } else {
            (ReadinessProbe::Indeterminate, ReadinessProbe::Indeterminate)
        };

        Device {
            screen_on: self.readiness_policy.is_ready(screen),
            unlocked: self.readiness_policy.is_ready(unlock),
            serial: entry.serial,
            platform: Platform::Android,
            state: entry.state,
            model: entry.model.unwrap_or_else(|| "Unknown".to_string()),
            product: entry.product.unwrap_or_else(|| "Unknown".to_string()),
            device: entry.device.unwrap_or_else(|| "Unknown".to_string()),
        }
    }

    /// Determine which platform a serial belongs to
    pub async fn get_platform(&self, serial: &str) -> Platform {
        match self.adb.list().await {
            Ok(entries) if entries.iter().any(|e| e.serial == serial) => return Platform::Android,
            Ok(_) => {}
            Err(e) => debug!("Android lookup for {} failed: {}", serial, e),
        }

        match self.usbmux.list().await {
            Ok(entries) if entries.iter().any(|e| e.udid == serial) => return Platform::Ios,
            Ok(_) => {}
            Err(e) => debug!("iOS lookup for {} failed: {}", serial, e),
        }

        Platform::Unknown
    }

    /// Resolve a serial to a device handle
    pub async fn open(&self, serial: &str) -> Result<DeviceHandle, AgentError> {
        match self.get_platform(serial).await {
            Platform::Android => Ok(DeviceHandle::Android {
                serial: serial.to_string(),
                bridge: self.adb.clone(),
            }),
            Platform::Ios => Ok(DeviceHandle::Ios {
                udid: serial.to_string(),
                usbmux: self.usbmux.clone(),
            }),
            Platform::Unknown => Err(AgentError::DeviceError(format!(
                "Device {} not found",
                serial
            ))),
        }
    }
}

fn describe_ios(entry: UsbmuxEntry) -> Device {
    Device {
        serial: entry.udid,
        platform: Platform::Ios,
        state: "device".to_string(),
        model: entry.name.unwrap_or_else(|| "iOS Device".to_string()),
        product: entry.market_name.unwrap_or_else(|| "Unknown".to_string()),
        device: "iPhone".to_string(),
        screen_on: true,
        unlocked: true,
    }
}
