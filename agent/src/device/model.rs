//! Device data model

use serde::{Deserialize, Serialize};

/// Device platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
    Unknown,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Android => write!(f, "android"),
            Platform::Ios => write!(f, "ios"),
            Platform::Unknown => write!(f, "unknown"),
        }
    }
}

/// A connected device, re-derived on every query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub serial: String,
    pub platform: Platform,
    /// Bridge connection state ("device", "unauthorized", "offline", ...)
    pub state: String,
    pub model: String,
    pub product: String,
    pub device: String,
    pub screen_on: bool,
    pub unlocked: bool,
}

/// Outcome of a best-effort readiness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessProbe {
    /// A probe reported a positive signal
    Ready,
    /// Every probe ran and none reported a positive signal
    NotReady,
    /// A probe could not be executed
    Indeterminate,
}

/// How an indeterminate probe is interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessPolicy {
    /// Treat indeterminate as ready so an unreliable check never blocks a run
    #[default]
    FailOpen,
    /// Treat indeterminate as not ready
    FailClosed,
}

impl ReadinessPolicy {
    pub fn is_ready(&self, probe: ReadinessProbe) -> bool {
        match probe {
            ReadinessProbe::Ready => true,
            ReadinessProbe::NotReady => false,
            ReadinessProbe::Indeterminate => matches!(self, ReadinessPolicy::FailOpen),
        }
    }
}

/// Screen and lock probes for one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub screen: ReadinessProbe,
    pub unlock: ReadinessProbe,
}

impl Readiness {
    /// Readiness of a device that has no screen/lock checks
    pub fn assumed() -> Self {
        Self {
            screen: ReadinessProbe::Ready,
            unlock: ReadinessProbe::Ready,
        }
    }
}
