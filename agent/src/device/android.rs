//! Android debug bridge driver

use std::path::Path;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::device::model::ReadinessProbe;
use crate::device::shell::{CommandOutput, CommandRunner};
use crate::errors::AgentError;

/// Probe command and the markers that count as a positive signal
type Probe = (&'static str, &'static [&'static str]);

const SCREEN_PROBES: &[Probe] = &[
    ("dumpsys power", &["mWakefulness=Awake"]),
    ("dumpsys deviceidle", &["mScreenOn=true"]),
    ("dumpsys display", &["state=ON"]),
];

const UNLOCK_PROBES: &[Probe] = &[
    (
        "dumpsys window policy",
        &["mShowingLockscreen=false", "mDreamingLockscreen=false"],
    ),
    ("dumpsys trust", &["mDeviceLocked=false"]),
    ("dumpsys activity activities", &["mKeyguardShowing=false"]),
];

static RESUMED_ACTIVITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:mResumedActivity|topResumedActivity)[:=]\s*ActivityRecord\{\S+ \S+ ([A-Za-z0-9_.]+)/")
        .expect("valid regex")
});

static FOCUSED_WINDOW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"mCurrentFocus=Window\{\S+ \S+ ([A-Za-z0-9_.]+)/").expect("valid regex")
});

/// One line of `adb devices -l`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdbEntry {
    pub serial: String,
    pub state: String,
    pub model: Option<String>,
    pub product: Option<String>,
    pub device: Option<String>,
}

/// Install flags passed to `adb install`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMode {
    /// `-r -t`: replace and allow test packages
    Fresh,
    /// `-r`: replace keeping data
    Upgrade,
}

impl InstallMode {
    fn adb_flags(&self) -> &'static [&'static str] {
        match self {
            InstallMode::Fresh => &["-r", "-t"],
            InstallMode::Upgrade => &["-r"],
        }
    }
}

/// Thin async wrapper around the `adb` executable
pub struct AdbBridge {
    runner: Arc<dyn CommandRunner>,
    adb_path: String,
}

impl AdbBridge {
    pub fn new(runner: Arc<dyn CommandRunner>, adb_path: impl Into<String>) -> Self {
        Self {
            runner,
            adb_path: adb_path.into(),
        }
    }

    async fn adb(&self, args: &[&str]) -> Result<CommandOutput, AgentError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.runner.run(&self.adb_path, &args).await
    }

    /// Enumerate devices known to the bridge
    pub async fn list(&self) -> Result<Vec<AdbEntry>, AgentError> {
        let output = self.adb(&["devices", "-l"]).await?;
        if !output.success {
            return Err(AgentError::DeviceError(format!(
                "adb devices failed: {}",
                output.combined()
            )));
        }
        Ok(parse_device_list(&output.stdout))
    }

    /// Run a shell command on the device and return its stdout
    pub async fn shell(&self, serial: &str, command: &str) -> Result<String, AgentError> {
        let output = self.adb(&["-s", serial, "shell", command]).await?;
        if !output.success {
            return Err(AgentError::DeviceError(format!(
                "`{}` failed on {}: {}",
                command,
                serial,
                output.combined()
            )));
        }
        Ok(output.stdout)
    }

    pub async fn install(
        &self,
        serial: &str,
        path: &Path,
        mode: InstallMode,
    ) -> Result<(), AgentError> {
        let path = path.to_string_lossy();
        let mut args = vec!["-s", serial, "install"];
        args.extend_from_slice(mode.adb_flags());
        args.push(&path);

        let output = self.adb(&args).await?;
        if !output.success || !output.stdout.contains("Success") {
            return Err(AgentError::DeviceError(format!(
                "Install of {} on {} failed: {}",
                path,
                serial,
                output.combined()
            )));
        }
        Ok(())
    }

    pub async fn uninstall(&self, serial: &str, package: &str) -> Result<(), AgentError> {
        let output = self.adb(&["-s", serial, "uninstall", package]).await?;
        if !output.success || !output.stdout.contains("Success") {
            return Err(AgentError::DeviceError(format!(
                "Uninstall of {} on {} failed: {}",
                package,
                serial,
                output.combined()
            )));
        }
        Ok(())
    }

    /// Start the package through its launcher intent
    pub async fn launch(&self, serial: &str, package: &str) -> Result<(), AgentError> {
        let command = format!(
            "monkey -p {} -c android.intent.category.LAUNCHER 1",
            package
        );
        let stdout = self.shell(serial, &command).await?;
        if stdout.contains("No activities found") || stdout.contains("monkey aborted") {
            return Err(AgentError::DeviceError(format!(
                "Launch of {} on {} failed: {}",
                package,
                serial,
                stdout.trim()
            )));
        }
        Ok(())
    }

    /// Package currently in the foreground, if one can be identified
    pub async fn foreground_package(&self, serial: &str) -> Result<Option<String>, AgentError> {
        let activities = self.shell(serial, "dumpsys activity activities").await?;
        if let Some(package) = parse_foreground_package(&activities) {
            return Ok(Some(package));
        }

        let windows = self.shell(serial, "dumpsys window windows").await?;
        Ok(parse_foreground_package(&windows))
    }

    pub async fn probe_screen(&self, serial: &str) -> ReadinessProbe {
        self.run_probes(serial, "screen", SCREEN_PROBES).await
    }

    pub async fn probe_unlock(&self, serial: &str) -> ReadinessProbe {
        self.run_probes(serial, "lock", UNLOCK_PROBES).await
    }

    async fn run_probes(&self, serial: &str, what: &str, probes: &[Probe]) -> ReadinessProbe {
        for (command, markers) in probes {
            match self.shell(serial, command).await {
                Ok(output) => {
                    if markers.iter().any(|marker| output.contains(marker)) {
                        return ReadinessProbe::Ready;
                    }
                }
                Err(e) => {
                    warn!("Error checking {} state of {}: {}", what, serial, e);
                    return ReadinessProbe::Indeterminate;
                }
            }
        }

        debug!("No positive {} signal from {}", what, serial);
        ReadinessProbe::NotReady
    }
}

/// Parse `adb devices -l` output
pub fn parse_device_list(output: &str) -> Vec<AdbEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty() && !line.starts_with("List of devices") && !line.starts_with('*')
        })
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let serial = fields.next()?.to_string();
            let state = fields.next()?.to_string();

            let mut entry = AdbEntry {
                serial,
                state,
                model: None,
                product: None,
                device: None,
            };
            for field in fields {
                match field.split_once(':') {
                    Some(("model", v)) => entry.model = Some(v.to_string()),
                    Some(("product", v)) => entry.product = Some(v.to_string()),
                    Some(("device", v)) => entry.device = Some(v.to_string()),
                    _ => {}
                }
            }
            Some(entry)
        })
        .collect()
}

/// Extract the resumed or focused package from dumpsys output
pub fn parse_foreground_package(output: &str) -> Option<String> {
    RESUMED_ACTIVITY
        .captures(output)
        .or_else(|| FOCUSED_WINDOW.captures(output))
        .map(|caps| caps[1].to_string())
}
