//! Per-phase behaviour switches

use crate::device::android::InstallMode;

/// How the post-launch foreground check affects the result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForegroundCheck {
    /// A mismatch is logged; the phase still succeeds
    Advisory,
    /// A mismatch fails the phase
    Authoritative,
}

/// What a phase does at each step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhasePolicy {
    pub name: &'static str,
    /// Require screen-on and unlocked where the platform can tell
    pub require_ready: bool,
    pub uninstall_first: bool,
    pub install_mode: InstallMode,
    pub foreground: ForegroundCheck,
    /// Package the artifact must declare
    pub expected_package: Option<String>,
}

impl PhasePolicy {
    /// Fresh install of the baseline build
    pub fn install_old() -> Self {
        Self {
            name: "install_old",
            require_ready: true,
            uninstall_first: true,
            install_mode: InstallMode::Fresh,
            foreground: ForegroundCheck::Advisory,
            expected_package: None,
        }
    }

    /// In-place upgrade to the new build
    pub fn install_new(expected_package: &str) -> Self {
        Self {
            name: "install_new",
            require_ready: false,
            uninstall_first: false,
            install_mode: InstallMode::Upgrade,
            foreground: ForegroundCheck::Authoritative,
            expected_package: Some(expected_package.to_string()),
        }
    }
}
