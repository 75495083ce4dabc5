//! Utility functions

use std::time::{SystemTime, UNIX_EPOCH};

use colored::Colorize;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// Version information for the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Source of wall-clock milliseconds
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

/// Clock frozen at a given instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now_millis(&self) -> u64 {
        self.0
    }
}

/// Current unix time in seconds
pub fn unix_secs() -> u64 {
    SystemClock.now_millis() / 1000
}

/// Generate a random UUID v4
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Calculate SHA256 hash of data
pub fn sha256_hash(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Hex encoding utilities
pub mod hex {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

    pub fn encode(data: impl AsRef<[u8]>) -> String {
        let data = data.as_ref();
        let mut result = String::with_capacity(data.len() * 2);
        for byte in data {
            result.push(HEX_CHARS[(byte >> 4) as usize] as char);
            result.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
        }
        result
    }
}

/// Check that the device bridge tools can be executed and print a report
pub async fn run_diagnostic(adb_path: &str, tidevice_path: &str) {
    println!("{}", "appcompat diagnostic".bold());

    let version = version_info();
    println!(
        "  version: {} ({}, built {})",
        version.version, version.git_hash, version.build_time
    );

    for (label, program, args) in [
        ("android bridge", adb_path, vec!["version"]),
        ("ios usbmux", tidevice_path, vec!["version"]),
    ] {
        match Command::new(program).args(&args).output().await {
            Ok(output) if output.status.success() => {
                let first_line = String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .to_string();
                println!("  {} {} ({}): {}", "ok".green(), label, program, first_line);
            }
            Ok(output) => {
                println!(
                    "  {} {} ({}): exited with {}",
                    "fail".red(),
                    label,
                    program,
                    output.status
                );
            }
            Err(e) => {
                println!("  {} {} ({}): {}", "missing".yellow(), label, program, e);
            }
        }
    }
}
