//! Drives install-old and install-new phases against a device

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::artifact::metadata;
use crate::artifact::resolver::{ArtifactResolver, ArtifactSource};
use crate::device::gateway::DeviceGateway;
use crate::device::handle::DeviceHandle;
use crate::device::model::Platform;
use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::orchestrator::fsm::{TestEvent, TestFsm};
use crate::orchestrator::locks::DeviceLocks;
use crate::orchestrator::policy::{ForegroundCheck, PhasePolicy};
use crate::orchestrator::result::TestResult;
use crate::storage::settings::OrchestratorSettings;

/// Settle delays between device steps
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    pub uninstall_settle: Duration,
    pub launch_settle: Duration,
}

impl Timings {
    /// No waiting, for tests and dry runs
    pub fn none() -> Self {
        Self {
            uninstall_settle: Duration::ZERO,
            launch_settle: Duration::ZERO,
        }
    }
}

impl From<&OrchestratorSettings> for Timings {
    fn from(settings: &OrchestratorSettings) -> Self {
        Self {
            uninstall_settle: settings.uninstall_settle(),
            launch_settle: settings.launch_settle(),
        }
    }
}

/// How a phase ended when no fault occurred
enum Verdict {
    Pass(TestResult),
    Reject(String),
}

pub struct Orchestrator {
    gateway: Arc<DeviceGateway>,
    resolver: Arc<ArtifactResolver>,
    locks: DeviceLocks,
    timings: Timings,
}

impl Orchestrator {
    pub fn new(gateway: Arc<DeviceGateway>, resolver: Arc<ArtifactResolver>, timings: Timings) -> Self {
        Self {
            gateway,
            resolver,
            locks: DeviceLocks::new(),
            timings,
        }
    }

    /// Phase one: fresh install and launch of the baseline build
    pub async fn install_old(
        &self,
        serial: &str,
        local_name: Option<&str>,
        remote_url: Option<&str>,
    ) -> TestResult {
        self.run(PhasePolicy::install_old(), serial, local_name, remote_url)
            .await
    }

    /// Phase two: upgrade in place and require the app in the foreground
    pub async fn install_new(
        &self,
        serial: &str,
        expected_package: &str,
        local_name: Option<&str>,
        remote_url: Option<&str>,
    ) -> TestResult {
        if expected_package.trim().is_empty() {
            return TestResult::failed("package_name is required for new build installation.");
        }
        self.run(
            PhasePolicy::install_new(expected_package.trim()),
            serial,
            local_name,
            remote_url,
        )
        .await
    }

    async fn run(
        &self,
        policy: PhasePolicy,
        serial: &str,
        local_name: Option<&str>,
        remote_url: Option<&str>,
    ) -> TestResult {
        let mut fsm = TestFsm::new();
        let outcome = self
            .drive(&mut fsm, &policy, serial, local_name, remote_url)
            .await;

        let result = match outcome {
            Ok(Verdict::Pass(result)) => result,
            Ok(Verdict::Reject(reason)) => {
                warn!("{} on {} failed: {}", policy.name, serial, reason);
                let _ = fsm.process(TestEvent::Reject(reason.clone()));
                TestResult::failed(reason)
            }
            Err(e) => {
                error!("{} on {} errored in {:?}: {}", policy.name, serial, fsm.state(), e);
                let message = e.to_string();
                let _ = fsm.process(TestEvent::Fault(message.clone()));
                TestResult::error(message)
            }
        };

        info!(
            "{} on {} finished: {} via {:?}",
            policy.name,
            serial,
            result.status(),
            fsm.history()
        );
        result
    }

    async fn drive(
        &self,
        fsm: &mut TestFsm,
        policy: &PhasePolicy,
        serial: &str,
        local_name: Option<&str>,
        remote_url: Option<&str>,
    ) -> Result<Verdict, AgentError> {
        let step = |fsm: &mut TestFsm, event: TestEvent| {
            fsm.process(event).map(|_| ()).map_err(AgentError::Internal)
        };

        // Init
        let source = match ArtifactSource::from_request(local_name, remote_url) {
            Ok(source) => source,
            Err(e) => return Ok(Verdict::Reject(e.to_string())),
        };
        let Some(_guard) = self.locks.try_acquire(serial) else {
            return Ok(Verdict::Reject(format!(
                "Device {} is busy with another test",
                serial
            )));
        };
        step(fsm, TestEvent::Begin)?;

        // PreconditionCheck
        let device = self.gateway.open(serial).await?;
        if policy.require_ready && device.has_readiness_checks() {
            let readiness = device.readiness().await;
            let readiness_policy = self.gateway.readiness_policy();
            if !readiness_policy.is_ready(readiness.screen) {
                return Ok(Verdict::Reject("Screen is OFF. Please turn it on.".to_string()));
            }
            if !readiness_policy.is_ready(readiness.unlock) {
                return Ok(Verdict::Reject("Device is LOCKED. Please unlock it.".to_string()));
            }
        }
        step(fsm, TestEvent::PreconditionsMet)?;

        // Resolve; a temporary artifact is removed when `artifact` drops
        let artifact = self.resolver.resolve(&source).await?;
        if !File::new(artifact.path()).exists().await {
            return Ok(Verdict::Reject(format!(
                "Artifact file not found: {}",
                source.describe()
            )));
        }
        step(fsm, TestEvent::Resolved)?;

        // ParseMetadata
        let meta = metadata::inspect(artifact.path()).await;
        if !meta.has_package() {
            return Ok(Verdict::Reject(
                "Could not parse package name from artifact.".to_string(),
            ));
        }
        if let Some(expected) = &policy.expected_package {
            if &meta.package_name != expected {
                return Ok(Verdict::Reject(format!(
                    "Package name mismatch! Expected: {}, New: {}",
                    expected, meta.package_name
                )));
            }
        }
        let package = meta.package_name.as_str();
        info!(
            "{}: {} ({} v{}) on {}",
            policy.name,
            source.describe(),
            package,
            meta.version_name,
            serial
        );
        step(
            fsm,
            TestEvent::MetadataAccepted {
                uninstall: policy.uninstall_first,
            },
        )?;

        // Uninstall
        if policy.uninstall_first {
            info!("Uninstalling {}...", package);
            device.uninstall(package).await?;
            tokio::time::sleep(self.timings.uninstall_settle).await;
            step(fsm, TestEvent::Uninstalled)?;
        }

        // Install
        info!("Installing {}...", artifact.path().display());
        device.install(artifact.path(), policy.install_mode).await?;
        step(fsm, TestEvent::Installed)?;

        // Launch
        info!("Launching {}...", package);
        device.launch(package).await?;
        tokio::time::sleep(self.timings.launch_settle).await;
        step(fsm, TestEvent::Launched)?;

        // VerifyForeground
        if let Some(reason) = self.verify_foreground(&device, policy, package).await? {
            return Ok(Verdict::Reject(reason));
        }
        step(fsm, TestEvent::Verified)?;

        let kind = match device.platform() {
            Platform::Ios => "IPA",
            _ => "APK",
        };
        let message = match policy.foreground {
            ForegroundCheck::Advisory => {
                format!("Old {} Installed: {} (v{})", kind, package, meta.version_name)
            }
            ForegroundCheck::Authoritative => format!(
                "Update Success! App is running. Version: {} ({})",
                meta.version_name, meta.version_code
            ),
        };

        Ok(Verdict::Pass(TestResult::Success {
            message,
            package_name: meta.package_name.clone(),
            version_name: meta.version_name.clone(),
            version_code: meta.version_code.clone(),
        }))
    }

    /// `Some(reason)` when an authoritative check rejects the phase
    async fn verify_foreground(
        &self,
        device: &DeviceHandle,
        policy: &PhasePolicy,
        package: &str,
    ) -> Result<Option<String>, AgentError> {
        if !device.has_foreground_query() {
            return Ok(None);
        }

        let current = match (device.foreground_package().await, policy.foreground) {
            (Ok(current), _) => current,
            (Err(e), ForegroundCheck::Advisory) => {
                warn!("Could not read foreground package on {}: {}", device.serial(), e);
                return Ok(None);
            }
            (Err(e), ForegroundCheck::Authoritative) => return Err(e),
        };

        if current.as_deref() == Some(package) {
            return Ok(None);
        }

        let current = current.unwrap_or_else(|| "unknown".to_string());
        match policy.foreground {
            ForegroundCheck::Advisory => {
                warn!(
                    "App might not have started correctly; foreground is {}",
                    current
                );
                Ok(None)
            }
            ForegroundCheck::Authoritative => Ok(Some(format!(
                "App is not in foreground after update. Current: {}",
                current
            ))),
        }
    }
}
