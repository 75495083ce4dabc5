//! Install-old / install-new phases against a scripted device

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tempfile::TempDir;
use tokio::sync::Notify;

use appcompat::artifact::ArtifactResolver;
use appcompat::device::gateway::DeviceGateway;
use appcompat::device::model::ReadinessPolicy;
use appcompat::device::shell::CommandOutput;
use appcompat::orchestrator::{Orchestrator, TestResult, Timings};
use appcompat::share::ShareLinkResolver;
use appcompat::utils::SystemClock;

use crate::support::{apk, entries_in, ipa, FakeRunner};

const SERIAL: &str = "R58M41ABCDE";
const UDID: &str = "00008030-001A2B3C4D5E";
const PACKAGE: &str = "com.example.shop";

struct Rig {
    _dir: TempDir,
    storage: PathBuf,
    temp: PathBuf,
    runner: Arc<FakeRunner>,
    orchestrator: Arc<Orchestrator>,
}

fn rig_with_policy(runner: Arc<FakeRunner>, policy: ReadinessPolicy) -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let storage = dir.path().join("artifacts");
    let temp = dir.path().join("tmp");
    std::fs::create_dir_all(&storage).unwrap();

    let share = Arc::new(
        ShareLinkResolver::new(
            "https://share.example.com",
            Duration::from_secs(5),
            Arc::new(SystemClock),
        )
        .unwrap(),
    );
    let resolver = Arc::new(ArtifactResolver::new(&storage, &temp, Client::new(), share));
    let gateway = Arc::new(DeviceGateway::new(runner.clone(), "adb", "tidevice", policy));

    Rig {
        _dir: dir,
        storage,
        temp,
        runner,
        orchestrator: Arc::new(Orchestrator::new(gateway, resolver, Timings::none())),
    }
}

fn rig(runner: Arc<FakeRunner>) -> Rig {
    rig_with_policy(runner, ReadinessPolicy::FailOpen)
}

impl Rig {
    fn store(&self, name: &str, contents: &[u8]) {
        std::fs::write(self.storage.join(name), contents).unwrap();
    }

    fn installs(&self) -> usize {
        self.runner.count(&format!("adb -s {} install", SERIAL))
    }

    fn uninstalls(&self) -> usize {
        self.runner.count(&format!("adb -s {} uninstall", SERIAL))
    }
}

// ================================ INSTALL OLD ================================ //

#[tokio::test]
async fn test_install_old_success() {
    let runner = FakeRunner::new();
    runner.android_device(SERIAL, PACKAGE);
    let rig = rig(runner);
    rig.store("old.apk", &apk(PACKAGE, "1.0", 10));

    let result = rig.orchestrator.install_old(SERIAL, Some("old.apk"), None).await;

    assert_eq!(
        result,
        TestResult::Success {
            message: "Old APK Installed: com.example.shop (v1.0)".to_string(),
            package_name: PACKAGE.to_string(),
            version_name: "1.0".to_string(),
            version_code: "10".to_string(),
        }
    );
    assert_eq!(rig.uninstalls(), 1);
    assert_eq!(
        rig.runner
            .count(&format!("adb -s {} uninstall {}", SERIAL, PACKAGE)),
        1
    );
    assert_eq!(
        rig.runner.count(&format!("adb -s {} install -r -t ", SERIAL)),
        1
    );
    assert_eq!(
        rig.runner.count(&format!("adb -s {} shell monkey -p {}", SERIAL, PACKAGE)),
        1
    );
}

#[tokio::test]
async fn test_install_old_screen_off_touches_nothing() {
    let runner = FakeRunner::new();
    runner.android_device(SERIAL, PACKAGE).screen_off(SERIAL);
    let rig = rig(runner);
    rig.store("old.apk", &apk(PACKAGE, "1.0", 10));

    let result = rig.orchestrator.install_old(SERIAL, Some("old.apk"), None).await;

    assert_eq!(result, TestResult::failed("Screen is OFF. Please turn it on."));
    assert_eq!(rig.installs(), 0);
    assert_eq!(rig.uninstalls(), 0);
}

#[tokio::test]
async fn test_install_old_locked_device() {
    let runner = FakeRunner::new();
    runner
        .android_device(SERIAL, PACKAGE)
        .on(
            &format!("adb -s {} shell dumpsys window policy", SERIAL),
            CommandOutput::ok("    mShowingLockscreen=true mShowingDream=false\n"),
        )
        .on(
            &format!("adb -s {} shell dumpsys trust", SERIAL),
            CommandOutput::ok("  mDeviceLocked=true\n"),
        )
        .on(
            &format!("adb -s {} shell dumpsys activity activities", SERIAL),
            CommandOutput::ok("  mKeyguardShowing=true\n"),
        );
    let rig = rig(runner);
    rig.store("old.apk", &apk(PACKAGE, "1.0", 10));

    let result = rig.orchestrator.install_old(SERIAL, Some("old.apk"), None).await;

    assert_eq!(result, TestResult::failed("Device is LOCKED. Please unlock it."));
    assert_eq!(rig.installs(), 0);
}

#[tokio::test]
async fn test_failing_probe_follows_readiness_policy() {
    let make_runner = || {
        let runner = FakeRunner::new();
        runner.android_device(SERIAL, PACKAGE).on(
            &format!("adb -s {} shell dumpsys power", SERIAL),
            CommandOutput::failed("error: closed"),
        );
        runner
    };

    let open = rig_with_policy(make_runner(), ReadinessPolicy::FailOpen);
    open.store("old.apk", &apk(PACKAGE, "1.0", 10));
    let result = open.orchestrator.install_old(SERIAL, Some("old.apk"), None).await;
    assert!(result.is_success(), "{:?}", result);

    let closed = rig_with_policy(make_runner(), ReadinessPolicy::FailClosed);
    closed.store("old.apk", &apk(PACKAGE, "1.0", 10));
    let result = closed.orchestrator.install_old(SERIAL, Some("old.apk"), None).await;
    assert_eq!(result, TestResult::failed("Screen is OFF. Please turn it on."));
    assert_eq!(closed.installs(), 0);
}

#[tokio::test]
async fn test_install_old_foreground_check_is_advisory() {
    let runner = FakeRunner::new();
    runner.android_device(SERIAL, "com.android.launcher3");
    let rig = rig(runner);
    rig.store("old.apk", &apk(PACKAGE, "1.0", 10));

    let result = rig.orchestrator.install_old(SERIAL, Some("old.apk"), None).await;
    assert!(result.is_success(), "{:?}", result);
}

#[tokio::test]
async fn test_install_old_on_ios() {
    let runner = FakeRunner::new();
    runner.ios_device(UDID);
    let rig = rig(runner);
    rig.store("old.ipa", &ipa(PACKAGE, "1.0", "100"));

    let result = rig.orchestrator.install_old(UDID, Some("old.ipa"), None).await;

    assert_eq!(
        result,
        TestResult::Success {
            message: "Old IPA Installed: com.example.shop (v1.0)".to_string(),
            package_name: PACKAGE.to_string(),
            version_name: "1.0".to_string(),
            version_code: "100".to_string(),
        }
    );
    assert_eq!(rig.runner.count(&format!("tidevice -u {} install ", UDID)), 1);
    assert_eq!(
        rig.runner.count(&format!("tidevice -u {} launch {}", UDID, PACKAGE)),
        1
    );
}

#[tokio::test]
async fn test_missing_local_artifact() {
    let runner = FakeRunner::new();
    runner.android_device(SERIAL, PACKAGE);
    let rig = rig(runner);

    let result = rig
        .orchestrator
        .install_old(SERIAL, Some("missing.apk"), None)
        .await;
    assert_eq!(result, TestResult::failed("Artifact file not found: missing.apk"));
    assert_eq!(rig.installs(), 0);
}

#[tokio::test]
async fn test_unparseable_artifact() {
    let runner = FakeRunner::new();
    runner.android_device(SERIAL, PACKAGE);
    let rig = rig(runner);
    rig.store("broken.apk", b"definitely not a zip archive");

    let result = rig
        .orchestrator
        .install_old(SERIAL, Some("broken.apk"), None)
        .await;
    assert_eq!(
        result,
        TestResult::failed("Could not parse package name from artifact.")
    );
    assert_eq!(rig.installs(), 0);
}

#[tokio::test]
async fn test_requires_exactly_one_source() {
    let runner = FakeRunner::new();
    runner.android_device(SERIAL, PACKAGE);
    let rig = rig(runner);

    let neither = rig.orchestrator.install_old(SERIAL, None, Some("  ")).await;
    assert_eq!(neither.status(), "failed");

    let both = rig
        .orchestrator
        .install_old(SERIAL, Some("old.apk"), Some("https://cdn.example.com/a.apk"))
        .await;
    assert_eq!(both.status(), "failed");
    assert!(rig.runner.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_device_is_error() {
    let runner = FakeRunner::new();
    runner
        .on("adb devices -l", CommandOutput::ok("List of devices attached\n\n"))
        .on("tidevice list --json", CommandOutput::ok("[]"));
    let rig = rig(runner);
    rig.store("old.apk", &apk(PACKAGE, "1.0", 10));

    let result = rig.orchestrator.install_old("ghost", Some("old.apk"), None).await;
    match result {
        TestResult::Error { message } => assert!(message.contains("Device ghost not found")),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_busy_device_rejects_second_run() {
    let runner = FakeRunner::new();
    runner.android_device(SERIAL, PACKAGE);
    let release = Arc::new(Notify::new());
    runner.gate(&format!("adb -s {} install", SERIAL), release.clone());
    let rig = rig(runner);
    rig.store("old.apk", &apk(PACKAGE, "1.0", 10));

    let orchestrator = rig.orchestrator.clone();
    let first =
        tokio::spawn(async move { orchestrator.install_old(SERIAL, Some("old.apk"), None).await });
    while rig.installs() == 0 {
        tokio::task::yield_now().await;
    }

    let second = rig.orchestrator.install_old(SERIAL, Some("old.apk"), None).await;
    assert_eq!(
        second,
        TestResult::failed(format!("Device {} is busy with another test", SERIAL))
    );

    release.notify_one();
    assert!(first.await.unwrap().is_success());
}

// ================================ INSTALL NEW ================================ //

#[tokio::test]
async fn test_install_new_success() {
    let runner = FakeRunner::new();
    runner.android_device(SERIAL, PACKAGE);
    let rig = rig(runner);
    rig.store("new.apk", &apk(PACKAGE, "2.0", 20));

    let result = rig
        .orchestrator
        .install_new(SERIAL, PACKAGE, Some("new.apk"), None)
        .await;

    assert_eq!(
        result,
        TestResult::Success {
            message: "Update Success! App is running. Version: 2.0 (20)".to_string(),
            package_name: PACKAGE.to_string(),
            version_name: "2.0".to_string(),
            version_code: "20".to_string(),
        }
    );
    assert_eq!(rig.uninstalls(), 0);
    let installs: Vec<String> = rig
        .runner
        .calls()
        .into_iter()
        .filter(|call| call.starts_with(&format!("adb -s {} install", SERIAL)))
        .collect();
    assert_eq!(installs.len(), 1);
    assert!(installs[0].starts_with(&format!("adb -s {} install -r ", SERIAL)));
    assert!(!installs[0].contains(" -t "));
}

#[tokio::test]
async fn test_install_new_package_mismatch() {
    let runner = FakeRunner::new();
    runner.android_device(SERIAL, PACKAGE);
    let rig = rig(runner);
    rig.store("new.apk", &apk("com.example.other", "2.0", 20));

    let result = rig
        .orchestrator
        .install_new(SERIAL, PACKAGE, Some("new.apk"), None)
        .await;

    assert_eq!(
        result,
        TestResult::failed(
            "Package name mismatch! Expected: com.example.shop, New: com.example.other"
        )
    );
    assert_eq!(rig.installs(), 0);
}

#[tokio::test]
async fn test_install_new_requires_foreground() {
    let runner = FakeRunner::new();
    runner.android_device(SERIAL, "com.android.launcher3");
    let rig = rig(runner);
    rig.store("new.apk", &apk(PACKAGE, "2.0", 20));

    let result = rig
        .orchestrator
        .install_new(SERIAL, PACKAGE, Some("new.apk"), None)
        .await;

    assert_eq!(
        result,
        TestResult::failed("App is not in foreground after update. Current: com.android.launcher3")
    );
    assert_eq!(rig.installs(), 1);
}

#[tokio::test]
async fn test_install_new_requires_package() {
    let runner = FakeRunner::new();
    runner.android_device(SERIAL, PACKAGE);
    let rig = rig(runner);

    let result = rig
        .orchestrator
        .install_new(SERIAL, " ", Some("new.apk"), None)
        .await;
    assert_eq!(result.status(), "failed");
    assert!(rig.runner.calls().is_empty());
}

// ============================== REMOTE ARTIFACTS ============================== //

#[tokio::test]
async fn test_remote_artifact_is_removed_after_every_outcome() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/builds/shop-2.0.apk")
        .with_status(200)
        .with_body(apk(PACKAGE, "2.0", 20))
        .create_async()
        .await;
    server
        .mock("GET", "/builds/other.apk")
        .with_status(200)
        .with_body(apk("com.example.other", "2.0", 20))
        .create_async()
        .await;
    let good = format!("{}/builds/shop-2.0.apk", server.url());
    let other = format!("{}/builds/other.apk", server.url());

    // success
    let runner = FakeRunner::new();
    runner.android_device(SERIAL, PACKAGE);
    let clean = rig(runner);
    let result = clean
        .orchestrator
        .install_new(SERIAL, PACKAGE, None, Some(&good))
        .await;
    assert!(result.is_success(), "{:?}", result);
    assert_eq!(clean.installs(), 1);
    assert_eq!(entries_in(&clean.temp), 0);

    // failed
    let result = clean
        .orchestrator
        .install_new(SERIAL, PACKAGE, None, Some(&other))
        .await;
    assert_eq!(result.status(), "failed");
    assert_eq!(entries_in(&clean.temp), 0);

    // error
    let runner = FakeRunner::new();
    runner.android_device(SERIAL, PACKAGE).on(
        &format!("adb -s {} install", SERIAL),
        CommandOutput::failed("Failure [INSTALL_FAILED_VERSION_DOWNGRADE]"),
    );
    let failing = rig(runner);
    let result = failing
        .orchestrator
        .install_new(SERIAL, PACKAGE, None, Some(&good))
        .await;
    match result {
        TestResult::Error { message } => {
            assert!(message.contains("INSTALL_FAILED_VERSION_DOWNGRADE"))
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(entries_in(&failing.temp), 0);
}

#[tokio::test]
async fn test_remote_download_failure_is_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/builds/gone.apk")
        .with_status(404)
        .create_async()
        .await;

    let runner = FakeRunner::new();
    runner.android_device(SERIAL, PACKAGE);
    let rig = rig(runner);
    let url = format!("{}/builds/gone.apk", server.url());

    let result = rig.orchestrator.install_old(SERIAL, None, Some(&url)).await;
    assert_eq!(result.status(), "error");
    assert_eq!(rig.installs(), 0);
    assert_eq!(entries_in(&rig.temp), 0);
}
