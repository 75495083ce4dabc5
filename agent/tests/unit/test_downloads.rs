//! Background downloads and their progress tracking

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use appcompat::artifact::ArtifactRegistry;
use appcompat::downloads::{DownloadService, DownloadTracker, ResolutionTask, TaskStatus};
use appcompat::share::ShareLinkResolver;
use appcompat::utils::{FixedClock, SystemClock};

use crate::support::{apk, binary_manifest, zip_with};

async fn wait_for_terminal(tracker: &DownloadTracker, task_id: &str) -> ResolutionTask {
    for _ in 0..500 {
        let task = tracker.get(task_id);
        if task.status.is_terminal() {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {} never finished", task_id);
}

fn service(share_base: &str, storage: &std::path::Path) -> (DownloadService, Arc<ArtifactRegistry>) {
    let tracker = Arc::new(DownloadTracker::new(Arc::new(SystemClock)));
    let share = Arc::new(
        ShareLinkResolver::new(
            share_base,
            Duration::from_secs(5),
            Arc::new(FixedClock(1_700_000_123_456)),
        )
        .unwrap(),
    );
    let registry = Arc::new(ArtifactRegistry::new(storage));
    let service = DownloadService::new(tracker, share, Client::new(), storage)
        .with_registry(registry.clone());
    (service, registry)
}

#[test]
fn test_concurrent_tasks_are_independent() {
    let tracker = Arc::new(DownloadTracker::default());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let tracker = tracker.clone();
            std::thread::spawn(move || {
                let id = format!("task-{}", i);
                tracker.start(&id);
                for pct in 0..=50u8 {
                    tracker.update(&id, TaskStatus::Downloading, Some(pct), "Downloading...");
                }
                if i % 2 == 0 {
                    tracker.complete(&id, &format!("build-{}.apk", i));
                } else {
                    tracker.fail(&id, &format!("boom {}", i));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(tracker.len(), 8);
    for i in 0..8 {
        let task = tracker.get(&format!("task-{}", i));
        if i % 2 == 0 {
            assert_eq!(task.status, TaskStatus::Success);
            assert_eq!(task.filename, Some(format!("build-{}.apk", i)));
        } else {
            assert_eq!(task.status, TaskStatus::Error);
            assert_eq!(task.message, format!("boom {}", i));
            assert_eq!(task.percent, Some(50));
        }
    }
}

#[tokio::test]
async fn test_direct_download_is_stored_and_registered() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/builds/shop-2.0.apk")
        .with_status(200)
        .with_body(apk("com.example.shop", "2.0", 20))
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (service, registry) = service("https://share.example.com", dir.path());

    let url = format!("{}/builds/shop-2.0.apk", server.url());
    let task_id = service.start_background_download(&url, Some("nightly".to_string()));
    let task = wait_for_terminal(service.tracker(), &task_id).await;

    assert_eq!(task.status, TaskStatus::Success, "{:?}", task);
    assert_eq!(task.percent, Some(100));
    assert_eq!(task.filename.as_deref(), Some("shop-2.0.apk"));
    assert!(dir.path().join("shop-2.0.apk").exists());

    let records = registry.list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].package_name, "com.example.shop");
    assert_eq!(records[0].version_code, "20");
    assert_eq!(records[0].custom_name, "nightly");
}

#[tokio::test]
async fn test_share_link_download() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/AbCd")
        .with_status(200)
        .with_body("<script>var aKey = 'k3y';</script>")
        .create_async()
        .await;
    let direct = format!("{}/cdn/shop-3.0.apk", server.url());
    server
        .mock("GET", "/app/install/k3y")
        .match_query(mockito::Matcher::Any)
        .with_status(302)
        .with_header("location", direct.as_str())
        .create_async()
        .await;
    server
        .mock("GET", "/cdn/shop-3.0.apk")
        .with_status(200)
        .with_body(apk("com.example.shop", "3.0", 30))
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (service, _registry) = service(&server.url(), dir.path());

    let task_id = service.start_background_download(&format!("{}/AbCd", server.url()), None);
    let task = wait_for_terminal(service.tracker(), &task_id).await;

    assert_eq!(task.status, TaskStatus::Success, "{:?}", task);
    assert_eq!(task.filename.as_deref(), Some("shop-3.0.apk"));
}

fn padded_apk(version_code: u32, fill: u8) -> Vec<u8> {
    let manifest = binary_manifest("com.example.shop", "2.0", version_code);
    let padding = vec![fill; 4 << 20];
    zip_with(&[("AndroidManifest.xml", &manifest), ("assets/blob", &padding)])
}

#[tokio::test]
async fn test_concurrent_downloads_of_same_file_name_stay_intact() {
    let first = padded_apk(20, b'A');
    let second = padded_apk(21, b'B');

    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/v1/app.apk")
        .with_status(200)
        .with_body(first.clone())
        .create_async()
        .await;
    server
        .mock("GET", "/v2/app.apk")
        .with_status(200)
        .with_body(second.clone())
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (service, registry) = service("https://share.example.com", dir.path());

    let one = service.start_background_download(&format!("{}/v1/app.apk", server.url()), None);
    let two = service.start_background_download(&format!("{}/v2/app.apk", server.url()), None);
    let one = wait_for_terminal(service.tracker(), &one).await;
    let two = wait_for_terminal(service.tracker(), &two).await;

    assert_eq!(one.status, TaskStatus::Success, "{:?}", one);
    assert_eq!(two.status, TaskStatus::Success, "{:?}", two);

    let stored = std::fs::read(dir.path().join("app.apk")).unwrap();
    assert!(stored == first || stored == second, "stored artifact is a mix of both downloads");

    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().all(|name| !name.ends_with(".download")), "{:?}", names);

    let records = registry.list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].filename, "app.apk");
}

#[tokio::test]
async fn test_file_name_with_double_dot_is_stored() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/builds/shop..v2.apk")
        .with_status(200)
        .with_body(apk("com.example.shop", "2.0", 20))
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (service, _registry) = service("https://share.example.com", dir.path());

    let url = format!("{}/builds/shop..v2.apk", server.url());
    let task_id = service.start_background_download(&url, None);
    let task = wait_for_terminal(service.tracker(), &task_id).await;

    assert_eq!(task.status, TaskStatus::Success, "{:?}", task);
    assert!(dir.path().join("shop..v2.apk").exists());
}

#[tokio::test]
async fn test_failed_download_leaves_no_partial_file() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/builds/missing.apk")
        .with_status(404)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (service, registry) = service("https://share.example.com", dir.path());

    let url = format!("{}/builds/missing.apk", server.url());
    let task_id = service.start_background_download(&url, None);
    let task = wait_for_terminal(service.tracker(), &task_id).await;

    assert_eq!(task.status, TaskStatus::Error);
    assert!(task.filename.is_none());
    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "{:?}", leftovers);
    assert!(registry.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_task_id() {
    let tracker = DownloadTracker::default();
    let task = tracker.get("nope");
    assert_eq!(task.status, TaskStatus::Unknown);
    assert_eq!(task.message, "Task not found");
}
