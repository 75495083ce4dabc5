//! Local HTTP API

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use appcompat::app::options::{AppOptions, StorageOptions};
use appcompat::app::state::AppState;
use appcompat::orchestrator::Timings;
use appcompat::server::serve::router;
use appcompat::server::state::ServerState;
use appcompat::storage::layout::StorageLayout;

use crate::support::{apk, FakeRunner};

const SERIAL: &str = "emulator-5554";
const BOUNDARY: &str = "----appcompat-test-boundary";

struct Api {
    dir: TempDir,
    router: Router,
}

async fn api(runner: Arc<FakeRunner>) -> Api {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(dir.path());
    let options = AppOptions {
        storage: StorageOptions {
            artifacts_dir: layout.artifacts_dir().path().to_path_buf(),
            temp_dir: layout.temp_dir().path().to_path_buf(),
            layout,
        },
        timings: Timings::none(),
        ..Default::default()
    };

    let state = AppState::init(&options, runner).await.unwrap();
    Api {
        dir,
        router: router(Arc::new(ServerState::from_app(&state))),
    }
}

impl Api {
    fn artifacts(&self) -> std::path::PathBuf {
        self.dir.path().join("artifacts")
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

fn multipart_body(file_name: &str, contents: &[u8], custom_name: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"custom_name\"\r\n\r\n{c}\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
             Content-Type: application/vnd.android.package-archive\r\n\r\n",
            b = BOUNDARY,
            c = custom_name,
            f = file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

#[tokio::test]
async fn test_health() {
    let api = api(FakeRunner::new()).await;
    let (status, body) = api.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "appcompat");
}

#[tokio::test]
async fn test_list_devices() {
    let runner = FakeRunner::new();
    runner.android_device(SERIAL, "com.example.shop");
    let api = api(runner).await;

    let (status, body) = api.get("/devices").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["devices"][0]["serial"], SERIAL);
    assert_eq!(body["devices"][0]["platform"], "android");
    assert_eq!(body["devices"][0]["model"], "Pixel_7");
    assert_eq!(body["devices"][0]["screen_on"], true);
    assert_eq!(body["devices"][0]["unlocked"], true);
}

#[tokio::test]
async fn test_install_requests_are_validated() {
    let runner = FakeRunner::new();
    let api = api(runner.clone()).await;

    let (status, body) = api
        .post_json("/install_old", json!({"old_apk_name": "old.apk"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"status": "error", "message": "Missing device_serial"}));

    let (status, body) = api
        .post_json("/install_old", json!({"device_serial": SERIAL}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Missing old_apk_name or apk_url");

    let (status, body) = api
        .post_json(
            "/install_new",
            json!({"device_serial": SERIAL, "new_apk_name": "new.apk"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Missing package_name");

    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_install_old_and_new() {
    let runner = FakeRunner::new();
    runner.android_device(SERIAL, "com.example.shop");
    let api = api(runner).await;
    std::fs::write(api.artifacts().join("old.apk"), apk("com.example.shop", "1.0", 10)).unwrap();
    std::fs::write(api.artifacts().join("new.apk"), apk("com.example.shop", "2.0", 20)).unwrap();

    let (status, body) = api
        .post_json(
            "/install_old",
            json!({"device_serial": SERIAL, "old_apk_name": "old.apk"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["package_name"], "com.example.shop");

    let (status, body) = api
        .post_json(
            "/install_new",
            json!({"device_serial": SERIAL, "package_name": "com.example.shop", "new_apk_name": "new.apk"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["message"],
        "Update Success! App is running. Version: 2.0 (20)"
    );
}

#[tokio::test]
async fn test_install_new_mismatch_is_reported_as_failed() {
    let runner = FakeRunner::new();
    runner.android_device(SERIAL, "com.example.shop");
    let api = api(runner).await;
    std::fs::write(api.artifacts().join("new.apk"), apk("com.example.other", "2.0", 20)).unwrap();

    let (status, body) = api
        .post_json(
            "/install_new",
            json!({"device_serial": SERIAL, "package_name": "com.example.shop", "new_apk_name": "new.apk"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "status": "failed",
            "reason": "Package name mismatch! Expected: com.example.shop, New: com.example.other"
        })
    );
}

#[tokio::test]
async fn test_upload_list_and_delete_artifact() {
    let api = api(FakeRunner::new()).await;

    let upload = Request::post("/artifacts")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(
            "app-release.apk",
            &apk("com.example.shop", "1.0", 10),
            "shop-baseline",
        )))
        .unwrap();
    let (status, body) = api.send(upload).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["filename"], "shop-baseline.apk");
    assert_eq!(body["package_name"], "com.example.shop");

    let (status, body) = api.get("/artifacts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["artifacts"][0]["version_code"], "10");

    let delete = || {
        Request::delete("/artifacts/shop-baseline.apk")
            .body(Body::empty())
            .unwrap()
    };
    let (status, _) = api.send(delete()).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = api.send(delete()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_downloads_endpoints() {
    let api = api(FakeRunner::new()).await;

    let (status, body) = api.post_json("/downloads", json!({"remark": "x"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Validation error: Missing url");

    let (status, body) = api.get("/downloads/does-not-exist").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "unknown");
    assert_eq!(body["message"], "Task not found");
}
