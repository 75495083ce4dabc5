//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::artifact::ArtifactRecord;
use crate::device::model::Device;
use crate::downloads::ResolutionTask;
use crate::errors::AgentError;
use crate::orchestrator::TestResult;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Error body shared by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

/// Maps an [`AgentError`] to a status code and `{status, message}` body
pub struct ApiError(pub AgentError);

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AgentError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AgentError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            status: "error".to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "appcompat".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// Devices response
#[derive(Debug, Serialize)]
pub struct DevicesResponse {
    pub devices: Vec<Device>,
    pub total: usize,
}

/// Connected devices handler
pub async fn devices_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let devices = state.gateway.list_devices().await;
    Json(DevicesResponse {
        total: devices.len(),
        devices,
    })
}

/// Artifacts response
#[derive(Debug, Serialize)]
pub struct ArtifactsResponse {
    pub artifacts: Vec<ArtifactRecord>,
    pub total: usize,
}

/// Stored artifacts handler
pub async fn list_artifacts_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<ArtifactsResponse>, ApiError> {
    let artifacts = state.registry.list().await?;
    Ok(Json(ArtifactsResponse {
        total: artifacts.len(),
        artifacts,
    }))
}

/// Multipart artifact upload: `file`, optional `custom_name` and `remark`
pub async fn upload_artifact_handler(
    State(state): State<Arc<ServerState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ArtifactRecord>), ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut custom_name: Option<String> = None;
    let mut remark: Option<String> = None;

    let bad_form = |e: axum::extract::multipart::MultipartError| {
        AgentError::ValidationError(format!("Invalid upload: {}", e))
    };
    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                let name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(bad_form)?;
                upload = Some((name, bytes.to_vec()));
            }
            "custom_name" => custom_name = Some(field.text().await.map_err(bad_form)?),
            "remark" => remark = Some(field.text().await.map_err(bad_form)?),
            _ => {}
        }
    }

    let Some((name, contents)) = upload else {
        return Err(AgentError::ValidationError("Missing file".to_string()).into());
    };
    if name.is_empty() {
        return Err(AgentError::ValidationError("Missing file name".to_string()).into());
    }

    info!("Receiving upload {} ({} bytes)", name, contents.len());
    let record = state
        .registry
        .save_upload(
            &name,
            &contents,
            non_empty(custom_name.as_deref()),
            non_empty(remark.as_deref()),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Delete response
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub status: String,
    pub filename: String,
}

/// Stored artifact removal handler
pub async fn delete_artifact_handler(
    State(state): State<Arc<ServerState>>,
    Path(filename): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    if !state.registry.delete(&filename).await? {
        return Err(AgentError::NotFound(format!("Artifact {} not found", filename)).into());
    }
    info!("Deleted artifact {}", filename);
    Ok(Json(DeleteResponse {
        status: "deleted".to_string(),
        filename,
    }))
}

/// Install-old request
#[derive(Debug, Deserialize)]
pub struct InstallOldRequest {
    pub device_serial: Option<String>,
    pub old_apk_name: Option<String>,
    pub apk_url: Option<String>,
}

/// Install-new request
#[derive(Debug, Deserialize)]
pub struct InstallNewRequest {
    pub device_serial: Option<String>,
    pub package_name: Option<String>,
    pub new_apk_name: Option<String>,
    pub apk_url: Option<String>,
}

fn rejected(message: &str) -> (StatusCode, Json<TestResult>) {
    warn!("Rejected test request: {}", message);
    (StatusCode::BAD_REQUEST, Json(TestResult::error(message)))
}

/// Phase one handler: fresh install of the baseline build
pub async fn install_old_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<InstallOldRequest>,
) -> (StatusCode, Json<TestResult>) {
    let Some(serial) = non_empty(request.device_serial.as_deref()) else {
        return rejected("Missing device_serial");
    };
    let local = non_empty(request.old_apk_name.as_deref());
    let remote = non_empty(request.apk_url.as_deref());
    if local.is_none() && remote.is_none() {
        return rejected("Missing old_apk_name or apk_url");
    }

    let result = state.orchestrator.install_old(serial, local, remote).await;
    (StatusCode::OK, Json(result))
}

/// Phase two handler: in-place upgrade to the candidate build
pub async fn install_new_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<InstallNewRequest>,
) -> (StatusCode, Json<TestResult>) {
    let Some(serial) = non_empty(request.device_serial.as_deref()) else {
        return rejected("Missing device_serial");
    };
    let Some(package) = non_empty(request.package_name.as_deref()) else {
        return rejected("Missing package_name");
    };
    let local = non_empty(request.new_apk_name.as_deref());
    let remote = non_empty(request.apk_url.as_deref());
    if local.is_none() && remote.is_none() {
        return rejected("Missing new_apk_name or apk_url");
    }

    let result = state
        .orchestrator
        .install_new(serial, package, local, remote)
        .await;
    (StatusCode::OK, Json(result))
}

/// Background download request
#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub url: Option<String>,
    pub remark: Option<String>,
}

/// Background download response
#[derive(Debug, Serialize)]
pub struct DownloadStartedResponse {
    pub status: String,
    pub task_id: String,
}

/// Start a background resolve-and-download
pub async fn start_download_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<DownloadRequest>,
) -> Result<(StatusCode, Json<DownloadStartedResponse>), ApiError> {
    let Some(url) = non_empty(request.url.as_deref()) else {
        return Err(AgentError::ValidationError("Missing url".to_string()).into());
    };
    let remark = non_empty(request.remark.as_deref()).map(str::to_string);

    let task_id = state.downloads.start_background_download(url, remark);
    Ok((
        StatusCode::ACCEPTED,
        Json(DownloadStartedResponse {
            status: "started".to_string(),
            task_id,
        }),
    ))
}

/// Progress of a background download; unknown ids report status `unknown`
pub async fn download_progress_handler(
    State(state): State<Arc<ServerState>>,
    Path(task_id): Path<String>,
) -> Json<ResolutionTask> {
    Json(state.tracker.get(&task_id))
}
