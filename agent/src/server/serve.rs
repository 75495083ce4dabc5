//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::AgentError;
use crate::server::handlers::{
    delete_artifact_handler, devices_handler, download_progress_handler, health_handler,
    install_new_handler, install_old_handler, list_artifacts_handler, start_download_handler,
    upload_artifact_handler, version_handler,
};
use crate::server::state::ServerState;

/// Largest accepted artifact upload
const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

/// Build the API router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Devices
        .route("/devices", get(devices_handler))
        // Artifacts
        .route(
            "/artifacts",
            get(list_artifacts_handler).post(upload_artifact_handler),
        )
        .route("/artifacts/{filename}", delete(delete_artifact_handler))
        // Compatibility test phases
        .route("/install_old", post(install_old_handler))
        .route("/install_new", post(install_new_handler))
        // Background downloads
        .route("/downloads", post(start_download_handler))
        .route("/downloads/{task_id}", get(download_progress_handler))
        // State and middleware
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), AgentError>>, AgentError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AgentError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| AgentError::ServerError(e.to_string()))
    });

    Ok(handle)
}
