//! Error types for the compatibility agent

use thiserror::Error;

/// Main error type for the agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Share link could not be turned into a direct binary URL
    #[error("Resolution error: {0}")]
    ResolutionError(String),

    /// Non-success status or transport failure while streaming an artifact
    #[error("Download error: {0}")]
    DownloadError(String),

    /// Device missing, or an install/uninstall/launch command failed
    #[error("Device error: {0}")]
    DeviceError(String),

    /// Package metadata could not be extracted
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Internal(err.to_string())
    }
}

impl From<zip::result::ZipError> for AgentError {
    fn from(err: zip::result::ZipError) -> Self {
        AgentError::ParseError(format!("Invalid archive: {}", err))
    }
}

impl From<plist::Error> for AgentError {
    fn from(err: plist::Error) -> Self {
        AgentError::ParseError(format!("Invalid property list: {}", err))
    }
}

impl From<tokio::task::JoinError> for AgentError {
    fn from(err: tokio::task::JoinError) -> Self {
        AgentError::Internal(format!("Background task failed: {}", err))
    }
}
