//! Background resolve-and-download tasks

pub mod service;
pub mod tracker;

pub use service::DownloadService;
pub use tracker::{DownloadTracker, ResolutionTask, TaskStatus};
