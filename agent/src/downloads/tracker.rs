//! In-memory progress of background resolve-and-download tasks

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::{Clock, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Analyzing,
    Downloading,
    Success,
    Error,
    /// Returned for ids the tracker does not know
    Unknown,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Error)
    }
}

/// Snapshot of one task as reported to pollers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionTask {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<u8>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl ResolutionTask {
    fn unknown(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: TaskStatus::Unknown,
            percent: None,
            message: "Task not found".to_string(),
            filename: None,
        }
    }
}

#[derive(Debug, Clone)]
struct TrackedTask {
    task: ResolutionTask,
    finished_at: Option<u64>,
}

/// Task table keyed by task id
pub struct DownloadTracker {
    tasks: RwLock<HashMap<String, TrackedTask>>,
    clock: Arc<dyn Clock>,
}

impl Default for DownloadTracker {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl DownloadTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Register a new task in the analyzing state
    pub fn start(&self, task_id: &str) {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        tasks.insert(
            task_id.to_string(),
            TrackedTask {
                task: ResolutionTask {
                    task_id: task_id.to_string(),
                    status: TaskStatus::Analyzing,
                    percent: None,
                    message: "Analyzing link...".to_string(),
                    filename: None,
                },
                finished_at: None,
            },
        );
    }

    /// Move a running task forward. Percent never decreases while downloading.
    pub fn update(&self, task_id: &str, status: TaskStatus, percent: Option<u8>, message: &str) {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        let Some(tracked) = tasks.get_mut(task_id) else {
            return;
        };
        if tracked.task.status.is_terminal() {
            return;
        }

        let percent = percent.map(|p| p.min(100));
        tracked.task.percent = match (tracked.task.status, tracked.task.percent, percent) {
            (TaskStatus::Downloading, Some(old), Some(new)) if status == TaskStatus::Downloading => {
                Some(old.max(new))
            }
            (_, old, None) => old,
            (_, _, new) => new,
        };
        tracked.task.status = status;
        tracked.task.message = message.to_string();
    }

    pub fn complete(&self, task_id: &str, filename: &str) {
        self.finish(task_id, |task| {
            task.status = TaskStatus::Success;
            task.percent = Some(100);
            task.message = "Download successful".to_string();
            task.filename = Some(filename.to_string());
        });
    }

    pub fn fail(&self, task_id: &str, message: &str) {
        self.finish(task_id, |task| {
            task.status = TaskStatus::Error;
            task.message = message.to_string();
        });
    }

    fn finish(&self, task_id: &str, apply: impl FnOnce(&mut ResolutionTask)) {
        let now = self.clock.now_millis();
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        if let Some(tracked) = tasks.get_mut(task_id) {
            if tracked.task.status.is_terminal() {
                return;
            }
            apply(&mut tracked.task);
            tracked.finished_at = Some(now);
        }
    }

    /// Current state of a task, or the unknown sentinel
    pub fn get(&self, task_id: &str) -> ResolutionTask {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        tasks
            .get(task_id)
            .map(|t| t.task.clone())
            .unwrap_or_else(|| ResolutionTask::unknown(task_id))
    }

    /// Drop terminal tasks that finished more than `retention` ago.
    /// Returns how many were removed.
    pub fn reap(&self, retention: Duration) -> usize {
        let now = self.clock.now_millis();
        let retention_ms = retention.as_millis() as u64;
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        let before = tasks.len();
        tasks.retain(|_, tracked| match tracked.finished_at {
            Some(finished) => now.saturating_sub(finished) <= retention_ms,
            None => true,
        });
        before - tasks.len()
    }

    pub fn len(&self) -> usize {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
