//! Outcome of a test phase

use serde::{Deserialize, Serialize};

/// `failed` is a business-rule rejection, `error` an unexpected fault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TestResult {
    Success {
        message: String,
        package_name: String,
        version_name: String,
        version_code: String,
    },
    Failed {
        reason: String,
    },
    Error {
        message: String,
    },
}

impl TestResult {
    pub fn failed(reason: impl Into<String>) -> Self {
        TestResult::Failed {
            reason: reason.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        TestResult::Error {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TestResult::Success { .. })
    }

    pub fn status(&self) -> &'static str {
        match self {
            TestResult::Success { .. } => "success",
            TestResult::Failed { .. } => "failed",
            TestResult::Error { .. } => "error",
        }
    }
}
