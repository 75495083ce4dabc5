//! State machine for one compatibility test phase

use serde::{Deserialize, Serialize};

/// Test phase state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestState {
    /// Request accepted, nothing checked yet
    Init,

    /// Device lookup and screen/lock checks
    PreconditionCheck,

    /// Artifact being located or downloaded
    Resolve,

    /// Package identity being read from the artifact
    ParseMetadata,

    /// Previous install being removed
    Uninstall,

    /// Artifact being installed
    Install,

    /// App being started
    Launch,

    /// Foreground package being checked
    VerifyForeground,

    /// Phase passed
    Success,

    /// Business rule rejected the phase
    Failed,

    /// Unexpected fault
    Error,
}

impl TestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TestState::Success | TestState::Failed | TestState::Error)
    }
}

/// Test phase event
#[derive(Debug, Clone)]
pub enum TestEvent {
    /// Start checking preconditions
    Begin,

    /// Device found and ready
    PreconditionsMet,

    /// Artifact available on disk
    Resolved,

    /// Metadata accepted; `uninstall` selects the uninstall step
    MetadataAccepted { uninstall: bool },

    /// Previous install removed (or removal ignored)
    Uninstalled,

    /// Install succeeded
    Installed,

    /// Launch issued
    Launched,

    /// Foreground check passed or was advisory
    Verified,

    /// Business rule rejection
    Reject(String),

    /// Unexpected fault
    Fault(String),
}

/// Phase FSM with transition history
#[derive(Debug, Clone)]
pub struct TestFsm {
    state: TestState,
    reason: Option<String>,
    history: Vec<TestState>,
}

impl TestFsm {
    /// Create a new FSM in the init state
    pub fn new() -> Self {
        Self {
            state: TestState::Init,
            reason: None,
            history: vec![TestState::Init],
        }
    }

    pub fn state(&self) -> TestState {
        self.state
    }

    /// Rejection reason or fault message once terminal
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Every state visited, in order
    pub fn history(&self) -> &[TestState] {
        &self.history
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: TestEvent) -> Result<TestState, String> {
        let new_state = match (self.state, &event) {
            (TestState::Init, TestEvent::Begin) => TestState::PreconditionCheck,
            (TestState::PreconditionCheck, TestEvent::PreconditionsMet) => TestState::Resolve,
            (TestState::Resolve, TestEvent::Resolved) => TestState::ParseMetadata,
            (TestState::ParseMetadata, TestEvent::MetadataAccepted { uninstall: true }) => {
                TestState::Uninstall
            }
            (TestState::ParseMetadata, TestEvent::MetadataAccepted { uninstall: false }) => {
                TestState::Install
            }
            (TestState::Uninstall, TestEvent::Uninstalled) => TestState::Install,
            (TestState::Install, TestEvent::Installed) => TestState::Launch,
            (TestState::Launch, TestEvent::Launched) => TestState::VerifyForeground,
            (TestState::VerifyForeground, TestEvent::Verified) => TestState::Success,

            (state, TestEvent::Reject(reason)) if !state.is_terminal() => {
                self.reason = Some(reason.clone());
                TestState::Failed
            }
            (state, TestEvent::Fault(message)) if !state.is_terminal() => {
                self.reason = Some(message.clone());
                TestState::Error
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        self.history.push(new_state);
        Ok(new_state)
    }
}

impl Default for TestFsm {
    fn default() -> Self {
        Self::new()
    }
}
