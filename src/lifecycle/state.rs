//! Service-level lifecycle state and shutdown outcome.

use std::fmt;
use std::process::ExitCode;

/// State of the whole service. Only the lifecycle manager writes it.
///
/// ```text
/// Idle → Starting → Serving → Draining → Stopped
///            ↓          ↓
///          Failed     Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Starting,
    Serving,
    Draining,
    Stopped,
    Failed,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Stopped | LifecycleState::Failed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Starting => "starting",
            LifecycleState::Serving => "serving",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a running service ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every connection drained before the deadline.
    Clean,
    /// The drain deadline passed and remaining connections were closed.
    Forced,
    /// A listener or sub-server failed while serving.
    Failed(String),
}

impl ShutdownOutcome {
    /// Process exit status for the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            ShutdownOutcome::Clean => 0,
            ShutdownOutcome::Failed(_) => 1,
            ShutdownOutcome::Forced => 2,
        }
    }
}

impl From<&ShutdownOutcome> for ExitCode {
    fn from(outcome: &ShutdownOutcome) -> Self {
        ExitCode::from(outcome.exit_code())
    }
}
