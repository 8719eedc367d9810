//! Typed liveness failures

use std::fmt;
use thiserror::Error;

/// Stable identifier for why a liveness or stall failure fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasonToken {
    /// Subprocess outlived the hard cap
    HardCapEmergency,
    /// Subprocess produced no output for longer than the stall window (strict only)
    SubprocessStall,
    /// Pool has no active tasks and no progress for the stall window
    RunnerNoProgress,
    /// Pool has a task running far longer than the stall window
    RunnerCaseNoCompletion,
}

impl ReasonToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonToken::HardCapEmergency => "timeout.hard_cap.emergency",
            ReasonToken::SubprocessStall => "stall.subprocess.no_output_no_event",
            ReasonToken::RunnerNoProgress => "stall.runner.no_progress",
            ReasonToken::RunnerCaseNoCompletion => "stall.runner.case_no_completion",
        }
    }
}

impl fmt::Display for ReasonToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A liveness check fired instead of the supervised work completing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}: {message}")]
pub struct LivenessFailure {
    pub reason: ReasonToken,
    pub message: String,
}

impl LivenessFailure {
    pub fn new(reason: ReasonToken, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}
