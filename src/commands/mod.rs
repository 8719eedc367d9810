pub mod config;
pub mod run;

use std::process::ExitCode;

/// Overall result of a command, mapped to the process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Passed,
    Failed,
}

impl RunOutcome {
    pub fn exit_code(self) -> ExitCode {
        match self {
            RunOutcome::Passed => ExitCode::SUCCESS,
            RunOutcome::Failed => ExitCode::from(1),
        }
    }
}
