//! Built-in checks

use std::time::Instant;

use regex::Regex;

use super::{Check, CheckContext, CheckError};
use crate::process::ProcessOutcome;
use crate::runner::TaskDescriptor;
use crate::utils::{render_command, truncate};

/// Characters of stderr quoted in an exit-code failure
const STDERR_EXCERPT: usize = 200;

fn require_argv(case: &TaskDescriptor) -> Result<(), String> {
    if case.argv.is_empty() {
        Err("argv must not be empty".to_string())
    } else {
        Ok(())
    }
}

/// Run the case's argv under supervision and record the `subprocess.exec` phase
fn run_case(case: &TaskDescriptor, ctx: &CheckContext<'_>) -> Result<ProcessOutcome, CheckError> {
    let cwd = ctx.working_dir(case);
    let started = Instant::now();
    let result = ctx.executor(case).run(&case.argv, cwd.as_deref());
    ctx.record_phase(case, "subprocess.exec", started.elapsed());
    Ok(result?)
}

fn expect_exit(case: &TaskDescriptor, outcome: &ProcessOutcome) -> Result<(), CheckError> {
    let expected = case.expect_exit.unwrap_or(0);
    if outcome.exit_code == Some(expected) {
        return Ok(());
    }

    let got = match (outcome.exit_code, outcome.signal) {
        (Some(code), _) => format!("exit code {code}"),
        (None, Some(sig)) => format!("signal {sig}"),
        (None, None) => "unknown exit status".to_string(),
    };
    let stderr = outcome.stderr_text();
    let stderr = stderr.trim();
    let mut message = format!(
        "{} finished with {got}, expected exit code {expected}",
        render_command(&case.argv)
    );
    if !stderr.is_empty() {
        message.push_str(&format!(": {}", truncate(stderr, STDERR_EXCERPT)));
    }
    Err(CheckError::Assertion(message))
}

/// Passes when the command exits with `expect_exit` (default 0)
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandCheck;

impl Check for CommandCheck {
    fn execute(&self, case: &TaskDescriptor, ctx: &CheckContext<'_>) -> Result<(), CheckError> {
        let outcome = run_case(case, ctx)?;
        expect_exit(case, &outcome)
    }

    fn validate(&self, case: &TaskDescriptor) -> Result<(), String> {
        require_argv(case)
    }
}

/// Passes when the command exits as expected and stdout matches `pattern`
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputMatchesCheck;

impl OutputMatchesCheck {
    fn compile(case: &TaskDescriptor) -> Result<Regex, String> {
        let pattern = case
            .pattern
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| "pattern is required".to_string())?;
        Regex::new(pattern).map_err(|e| format!("invalid pattern: {e}"))
    }
}

impl Check for OutputMatchesCheck {
    fn execute(&self, case: &TaskDescriptor, ctx: &CheckContext<'_>) -> Result<(), CheckError> {
        let regex = Self::compile(case).map_err(CheckError::Invalid)?;
        let outcome = run_case(case, ctx)?;
        expect_exit(case, &outcome)?;

        let stdout = outcome.stdout_text();
        if regex.is_match(&stdout) {
            Ok(())
        } else {
            Err(CheckError::Assertion(format!(
                "stdout did not match /{}/: {:?}",
                regex.as_str(),
                truncate(stdout.trim_end(), STDERR_EXCERPT)
            )))
        }
    }

    fn validate(&self, case: &TaskDescriptor) -> Result<(), String> {
        require_argv(case)?;
        Self::compile(case).map(|_| ())
    }
}

/// Passes when `path` exists; runs no subprocess
#[derive(Debug, Clone, Copy, Default)]
pub struct FileExistsCheck;

impl Check for FileExistsCheck {
    fn execute(&self, case: &TaskDescriptor, ctx: &CheckContext<'_>) -> Result<(), CheckError> {
        let path = case
            .path
            .as_deref()
            .ok_or_else(|| CheckError::Invalid("path is required".to_string()))?;
        let resolved = ctx.resolve(case, path);
        if resolved.exists() {
            Ok(())
        } else {
            Err(CheckError::Assertion(format!(
                "{} does not exist",
                resolved.display()
            )))
        }
    }

    fn validate(&self, case: &TaskDescriptor) -> Result<(), String> {
        match &case.path {
            Some(p) if !p.as_os_str().is_empty() => Ok(()),
            _ => Err("path is required".to_string()),
        }
    }
}
