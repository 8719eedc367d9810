//! `warden run`: execute a manifest and write artifacts

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::warn;

use super::RunOutcome;
use crate::cancel::CancelFlag;
use crate::checks::CheckRegistry;
use crate::liveness::RunSettings;
use crate::manifest::Manifest;
use crate::process::POLL_TICK;
use crate::report::{
    summarize, write_json_artifact, ProfileArtifact, ProfileSink, RunSummary, TimingArtifact,
};
use crate::runner::{PoolReport, Supervisor};
use crate::trace::{TraceRecorder, Tracer};

/// Profile artifact location when `--profile` is given without a path
pub const DEFAULT_PROFILE_OUT: &str = ".artifacts/warden-profile.json";

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub manifest: PathBuf,
    pub workers: usize,
    pub filter: Option<String>,
    pub timing_out: Option<PathBuf>,
    pub profile: bool,
    pub profile_out: Option<PathBuf>,
    pub trace_out: Option<PathBuf>,
}

/// Execute the run command with the built-in checks
pub fn execute(options: RunOptions, settings: RunSettings) -> Result<RunOutcome> {
    execute_with(options, settings, CheckRegistry::with_builtins())
}

/// Execute the run command against a caller-supplied registry
pub fn execute_with(
    options: RunOptions,
    settings: RunSettings,
    registry: CheckRegistry,
) -> Result<RunOutcome> {
    let manifest = Manifest::load(&options.manifest)?;
    let base_dir = manifest.base_dir();
    let cases = manifest.select(options.filter.as_deref())?;

    let cancel = CancelFlag::new();
    install_interrupt_handler(&cancel);
    let kill_grace = settings.liveness.kill_grace();

    let profile = Arc::new(ProfileSink::new());
    let recorder = options.trace_out.as_ref().map(|_| Arc::new(TraceRecorder::new()));

    let mut supervisor = Supervisor::new(Arc::new(registry), settings)
        .with_profile(Arc::clone(&profile))
        .with_cancel(cancel.clone())
        .with_base_dir(base_dir);
    if let Some(recorder) = &recorder {
        supervisor = supervisor.with_tracer(Arc::clone(recorder) as Arc<dyn Tracer>);
    }

    let report = supervisor.run(cases, options.workers)?;
    if report.stall.is_some() {
        stop_abandoned_workers(&supervisor, &cancel, kill_grace);
    }
    let summary = summarize(&report);
    let status = summary.status.as_str();

    if let Some(path) = &options.timing_out {
        write_json_artifact(path, &TimingArtifact::build(&summary, &report))?;
    }
    if options.profile {
        let path = options
            .profile_out
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROFILE_OUT));
        let artifact = ProfileArtifact::build(
            status,
            summary.task_count,
            summary.total_duration,
            profile.records(),
        );
        write_json_artifact(&path, &artifact)?;
    }
    if let (Some(path), Some(recorder)) = (&options.trace_out, &recorder) {
        write_json_artifact(path, &recorder.finish(status))?;
    }

    print_report(&report, &summary);
    Ok(if summary.passed() {
        RunOutcome::Passed
    } else {
        RunOutcome::Failed
    })
}

fn install_interrupt_handler(cancel: &CancelFlag) {
    let flag = cancel.clone();
    let installed = ctrlc::set_handler(move || flag.cancel())
        .context("failed to install interrupt handler");
    if let Err(e) = installed {
        warn!("{e:#}");
    }
}

/// Cancel the cases still running after a pool stall and wait for them
///
/// Their executors see the flag within one poll tick and take their process
/// groups down with the usual TERM, grace, KILL ladder.
fn stop_abandoned_workers(supervisor: &Supervisor, cancel: &CancelFlag, kill_grace: Duration) {
    cancel.cancel();
    let within = kill_grace + POLL_TICK * 2;
    let left = supervisor.reap_abandoned(within);
    if left > 0 {
        warn!(
            workers = left,
            waited_ms = within.as_millis() as u64,
            "workers still running after cancellation, leaving them behind"
        );
    }
}

fn print_report(report: &PoolReport, summary: &RunSummary) {
    for record in report.records.iter().filter(|r| r.failed()) {
        let message = record
            .failure_message
            .clone()
            .unwrap_or_else(|| format!("{}: failed", record.task_id));
        eprintln!("{} {message}", "ERROR:".red().bold());
    }
    for id in &report.cancelled {
        eprintln!("{} {id}: cancelled before start", "ERROR:".red().bold());
    }

    let secs = summary.total_duration.as_secs_f64();
    if summary.passed() {
        println!(
            "{} {} case(s) passed in {secs:.2}s ({} worker(s))",
            "✓".green().bold(),
            summary.task_count,
            summary.workers_used
        );
    } else if let Some(stall) = &report.stall {
        println!(
            "{} run stalled ({}) after {secs:.2}s: {} failed, {} cancelled",
            "✗".red().bold(),
            stall.failure.reason,
            summary.failed_count,
            report.cancelled.len()
        );
    } else if report.interrupted {
        println!(
            "{} run interrupted after {secs:.2}s: {} failed, {} cancelled",
            "✗".red().bold(),
            summary.failed_count,
            report.cancelled.len()
        );
    } else {
        println!(
            "{} {} of {} case(s) failed in {secs:.2}s",
            "✗".red().bold(),
            summary.failed_count,
            summary.task_count
        );
    }
}
