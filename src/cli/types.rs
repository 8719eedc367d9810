use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use warden::liveness::Overrides;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Run checks in parallel under liveness supervision", long_about = None)]
#[command(version)]
#[command(subcommand_help_heading = "Commands")]
pub struct Cli {
    /// Log filter used when RUST_LOG is unset (e.g. warn, info, warden=debug)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the cases listed in a manifest
    Run {
        /// Path to the YAML case manifest
        manifest: PathBuf,

        /// Worker threads (0 = one per core, 1 = sequential)
        #[arg(short = 'j', long, default_value_t = 0)]
        workers: usize,

        /// Only run cases whose id matches this glob
        #[arg(short, long)]
        filter: Option<String>,

        /// Write the timing artifact here
        #[arg(long, value_name = "PATH")]
        timing_out: Option<PathBuf>,

        /// Collect per-phase profile records
        #[arg(long)]
        profile: bool,

        /// Where to write the profile artifact (implies --profile)
        #[arg(long, value_name = "PATH")]
        profile_out: Option<PathBuf>,

        /// Write a run trace with spans and watchdog events here
        #[arg(long, value_name = "PATH")]
        trace_out: Option<PathBuf>,

        #[command(flatten)]
        liveness: LivenessArgs,
    },

    /// Show the resolved liveness and supervisor settings
    Config {
        #[command(flatten)]
        liveness: LivenessArgs,
    },
}

impl Commands {
    pub fn liveness(&self) -> &LivenessArgs {
        match self {
            Commands::Run { liveness, .. } | Commands::Config { liveness } => liveness,
        }
    }
}

/// Liveness flags; values are kept raw so a bad one falls through to the
/// environment instead of aborting the run
#[derive(Args, Debug, Clone, Default)]
pub struct LivenessArgs {
    /// Liveness level: off, basic or strict
    #[arg(long, value_name = "LEVEL")]
    pub liveness_level: Option<String>,

    /// Idle window before a subprocess or the pool counts as stalled
    #[arg(long, value_name = "MS")]
    pub liveness_stall_ms: Option<String>,

    /// Output events required inside each stall window (strict level)
    #[arg(long, value_name = "N")]
    pub liveness_min_events: Option<String>,

    /// Absolute lifetime ceiling for one subprocess
    #[arg(long, value_name = "MS")]
    pub liveness_hard_cap_ms: Option<String>,

    /// Per-check hard cap in seconds; wins over --liveness-hard-cap-ms
    #[arg(long, value_name = "SECS")]
    pub check_timeout_secs: Option<String>,

    /// Delay between SIGTERM and SIGKILL
    #[arg(long, value_name = "MS")]
    pub liveness_kill_grace_ms: Option<String>,

    /// Supervisor heartbeat interval
    #[arg(long, value_name = "MS")]
    pub heartbeat_ms: Option<String>,

    /// Minimum spacing between stall warnings
    #[arg(long, value_name = "MS")]
    pub stall_log_ms: Option<String>,

    /// Log an active-case snapshot on every heartbeat
    #[arg(short, long)]
    pub verbose: bool,
}

impl LivenessArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            level: self.liveness_level.clone(),
            stall_ms: self.liveness_stall_ms.clone(),
            min_events: self.liveness_min_events.clone(),
            hard_cap_ms: self.liveness_hard_cap_ms.clone(),
            check_timeout_secs: self.check_timeout_secs.clone(),
            kill_grace_ms: self.liveness_kill_grace_ms.clone(),
            heartbeat_ms: self.heartbeat_ms.clone(),
            stall_log_ms: self.stall_log_ms.clone(),
            verbose: self.verbose.then(|| "1".to_string()),
        }
    }
}
