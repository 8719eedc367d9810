use anyhow::Result;
use warden::commands::{config, run, RunOutcome};
use warden::liveness::{LivenessLevel, Overrides, RunSettings};
use warden::logging::{logger_init, LoggerConfig};

use super::types::{Cli, Commands};

pub fn dispatch(cli: Cli) -> Result<RunOutcome> {
    let cli_layer = cli.command.liveness().overrides();
    let env_layer = Overrides::from_env();
    let settings = RunSettings::resolve(LivenessLevel::Basic, &[&cli_layer, &env_layer]);

    let level = if settings.supervisor.verbose {
        "debug".to_string()
    } else {
        cli.log_level.clone()
    };
    let logger = LoggerConfig {
        level,
        ..LoggerConfig::default()
    };
    if let Err(e) = logger_init(&logger) {
        eprintln!("warning: {e}");
    }

    match cli.command {
        Commands::Run {
            manifest,
            workers,
            filter,
            timing_out,
            profile,
            profile_out,
            trace_out,
            liveness: _,
        } => run::execute(
            run::RunOptions {
                manifest,
                workers,
                filter,
                timing_out,
                profile: profile || profile_out.is_some(),
                profile_out,
                trace_out,
            },
            settings,
        ),
        Commands::Config { liveness: _ } => {
            config::show(&settings);
            Ok(RunOutcome::Passed)
        }
    }
}
