mod cli;

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use warden::error::ConfigError;

use cli::{dispatch, Cli};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match dispatch(cli) {
        Ok(outcome) => outcome.exit_code(),
        Err(err) => {
            eprintln!("{} {err:#}", "ERROR:".red().bold());
            // Invalid input gets its own status so callers can tell it from a failed run
            if err.downcast_ref::<ConfigError>().is_some() {
                ExitCode::from(2)
            } else {
                ExitCode::from(1)
            }
        }
    }
}
