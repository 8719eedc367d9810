//! `tracing` subscriber setup for the binary

use std::io::IsTerminal;

use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),
    #[error("logger already initialized")]
    AlreadyInitialized,
    #[error("logger initialization failed: {0}")]
    InitializationFailed(String),
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            with_targets: false,
            use_color: std::io::stderr().is_terminal(),
        }
    }
}

/// Install a global text subscriber writing to stderr
///
/// `RUST_LOG` wins over `cfg.level` when it is set.
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => mk_filter(&cfg.level)?,
    };
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg.use_color)
        .with_target(cfg.with_targets);

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    init_with(subscriber)
}

fn mk_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(level).map_err(|_| LoggerError::InvalidLogLevel(level.to_string()))
}

fn as_error(e: impl std::fmt::Display) -> LoggerError {
    let s = e.to_string();
    if s.contains("SetGlobalDefaultError") || s.contains("global default") {
        LoggerError::AlreadyInitialized
    } else {
        LoggerError::InitializationFailed(s)
    }
}

fn init_with<S>(subscriber: S) -> Result<(), LoggerError>
where
    S: Subscriber + Send + Sync + 'static,
{
    subscriber.try_init().map_err(as_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_rejected() {
        let err = mk_filter("warden=loud").unwrap_err();
        assert!(matches!(err, LoggerError::InvalidLogLevel(_)));
    }

    #[test]
    fn test_directive_filters_parse() {
        assert!(mk_filter("debug").is_ok());
        assert!(mk_filter("warn,warden=debug").is_ok());
    }
}
