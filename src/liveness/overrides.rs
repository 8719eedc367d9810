//! Raw, unvalidated override values and their lenient parsers

use super::config::LivenessLevel;

pub const ENV_LEVEL: &str = "WARDEN_LIVENESS_LEVEL";
pub const ENV_STALL_MS: &str = "WARDEN_LIVENESS_STALL_MS";
pub const ENV_MIN_EVENTS: &str = "WARDEN_LIVENESS_MIN_EVENTS";
pub const ENV_HARD_CAP_MS: &str = "WARDEN_LIVENESS_HARD_CAP_MS";
pub const ENV_KILL_GRACE_MS: &str = "WARDEN_LIVENESS_KILL_GRACE_MS";
pub const ENV_CHECK_TIMEOUT_SECS: &str = "WARDEN_CHECK_TIMEOUT_SECS";
pub const ENV_HEARTBEAT_MS: &str = "WARDEN_HEARTBEAT_MS";
pub const ENV_STALL_LOG_MS: &str = "WARDEN_STALL_LOG_MS";
pub const ENV_TRACE: &str = "WARDEN_TRACE";

/// One layer of optional overrides, kept as raw strings
///
/// Values are only interpreted by [`RunSettings::resolve`](super::RunSettings::resolve),
/// so a bad value in one layer never masks a good value in a lower one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub level: Option<String>,
    pub stall_ms: Option<String>,
    pub min_events: Option<String>,
    pub hard_cap_ms: Option<String>,
    pub check_timeout_secs: Option<String>,
    pub kill_grace_ms: Option<String>,
    pub heartbeat_ms: Option<String>,
    pub stall_log_ms: Option<String>,
    pub verbose: Option<String>,
}

impl Overrides {
    /// Read the override layer from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a layer from any key lookup (environment, test fixture, ...)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            level: lookup(ENV_LEVEL),
            stall_ms: lookup(ENV_STALL_MS),
            min_events: lookup(ENV_MIN_EVENTS),
            hard_cap_ms: lookup(ENV_HARD_CAP_MS),
            check_timeout_secs: lookup(ENV_CHECK_TIMEOUT_SECS),
            kill_grace_ms: lookup(ENV_KILL_GRACE_MS),
            heartbeat_ms: lookup(ENV_HEARTBEAT_MS),
            stall_log_ms: lookup(ENV_STALL_LOG_MS),
            verbose: lookup(ENV_TRACE),
        }
    }
}

/// First value that parses as a strictly positive integer
pub(super) fn first_positive<'a, I>(values: I) -> Option<u64>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    values
        .into_iter()
        .flatten()
        .filter_map(|raw| raw.trim().parse::<u64>().ok())
        .find(|n| *n > 0)
}

/// First value that names a known liveness level
pub(super) fn first_level<'a, I>(values: I) -> Option<LivenessLevel>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    values
        .into_iter()
        .flatten()
        .find_map(|raw| raw.parse::<LivenessLevel>().ok())
}

/// First value that reads as a boolean toggle
pub(super) fn first_flag<'a, I>(values: I) -> Option<bool>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    values
        .into_iter()
        .flatten()
        .find_map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}
