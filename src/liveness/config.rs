//! Resolved liveness and supervisor settings

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::overrides::{first_flag, first_level, first_positive, Overrides};

/// Default idle window before a subprocess or the pool counts as stalled (30 seconds)
pub const DEFAULT_STALL_WINDOW: Duration = Duration::from_millis(30_000);

/// Default number of progress events required inside the stall window
pub const DEFAULT_MIN_PROGRESS_EVENTS: usize = 1;

/// Default absolute lifetime ceiling for a supervised subprocess (30 minutes)
pub const DEFAULT_HARD_CAP: Duration = Duration::from_millis(1_800_000);

/// Default delay between SIGTERM and SIGKILL (5 seconds)
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(5_000);

/// Default supervisor heartbeat tick (1 second)
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(1_000);

/// Default minimum spacing between stall diagnostics in the log (10 seconds)
pub const DEFAULT_STALL_LOG_INTERVAL: Duration = Duration::from_millis(10_000);

/// Default lower bound on how long one task may run before the pool gives up on it (30 seconds)
pub const DEFAULT_CASE_CEILING_FLOOR: Duration = Duration::from_secs(30);

/// Which timeout checks are armed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LivenessLevel {
    #[default]
    Off,
    Basic,
    Strict,
}

impl LivenessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LivenessLevel::Off => "off",
            LivenessLevel::Basic => "basic",
            LivenessLevel::Strict => "strict",
        }
    }
}

impl fmt::Display for LivenessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LivenessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(LivenessLevel::Off),
            "basic" => Ok(LivenessLevel::Basic),
            "strict" => Ok(LivenessLevel::Strict),
            other => Err(format!(
                "unknown liveness level '{other}' (expected off, basic or strict)"
            )),
        }
    }
}

/// Immutable liveness thresholds for one run
///
/// Fields are private so the hard-cap floor cannot be bypassed; build with
/// [`LivenessConfig::new`] and the `with_*` methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessConfig {
    level: LivenessLevel,
    stall_window: Duration,
    min_progress_events: usize,
    hard_cap: Duration,
    kill_grace: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self::new(LivenessLevel::Off)
    }
}

impl LivenessConfig {
    /// Create a configuration at `level` with default thresholds
    pub fn new(level: LivenessLevel) -> Self {
        Self {
            level,
            stall_window: DEFAULT_STALL_WINDOW,
            min_progress_events: DEFAULT_MIN_PROGRESS_EVENTS,
            hard_cap: DEFAULT_HARD_CAP,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    pub fn with_stall_window(mut self, window: Duration) -> Self {
        self.stall_window = window;
        self
    }

    /// Minimum events per window; clamped to at least 1
    pub fn with_min_progress_events(mut self, events: usize) -> Self {
        self.min_progress_events = events.max(1);
        self
    }

    /// Absolute subprocess ceiling; clamped to at least 1ms
    pub fn with_hard_cap(mut self, cap: Duration) -> Self {
        self.hard_cap = cap.max(Duration::from_millis(1));
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn level(&self) -> LivenessLevel {
        self.level
    }

    pub fn stall_window(&self) -> Duration {
        self.stall_window
    }

    pub fn min_progress_events(&self) -> usize {
        self.min_progress_events
    }

    pub fn hard_cap(&self) -> Duration {
        self.hard_cap
    }

    pub fn kill_grace(&self) -> Duration {
        self.kill_grace
    }

    /// Any timeout check is armed
    pub fn enabled(&self) -> bool {
        self.level != LivenessLevel::Off
    }

    /// The subprocess idle-stall check is armed
    pub fn strict(&self) -> bool {
        self.level == LivenessLevel::Strict
    }
}

/// Knobs that only the task-pool supervisor reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Bounded wait for the next completion before running stall checks
    pub heartbeat: Duration,
    /// Minimum spacing between stall diagnostics in the log
    pub stall_log_interval: Duration,
    /// Log an active-task snapshot on every heartbeat
    pub verbose: bool,
    /// Floor of the per-task ceiling behind `stall.runner.case_no_completion`
    pub case_ceiling_floor: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            heartbeat: DEFAULT_HEARTBEAT,
            stall_log_interval: DEFAULT_STALL_LOG_INTERVAL,
            verbose: false,
            case_ceiling_floor: DEFAULT_CASE_CEILING_FLOOR,
        }
    }
}

/// Everything resolved from overrides for one run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunSettings {
    pub liveness: LivenessConfig,
    pub supervisor: SupervisorSettings,
}

impl RunSettings {
    /// Resolve settings from override layers, highest precedence first
    ///
    /// Each knob takes the first layer whose value parses; everything else
    /// falls back to the compiled default. For the hard cap, a per-subsystem
    /// seconds override in any layer beats the generic millisecond knob.
    pub fn resolve(default_level: LivenessLevel, layers: &[&Overrides]) -> Self {
        let level = first_level(layers.iter().map(|o| o.level.as_deref())).unwrap_or(default_level);

        let stall_window = first_positive(layers.iter().map(|o| o.stall_ms.as_deref()))
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_STALL_WINDOW);

        let min_events = first_positive(layers.iter().map(|o| o.min_events.as_deref()))
            .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
            .unwrap_or(DEFAULT_MIN_PROGRESS_EVENTS);

        let hard_cap = first_positive(layers.iter().map(|o| o.check_timeout_secs.as_deref()))
            .map(|secs| Duration::from_millis(secs.saturating_mul(1_000)))
            .or_else(|| {
                first_positive(layers.iter().map(|o| o.hard_cap_ms.as_deref()))
                    .map(Duration::from_millis)
            })
            .unwrap_or(DEFAULT_HARD_CAP);

        let kill_grace = first_positive(layers.iter().map(|o| o.kill_grace_ms.as_deref()))
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_KILL_GRACE);

        let heartbeat = first_positive(layers.iter().map(|o| o.heartbeat_ms.as_deref()))
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_HEARTBEAT);

        let stall_log_interval = first_positive(layers.iter().map(|o| o.stall_log_ms.as_deref()))
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_STALL_LOG_INTERVAL);

        let verbose = first_flag(layers.iter().map(|o| o.verbose.as_deref())).unwrap_or(false);

        Self {
            liveness: LivenessConfig::new(level)
                .with_stall_window(stall_window)
                .with_min_progress_events(min_events)
                .with_hard_cap(hard_cap)
                .with_kill_grace(kill_grace),
            supervisor: SupervisorSettings {
                heartbeat,
                stall_log_interval,
                verbose,
                case_ceiling_floor: DEFAULT_CASE_CEILING_FLOOR,
            },
        }
    }
}
