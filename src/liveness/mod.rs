//! Liveness configuration and failure types
//!
//! Both supervision layers read the same immutable [`LivenessConfig`]:
//!
//! - The supervised subprocess executor enforces the hard cap (any enabled
//!   level) and the idle-stall check (strict level only).
//! - The task-pool supervisor uses the stall window to detect a pool that has
//!   stopped making progress.
//!
//! Settings are resolved once per run from explicit overrides, the process
//! environment and compiled defaults. Resolution is best-effort: a value that
//! does not parse falls through to the next source instead of failing the run.

mod config;
mod failure;
mod overrides;


pub use config::{
    LivenessConfig, LivenessLevel, RunSettings, SupervisorSettings, DEFAULT_CASE_CEILING_FLOOR,
    DEFAULT_HARD_CAP, DEFAULT_HEARTBEAT, DEFAULT_KILL_GRACE, DEFAULT_MIN_PROGRESS_EVENTS,
    DEFAULT_STALL_LOG_INTERVAL, DEFAULT_STALL_WINDOW,
};
pub use failure::{LivenessFailure, ReasonToken};
pub use overrides::{
    Overrides, ENV_CHECK_TIMEOUT_SECS, ENV_HARD_CAP_MS, ENV_HEARTBEAT_MS, ENV_KILL_GRACE_MS,
    ENV_LEVEL, ENV_MIN_EVENTS, ENV_STALL_LOG_MS, ENV_STALL_MS, ENV_TRACE,
};
