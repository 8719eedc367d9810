//! Liveness-supervised parallel check runner
//!
//! Cases from a manifest run on a bounded worker pool. Each check may drive
//! child processes through the supervised executor, which enforces a hard
//! cap and an idle-stall check per process; the pool supervisor separately
//! watches for a run that has stopped making progress.

pub mod cancel;
pub mod checks;
pub mod commands;
pub mod error;
pub mod liveness;
pub mod logging;
pub mod manifest;
pub mod process;
pub mod report;
pub mod runner;
pub mod trace;
pub mod utils;
