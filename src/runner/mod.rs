//! Task-pool supervisor
//!
//! Runs many cases in parallel on a bounded pool of worker threads and
//! watches the pool as a whole:
//!
//! - Every task start and finish updates one shared progress tracker.
//! - The control loop waits for completions with a bounded heartbeat. A
//!   heartbeat with no completions checks the tracker for a pool stall.
//! - A stall cancels every task still queued and ends the run with one
//!   synthetic failure row. Workers already running are left to finish on
//!   their own; they are not joined.
//!
//! Records always come back ordered by submission index.

mod pool;
mod progress;
mod task;


pub use pool::{select_workers, PoolReport, PoolStall, Supervisor, STALL_CASE_ID, STALL_CHECK_ID};
pub use progress::{
    assess_stall, case_ceiling, ActiveTaskSnapshot, ProgressSnapshot, ProgressTracker,
    CASE_CEILING_FACTOR,
};
pub use task::{TaskDescriptor, TaskRecord, TaskStatus};
