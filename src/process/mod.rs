//! Process ownership for supervised checks
//!
//! Children are spawned as leaders of their own process group so one signal
//! reaches every descendant. Termination escalates SIGTERM → grace → SIGKILL.

mod error;
mod streams;
mod supervised;


use std::process::Child;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

pub use error::ExecError;
pub use streams::{CappedBuffer, StreamKind, MAX_OUTPUT_SIZE};
pub use supervised::{run_supervised, ProcessOutcome, SupervisedExecutor, POLL_TICK};

/// Check whether any member of process group `pgid` still exists
pub fn is_group_alive(pgid: u32) -> bool {
    match i32::try_from(pgid) {
        Ok(raw) if raw > 1 => matches!(
            killpg(Pid::from_raw(raw), None),
            Ok(()) | Err(Errno::EPERM)
        ),
        _ => false,
    }
}

/// Deliver `signal` to every process in group `pgid`
///
/// Returns `false` when the group no longer exists or could not be signalled.
/// Refuses pgid 0 and 1 so a bad id never signals ourselves or init.
pub fn signal_group(pgid: u32, signal: Signal) -> bool {
    let raw = match i32::try_from(pgid) {
        Ok(raw) if raw > 1 => raw,
        _ => return false,
    };

    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(e) => {
            warn!(pgid, ?signal, error = %e, "failed to signal process group");
            false
        }
    }
}

/// How a process group went down after [`terminate_group`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Leader exited within the grace period after SIGTERM
    Terminated,
    /// Grace period elapsed and SIGKILL was sent
    Killed,
}

/// Terminate the process group led by `child`, escalating to SIGKILL
///
/// Sends SIGTERM to the whole group, waits up to `grace` for the leader, then
/// sends SIGKILL if it is still alive. Descendants that outlive their leader
/// are killed too. The leader is always reaped before returning.
pub fn terminate_group(child: &mut Child, grace: Duration) -> Termination {
    let pgid = child.id();

    if !signal_group(pgid, Signal::SIGTERM) {
        // Group already gone or unsignalable; fall back to the leader itself
        let _ = child.kill();
    }

    let exited = matches!(
        child.wait_timeout(grace.max(Duration::from_millis(1))),
        Ok(Some(_))
    );

    if exited {
        if is_group_alive(pgid) {
            debug!(pgid, "leader exited, killing lingering group members");
            signal_group(pgid, Signal::SIGKILL);
        }
        return Termination::Terminated;
    }

    warn!(pgid, grace_ms = grace.as_millis() as u64, "process group ignored SIGTERM, sending SIGKILL");
    signal_group(pgid, Signal::SIGKILL);
    let _ = child.kill();
    // Wait to reap the zombie process
    let _ = child.wait();
    Termination::Killed
}
