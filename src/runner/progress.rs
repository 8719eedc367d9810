//! Shared pool progress and stall assessment

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::liveness::{LivenessConfig, ReasonToken};
use crate::utils::duration_ms;

/// Multiple of the stall window a single task may run before the pool gives up on it
pub const CASE_CEILING_FACTOR: u32 = 6;

/// A task currently held by a worker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveTaskSnapshot {
    pub index: usize,
    pub task_id: String,
    pub check_id: String,
    #[serde(serialize_with = "as_millis")]
    pub running_duration: Duration,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(duration_ms(*d))
}

#[derive(Debug)]
struct ActiveEntry {
    task_id: String,
    check_id: String,
    started: Instant,
}

#[derive(Debug)]
struct ProgressState {
    last_progress: Instant,
    active: BTreeMap<usize, ActiveEntry>,
}

/// Last-progress timestamp and active-task map behind one mutex
///
/// Workers write on every task start and finish; the supervisor reads once
/// per heartbeat.
#[derive(Debug)]
pub struct ProgressTracker {
    state: Mutex<ProgressState>,
}

/// Point-in-time view taken by the heartbeat
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub inactive_for: Duration,
    /// Sorted by submission index
    pub active: Vec<ActiveTaskSnapshot>,
}

impl ProgressSnapshot {
    pub fn longest_running(&self) -> Option<&ActiveTaskSnapshot> {
        self.active.iter().max_by_key(|t| t.running_duration)
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(now: Instant) -> Self {
        Self {
            state: Mutex::new(ProgressState {
                last_progress: now,
                active: BTreeMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn begin(&self, index: usize, task_id: &str, check_id: &str) {
        let now = Instant::now();
        let mut state = self.lock();
        state.last_progress = now;
        state.active.insert(
            index,
            ActiveEntry {
                task_id: task_id.to_string(),
                check_id: check_id.to_string(),
                started: now,
            },
        );
    }

    pub fn finish(&self, index: usize) {
        let mut state = self.lock();
        state.last_progress = Instant::now();
        state.active.remove(&index);
    }

    pub fn snapshot(&self, now: Instant) -> ProgressSnapshot {
        let state = self.lock();
        ProgressSnapshot {
            inactive_for: now.saturating_duration_since(state.last_progress),
            active: state
                .active
                .iter()
                .map(|(index, entry)| ActiveTaskSnapshot {
                    index: *index,
                    task_id: entry.task_id.clone(),
                    check_id: entry.check_id.clone(),
                    running_duration: now.saturating_duration_since(entry.started),
                })
                .collect(),
        }
    }
}

/// How long a single task may run before the pool calls it stuck
pub fn case_ceiling(stall_window: Duration, floor: Duration) -> Duration {
    stall_window.saturating_mul(CASE_CEILING_FACTOR).max(floor)
}

/// Decide whether the pool has stalled
///
/// Armed only when liveness is enabled with a non-zero stall window and
/// nothing has started or finished for at least that window. With no task
/// in flight that is `stall.runner.no_progress`; otherwise it takes a task
/// running past [`case_ceiling`] to fire `stall.runner.case_no_completion`.
pub fn assess_stall(
    snapshot: &ProgressSnapshot,
    config: &LivenessConfig,
    ceiling_floor: Duration,
) -> Option<ReasonToken> {
    let window = config.stall_window();
    if !config.enabled() || window.is_zero() || snapshot.inactive_for < window {
        return None;
    }

    match snapshot.longest_running() {
        None => Some(ReasonToken::RunnerNoProgress),
        Some(task) if task.running_duration >= case_ceiling(window, ceiling_floor) => {
            Some(ReasonToken::RunnerCaseNoCompletion)
        }
        Some(_) => None,
    }
}
