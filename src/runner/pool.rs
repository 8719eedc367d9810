//! Bounded worker pool with a heartbeat-driven control loop

use std::any::Any;
use std::collections::{HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, info, warn};

use super::progress::{assess_stall, ActiveTaskSnapshot, ProgressSnapshot, ProgressTracker};
use super::task::{TaskDescriptor, TaskRecord, TaskStatus};
use crate::cancel::CancelFlag;
use crate::checks::{CheckContext, CheckError, CheckRegistry};
use crate::error::{ConfigError, MAX_WORKERS};
use crate::liveness::{LivenessConfig, LivenessFailure, ReasonToken, RunSettings};
use crate::process::ExecError;
use crate::report::{ProfileRecord, ProfileSink};
use crate::trace::{self, attrs, SpanId, SpanStatus, Tracer};
use crate::utils::duration_ms;

/// Case id on the synthetic row describing a pool stall
pub const STALL_CASE_ID: &str = "runner";

/// Check id on the synthetic row describing a pool stall
pub const STALL_CHECK_ID: &str = "runner.supervisor";

const MISSING_RESULT: &str = "worker exited before reporting a result";

const REAP_POLL: Duration = Duration::from_millis(10);

/// Pick the worker count for `task_count` tasks
///
/// `requested == 0` means one worker per available core. One task, or an
/// explicit request for one worker, runs sequentially.
pub fn select_workers(requested: usize, task_count: usize, available: usize) -> usize {
    if task_count <= 1 || requested == 1 {
        return 1;
    }
    let wanted = if requested == 0 {
        available.max(1)
    } else {
        requested
    };
    wanted.min(task_count)
}

fn available_parallelism() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// A run-level stall detected by the heartbeat
#[derive(Debug, Clone)]
pub struct PoolStall {
    pub failure: LivenessFailure,
    pub inactive_for: Duration,
    /// Tasks that were still queued and got cancelled
    pub pending: usize,
    pub active: Vec<ActiveTaskSnapshot>,
}

impl PoolStall {
    fn new(reason: ReasonToken, snapshot: &ProgressSnapshot, pending: usize) -> Self {
        let inactive_ms = snapshot.inactive_for.as_millis();
        let message = match snapshot.longest_running() {
            None => format!(
                "no task started or finished for {inactive_ms}ms with {pending} pending"
            ),
            Some(task) => format!(
                "no task finished for {inactive_ms}ms; '{}' has been running for {}ms ({pending} pending, {} active)",
                task.task_id,
                task.running_duration.as_millis(),
                snapshot.active.len()
            ),
        };
        Self {
            failure: LivenessFailure::new(reason, message),
            inactive_for: snapshot.inactive_for,
            pending,
            active: snapshot.active.clone(),
        }
    }

    fn record(&self, index: usize) -> TaskRecord {
        let active: Vec<&str> = self.active.iter().map(|t| t.task_id.as_str()).collect();
        let mut message = format!("{STALL_CASE_ID}: {}", self.failure);
        if !active.is_empty() {
            message.push_str(&format!(" [active: {}]", active.join(", ")));
        }
        TaskRecord {
            index,
            task_id: STALL_CASE_ID.to_string(),
            check_id: STALL_CHECK_ID.to_string(),
            duration: self.inactive_for,
            status: TaskStatus::Fail,
            failure_message: Some(message),
        }
    }
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct PoolReport {
    /// One row per finished task, plus the stall row if any, ordered by index
    pub records: Vec<TaskRecord>,
    pub workers_used: usize,
    pub total_duration: Duration,
    pub stall: Option<PoolStall>,
    /// Ids of tasks that were never started
    pub cancelled: Vec<String>,
    /// The run's cancel flag was tripped
    pub interrupted: bool,
}

impl PoolReport {
    pub fn failed_count(&self) -> usize {
        self.records.iter().filter(|r| r.failed()).count()
    }

    pub fn passed(&self) -> bool {
        self.stall.is_none() && !self.interrupted && self.failed_count() == 0
    }
}

/// State shared by the control loop and every worker
struct Shared {
    queue: Mutex<VecDeque<(usize, TaskDescriptor)>>,
    tracker: ProgressTracker,
    registry: Arc<CheckRegistry>,
    liveness: LivenessConfig,
    tracer: Option<Arc<dyn Tracer>>,
    run_span: Option<SpanId>,
    profile: Arc<ProfileSink>,
    cancel: CancelFlag,
    base_dir: Option<PathBuf>,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, VecDeque<(usize, TaskDescriptor)>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_task(&self) -> Option<(usize, TaskDescriptor)> {
        self.queue().pop_front()
    }

    fn pending(&self) -> usize {
        self.queue().len()
    }

    /// Take every task no worker has picked up yet
    fn drain_pending(&self) -> Vec<(usize, TaskDescriptor)> {
        self.queue().drain(..).collect()
    }

    fn run_task(&self, index: usize, task: &TaskDescriptor) -> TaskRecord {
        self.tracker.begin(index, &task.id, &task.check);
        debug!(index, case_id = %task.id, check_id = %task.check, "case started");

        let tracer = self.tracer.as_deref();
        let started = Instant::now();
        let mut span = trace::span(
            tracer,
            "check.execute",
            "check",
            "check.execute",
            self.run_span.as_ref(),
            attrs(json!({"case_id": task.id, "check_id": task.check, "index": index})),
        );
        let span_id = span.as_ref().map(|s| s.id().clone());

        let outcome = match self.registry.get(&task.check) {
            Some(check) => {
                let ctx = CheckContext {
                    liveness: &self.liveness,
                    tracer,
                    span: span_id.as_ref(),
                    cancel: &self.cancel,
                    profile: &self.profile,
                    base_dir: self.base_dir.as_deref(),
                };
                panic::catch_unwind(AssertUnwindSafe(|| check.execute(task, &ctx)))
                    .unwrap_or_else(|payload| {
                        Err(CheckError::Other(anyhow::anyhow!(
                            "check panicked: {}",
                            panic_message(payload.as_ref())
                        )))
                    })
            }
            None => Err(CheckError::Invalid(format!("unknown check '{}'", task.check))),
        };
        let duration = started.elapsed();

        if let (Some(guard), Err(err)) = (span.as_mut(), &outcome) {
            let status = match err {
                CheckError::Exec(ExecError::Liveness(_)) => SpanStatus::Timeout,
                _ => SpanStatus::Error,
            };
            guard.set_status(status);
        }
        drop(span);

        self.profile.push(ProfileRecord::new(
            &task.id,
            &task.check,
            "check.execute",
            duration,
        ));
        self.tracker.finish(index);

        match outcome {
            Ok(()) => {
                debug!(index, case_id = %task.id, elapsed_ms = duration_ms(duration), "case passed");
                TaskRecord::pass(index, task, duration)
            }
            Err(err) => {
                debug!(index, case_id = %task.id, error = %err, "case failed");
                TaskRecord::fail(index, task, duration, err)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn worker_loop(shared: Arc<Shared>, tx: Sender<TaskRecord>) {
    while !shared.cancel.is_cancelled() {
        let Some((index, task)) = shared.next_task() else {
            break;
        };
        let record = shared.run_task(index, &task);
        if tx.send(record).is_err() {
            // Control loop has returned (pool stall)
            break;
        }
    }
}

/// Runs tasks on a bounded pool and watches the pool for stalls
///
/// Built once per run. Workers own clones of the shared handles so a worker
/// abandoned after a stall can finish on its own without borrowing from the
/// supervisor.
pub struct Supervisor {
    registry: Arc<CheckRegistry>,
    settings: RunSettings,
    tracer: Option<Arc<dyn Tracer>>,
    profile: Arc<ProfileSink>,
    cancel: CancelFlag,
    base_dir: Option<PathBuf>,
    /// Workers still running when a pool stall ended the last run
    abandoned: Mutex<Vec<JoinHandle<()>>>,
}

impl Supervisor {
    pub fn new(registry: Arc<CheckRegistry>, settings: RunSettings) -> Self {
        Self {
            registry,
            settings,
            tracer: None,
            profile: Arc::new(ProfileSink::new()),
            cancel: CancelFlag::new(),
            base_dir: None,
            abandoned: Mutex::new(Vec::new()),
        }
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn with_profile(mut self, profile: Arc<ProfileSink>) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Directory relative case paths resolve against
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn profile(&self) -> &Arc<ProfileSink> {
        &self.profile
    }

    fn abandoned_workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.abandoned.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join workers left behind by a pool stall, waiting at most `within`
    ///
    /// Returns how many are still running afterwards. Only workers that see
    /// the cancel flag (their supervised subprocess terminating) can finish;
    /// trip the flag first.
    pub fn reap_abandoned(&self, within: Duration) -> usize {
        let deadline = Instant::now() + within;
        loop {
            let mut workers = self.abandoned_workers();
            let (finished, running): (Vec<_>, Vec<_>) =
                workers.drain(..).partition(|h| h.is_finished());
            *workers = running;
            drop(workers);

            for handle in finished {
                if handle.join().is_err() {
                    warn!("worker thread panicked outside a check");
                }
            }

            let left = self.abandoned_workers().len();
            if left == 0 || Instant::now() >= deadline {
                return left;
            }
            thread::sleep(REAP_POLL.min(deadline.saturating_duration_since(Instant::now())));
        }
    }

    /// Reject the run before anything starts
    pub fn validate(&self, tasks: &[TaskDescriptor], requested_workers: usize) -> Result<(), ConfigError> {
        if requested_workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkers(requested_workers));
        }
        let mut seen = HashSet::new();
        for task in tasks {
            if !seen.insert(task.id.as_str()) {
                return Err(ConfigError::DuplicateCase(task.id.clone()));
            }
            let check = self
                .registry
                .get(&task.check)
                .ok_or_else(|| ConfigError::UnknownCheck {
                    case_id: task.id.clone(),
                    check_id: task.check.clone(),
                })?;
            check.validate(task).map_err(|reason| ConfigError::InvalidCase {
                case_id: task.id.clone(),
                reason,
            })?;
        }
        Ok(())
    }

    /// Run every task and collect one record per task
    ///
    /// Fails only on invalid input. Task failures, liveness failures and
    /// pool stalls all come back inside the [`PoolReport`].
    pub fn run(&self, tasks: Vec<TaskDescriptor>, requested_workers: usize) -> Result<PoolReport, ConfigError> {
        self.validate(&tasks, requested_workers)?;

        let started = Instant::now();
        let total = tasks.len();
        let workers = select_workers(requested_workers, total, available_parallelism());
        let liveness = &self.settings.liveness;
        info!(
            tasks = total,
            workers,
            level = %liveness.level(),
            stall_ms = liveness.stall_window().as_millis() as u64,
            hard_cap_ms = liveness.hard_cap().as_millis() as u64,
            "starting run"
        );

        let mut run_span = trace::span(
            self.tracer.as_deref(),
            "runner.run",
            "run",
            "runner",
            None,
            attrs(json!({"task_count": total, "workers": workers})),
        );

        let catalog: Vec<(String, String)> = tasks
            .iter()
            .map(|t| (t.id.clone(), t.check.clone()))
            .collect();
        let shared = Arc::new(Shared {
            queue: Mutex::new(tasks.into_iter().enumerate().collect()),
            tracker: ProgressTracker::new(),
            registry: Arc::clone(&self.registry),
            liveness: liveness.clone(),
            tracer: self.tracer.clone(),
            run_span: run_span.as_ref().map(|s| s.id().clone()),
            profile: Arc::clone(&self.profile),
            cancel: self.cancel.clone(),
            base_dir: self.base_dir.clone(),
        });

        let (tx, rx) = mpsc::channel();
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(workers);
        if total > 0 {
            for n in 0..workers {
                let worker_shared = Arc::clone(&shared);
                let worker_tx = tx.clone();
                match thread::Builder::new()
                    .name(format!("warden-worker-{n}"))
                    .spawn(move || worker_loop(worker_shared, worker_tx))
                {
                    Ok(handle) => handles.push(handle),
                    Err(e) => warn!(worker = n, error = %e, "failed to spawn worker thread"),
                }
            }
        }
        drop(tx);

        let heartbeat = self.settings.supervisor.heartbeat.max(Duration::from_millis(1));
        let mut records: Vec<TaskRecord> = Vec::with_capacity(total + 1);
        let mut cancelled: Vec<(usize, String)> = Vec::new();
        let mut interrupted = false;
        let mut stall: Option<PoolStall> = None;
        let mut last_stall_log: Option<Instant> = None;

        while records.len() + cancelled.len() < total {
            if !interrupted && self.cancel.is_cancelled() {
                interrupted = true;
                let drained = shared.drain_pending();
                warn!(pending = drained.len(), "run interrupted, cancelling pending cases");
                cancelled.extend(drained.into_iter().map(|(i, t)| (i, t.id)));
                continue;
            }

            match rx.recv_timeout(heartbeat) {
                Ok(record) => records.push(record),
                Err(RecvTimeoutError::Timeout) => {
                    let snapshot = shared.tracker.snapshot(Instant::now());
                    self.on_heartbeat(&shared, &snapshot, records.len());

                    let floor = self.settings.supervisor.case_ceiling_floor;
                    if let Some(reason) = assess_stall(&snapshot, liveness, floor) {
                        let drained = shared.drain_pending();
                        let detected = PoolStall::new(reason, &snapshot, drained.len());
                        warn!(
                            reason = %reason,
                            pending = detected.pending,
                            active = detected.active.len(),
                            "{}",
                            detected.failure.message
                        );
                        if let Some(tracer) = self.tracer.as_deref() {
                            tracer.note_timeout(
                                reason,
                                shared.run_span.as_ref(),
                                attrs(json!({
                                    "inactive_ms": duration_ms(snapshot.inactive_for),
                                    "pending": detected.pending,
                                    "active": detected.active,
                                })),
                            );
                        }
                        cancelled.extend(drained.into_iter().map(|(i, t)| (i, t.id)));
                        stall = Some(detected);
                        break;
                    }

                    self.log_slow_progress(&snapshot, &mut last_stall_log);
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if let Some(detected) = &stall {
            // Running workers are not joined here; see `reap_abandoned`
            if !detected.active.is_empty() {
                let ids: Vec<&str> = detected.active.iter().map(|t| t.task_id.as_str()).collect();
                warn!(workers = ids.len(), cases = ?ids, "abandoning workers still running after pool stall");
            }
            records.push(detected.record(total));
            self.abandoned_workers().extend(handles);
        } else {
            let reported: HashSet<usize> = records
                .iter()
                .map(|r| r.index)
                .chain(cancelled.iter().map(|(i, _)| *i))
                .collect();
            for (index, (id, check)) in catalog.iter().enumerate() {
                if !reported.contains(&index) {
                    warn!(index, case_id = %id, "{MISSING_RESULT}");
                    let task = TaskDescriptor::new(id.as_str(), check.as_str());
                    records.push(TaskRecord::fail(index, &task, Duration::ZERO, MISSING_RESULT));
                }
            }
            for handle in handles {
                if handle.join().is_err() {
                    warn!("worker thread panicked outside a check");
                }
            }
        }

        records.sort_by_key(|r| r.index);
        cancelled.sort_by_key(|(i, _)| *i);
        let report = PoolReport {
            records,
            workers_used: workers,
            total_duration: started.elapsed(),
            stall,
            cancelled: cancelled.into_iter().map(|(_, id)| id).collect(),
            interrupted,
        };

        if let Some(guard) = run_span.as_mut() {
            if report.stall.is_some() {
                guard.set_status(SpanStatus::Timeout);
            } else if !report.passed() {
                guard.set_status(SpanStatus::Error);
            }
        }
        info!(
            tasks = total,
            failed = report.failed_count(),
            cancelled = report.cancelled.len(),
            elapsed_ms = duration_ms(report.total_duration),
            "run finished"
        );
        Ok(report)
    }

    fn on_heartbeat(&self, shared: &Shared, snapshot: &ProgressSnapshot, completed: usize) {
        let pending = shared.pending();
        trace::event(
            self.tracer.as_deref(),
            "heartbeat",
            shared.run_span.as_ref(),
            attrs(json!({
                "idle_ms": duration_ms(snapshot.inactive_for),
                "active": snapshot.active.len(),
                "pending": pending,
                "completed": completed,
            })),
        );
        if self.settings.supervisor.verbose {
            debug!(
                idle_ms = duration_ms(snapshot.inactive_for),
                pending,
                completed,
                active = ?snapshot.active,
                "heartbeat"
            );
        }
    }

    /// Throttled warning while the pool is quiet but not yet stalled
    fn log_slow_progress(&self, snapshot: &ProgressSnapshot, last: &mut Option<Instant>) {
        let interval = self.settings.supervisor.stall_log_interval;
        if snapshot.inactive_for < interval {
            return;
        }
        let now = Instant::now();
        if last.is_some_and(|at| now.saturating_duration_since(at) < interval) {
            return;
        }
        *last = Some(now);
        match snapshot.longest_running() {
            Some(task) => warn!(
                idle_ms = duration_ms(snapshot.inactive_for),
                active = snapshot.active.len(),
                longest = %task.task_id,
                longest_ms = duration_ms(task.running_duration),
                "no case has finished recently"
            ),
            None => warn!(
                idle_ms = duration_ms(snapshot.inactive_for),
                "no case is running and none has finished recently"
            ),
        }
    }
}
