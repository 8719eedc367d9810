//! Supervised subprocess execution with hard-cap and idle-stall enforcement

use std::collections::VecDeque;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, warn};

use super::error::ExecError;
use super::streams::{spawn_reader, CappedBuffer, StreamEvent, StreamKind, MAX_OUTPUT_SIZE};
use super::{terminate_group, Termination};
use crate::cancel::CancelFlag;
use crate::liveness::{LivenessConfig, LivenessFailure, ReasonToken};
use crate::trace::{self, attrs, SpanId, SpanStatus, Tracer};
use crate::utils::{duration_ms, render_command};

/// Longest single wait inside the supervision loop
pub const POLL_TICK: Duration = Duration::from_millis(200);

/// Captured result of a subprocess that exited on its own
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// Exit code; `None` when the process died from a signal
    pub exit_code: Option<i32>,
    /// Terminating signal, if any
    pub signal: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Progress events (output chunks) seen inside the trailing stall window
#[derive(Debug)]
struct ProgressWindow {
    events: VecDeque<Instant>,
    span: Duration,
    last: Instant,
}

impl ProgressWindow {
    /// The spawn itself counts as the first event
    fn new(start: Instant, span: Duration) -> Self {
        let mut events = VecDeque::new();
        events.push_back(start);
        Self {
            events,
            span: span.max(Duration::from_millis(1)),
            last: start,
        }
    }

    fn record(&mut self, at: Instant) {
        self.events.push_back(at);
        self.last = at;
    }

    fn trim(&mut self, now: Instant) {
        while let Some(front) = self.events.front() {
            if now.saturating_duration_since(*front) > self.span {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    fn count(&self) -> usize {
        self.events.len()
    }

    fn idle(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last)
    }
}

/// Runs one child process end-to-end under a [`LivenessConfig`]
///
/// The executor owns the child's pipes until it exits or is terminated.
/// Tracing and cancellation are optional hooks.
pub struct SupervisedExecutor<'a> {
    config: &'a LivenessConfig,
    tracer: Option<&'a dyn Tracer>,
    parent_span: Option<&'a SpanId>,
    cancel: Option<&'a CancelFlag>,
    phase: &'a str,
}

/// Run `argv` under `config` without tracing or cancellation
pub fn run_supervised(
    argv: &[String],
    working_dir: Option<&Path>,
    config: &LivenessConfig,
) -> Result<ProcessOutcome, ExecError> {
    SupervisedExecutor::new(config).run(argv, working_dir)
}

impl<'a> SupervisedExecutor<'a> {
    pub fn new(config: &'a LivenessConfig) -> Self {
        Self {
            config,
            tracer: None,
            parent_span: None,
            cancel: None,
            phase: "subprocess.exec",
        }
    }

    pub fn with_tracer(mut self, tracer: Option<&'a dyn Tracer>, parent: Option<&'a SpanId>) -> Self {
        self.tracer = tracer;
        self.parent_span = parent;
        self
    }

    pub fn with_cancel(mut self, cancel: &'a CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Phase recorded on the `subprocess.exec` span (default `subprocess.exec`)
    pub fn with_phase(mut self, phase: &'a str) -> Self {
        self.phase = phase;
        self
    }

    /// Spawn `argv` and supervise it until it exits or a liveness check fires
    ///
    /// Returns the captured output on a graceful exit (whatever the exit
    /// code). A hard-cap or strict-stall failure terminates the whole process
    /// group before the error is returned.
    pub fn run(&self, argv: &[String], working_dir: Option<&Path>) -> Result<ProcessOutcome, ExecError> {
        let (program, args) = argv.split_first().ok_or(ExecError::EmptyCommand)?;
        let command = render_command(argv);

        let mut span = trace::span(
            self.tracer,
            "subprocess.exec",
            "subprocess",
            self.phase,
            self.parent_span,
            attrs(json!({
                "argv_count": argv.len(),
                "cwd": working_dir.map(|d| d.display().to_string()),
            })),
        );
        let span_id = span.as_ref().map(|s| s.id().clone());

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            command: command.clone(),
            source,
        })?;
        let pid = child.id();
        debug!(pid, %command, "spawned supervised subprocess");
        self.event(
            "subprocess_state",
            span_id.as_ref(),
            json!({"state": "spawned", "pid": pid}),
        );

        let result = self.supervise(&mut child, &command, span_id.as_ref());

        if let Some(guard) = span.as_mut() {
            match &result {
                Ok(_) => {}
                Err(ExecError::Liveness(_)) => guard.set_status(SpanStatus::Timeout),
                Err(_) => guard.set_status(SpanStatus::Error),
            }
        }
        result
    }

    fn supervise(
        &self,
        child: &mut Child,
        command: &str,
        span_id: Option<&SpanId>,
    ) -> Result<ProcessOutcome, ExecError> {
        let (tx, rx) = mpsc::channel();
        let mut open_streams = 0usize;
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(StreamKind::Stdout, stdout, tx.clone());
            open_streams += 1;
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(StreamKind::Stderr, stderr, tx.clone());
            open_streams += 1;
        }
        drop(tx);

        let start = Instant::now();
        let mut window = ProgressWindow::new(start, self.config.stall_window());
        let mut stdout = CappedBuffer::new(MAX_OUTPUT_SIZE);
        let mut stderr = CappedBuffer::new(MAX_OUTPUT_SIZE);
        let mut exit_status: Option<ExitStatus> = None;

        loop {
            let now = Instant::now();
            window.trim(now);

            if let Some(failure) = self.check_deadlines(now, start, &window, command) {
                return Err(self.abort(child, failure, now.duration_since(start), span_id));
            }

            if self.cancel.is_some_and(CancelFlag::is_cancelled) {
                debug!(pid = child.id(), %command, "cancelling supervised subprocess");
                self.terminate(child, span_id);
                return Err(ExecError::Cancelled {
                    command: command.to_string(),
                });
            }

            if exit_status.is_none() {
                exit_status = child.try_wait().map_err(|source| ExecError::Io {
                    command: command.to_string(),
                    source,
                })?;
            }
            if exit_status.is_some() && open_streams == 0 {
                break;
            }

            let wait = self.next_wait(now, start, &window);
            match receive(&rx, wait) {
                Received::Data(kind, bytes) => {
                    window.record(Instant::now());
                    self.event(
                        "io.read",
                        span_id,
                        json!({"stream": kind.as_str(), "bytes": bytes.len()}),
                    );
                    match kind {
                        StreamKind::Stdout => stdout.push(&bytes),
                        StreamKind::Stderr => stderr.push(&bytes),
                    }
                }
                Received::Closed => open_streams = open_streams.saturating_sub(1),
                Received::Idle => {}
                Received::Disconnected => open_streams = 0,
            }
        }

        let status = match exit_status {
            Some(status) => status,
            None => child.wait().map_err(|source| ExecError::Io {
                command: command.to_string(),
                source,
            })?,
        };
        let duration = start.elapsed();
        self.event(
            "subprocess_state",
            span_id,
            json!({"state": "exit", "returncode": status.code(), "pid": child.id()}),
        );
        debug!(pid = child.id(), code = ?status.code(), elapsed_ms = duration_ms(duration), "supervised subprocess exited");

        Ok(ProcessOutcome {
            exit_code: status.code(),
            signal: status.signal(),
            stdout: stdout.into_bytes(),
            stderr: stderr.into_bytes(),
            duration,
        })
    }

    /// Hard cap first (any enabled level), then the strict-only idle stall
    fn check_deadlines(
        &self,
        now: Instant,
        start: Instant,
        window: &ProgressWindow,
        command: &str,
    ) -> Option<LivenessFailure> {
        let config = self.config;
        let elapsed = now.saturating_duration_since(start);

        if config.enabled() && !config.hard_cap().is_zero() && elapsed > config.hard_cap() {
            return Some(LivenessFailure::new(
                ReasonToken::HardCapEmergency,
                format!(
                    "{command} exceeded hard cap of {}ms",
                    config.hard_cap().as_millis()
                ),
            ));
        }

        let stall = config.stall_window();
        if config.strict()
            && !stall.is_zero()
            && window.idle(now) > stall
            && window.count() < config.min_progress_events()
        {
            return Some(LivenessFailure::new(
                ReasonToken::SubprocessStall,
                format!(
                    "{command} made no progress for {}ms",
                    stall.as_millis()
                ),
            ));
        }

        None
    }

    /// Bounded wait: one poll tick, shortened to land just past the next deadline
    fn next_wait(&self, now: Instant, start: Instant, window: &ProgressWindow) -> Duration {
        let slack = Duration::from_millis(1);
        let mut wait = POLL_TICK;
        if self.config.enabled() {
            if let Some(deadline) = start.checked_add(self.config.hard_cap()) {
                wait = wait.min(deadline.saturating_duration_since(now) + slack);
            }
        }
        if self.config.strict() && !self.config.stall_window().is_zero() {
            if let Some(deadline) = window.last.checked_add(self.config.stall_window()) {
                wait = wait.min(deadline.saturating_duration_since(now) + slack);
            }
        }
        wait.max(slack)
    }

    fn abort(
        &self,
        child: &mut Child,
        failure: LivenessFailure,
        elapsed: Duration,
        span_id: Option<&SpanId>,
    ) -> ExecError {
        warn!(
            pid = child.id(),
            reason = %failure.reason,
            elapsed_ms = duration_ms(elapsed),
            "{}",
            failure.message
        );
        if let Some(tracer) = self.tracer {
            let detail = match failure.reason {
                ReasonToken::HardCapEmergency => json!({
                    "elapsed_ms": duration_ms(elapsed),
                    "hard_cap_ms": self.config.hard_cap().as_millis() as u64,
                }),
                _ => json!({
                    "elapsed_ms": duration_ms(elapsed),
                    "stall_ms": self.config.stall_window().as_millis() as u64,
                }),
            };
            tracer.note_timeout(failure.reason, span_id, attrs(detail));
        }
        self.terminate(child, span_id);
        ExecError::Liveness(failure)
    }

    fn terminate(&self, child: &mut Child, span_id: Option<&SpanId>) {
        let pid = child.id();
        self.event(
            "watchdog",
            span_id,
            json!({"reason_token": "watchdog.kill.term", "pid": pid}),
        );
        let outcome = terminate_group(child, self.config.kill_grace());
        let token = match outcome {
            Termination::Terminated => "watchdog.kill.terminated",
            Termination::Killed => "watchdog.kill.killed",
        };
        self.event("watchdog", span_id, json!({"reason_token": token, "pid": pid}));
    }

    fn event(&self, kind: &str, span_id: Option<&SpanId>, detail: serde_json::Value) {
        trace::event(self.tracer, kind, span_id, attrs(detail));
    }
}

enum Received {
    Data(StreamKind, Vec<u8>),
    Closed,
    Idle,
    Disconnected,
}

fn receive(rx: &Receiver<StreamEvent>, wait: Duration) -> Received {
    match rx.recv_timeout(wait) {
        Ok(StreamEvent::Data(kind, bytes)) => Received::Data(kind, bytes),
        Ok(StreamEvent::Closed(_)) => Received::Closed,
        Err(RecvTimeoutError::Timeout) => Received::Idle,
        Err(RecvTimeoutError::Disconnected) => Received::Disconnected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_is_seeded_with_spawn() {
        let start = Instant::now();
        let window = ProgressWindow::new(start, Duration::from_millis(100));
        assert_eq!(window.count(), 1);
        assert_eq!(window.idle(start), Duration::ZERO);
    }

    #[test]
    fn test_window_trims_old_events() {
        let start = Instant::now();
        let mut window = ProgressWindow::new(start, Duration::from_millis(100));
        window.record(start + Duration::from_millis(50));
        window.trim(start + Duration::from_millis(120));
        assert_eq!(window.count(), 1);
        window.trim(start + Duration::from_millis(151));
        assert_eq!(window.count(), 0);
    }

    #[test]
    fn test_event_at_exact_boundary_is_kept() {
        let start = Instant::now();
        let mut window = ProgressWindow::new(start, Duration::from_millis(100));
        window.trim(start + Duration::from_millis(100));
        assert_eq!(window.count(), 1);
    }

    #[test]
    fn test_idle_resets_on_any_event() {
        let start = Instant::now();
        let mut window = ProgressWindow::new(start, Duration::from_millis(100));
        let later = start + Duration::from_millis(80);
        window.record(later);
        assert_eq!(window.idle(later + Duration::from_millis(30)), Duration::from_millis(30));
    }

    #[test]
    fn test_strict_stall_requires_idle_strictly_greater_than_window() {
        let config = LivenessConfig::new(crate::liveness::LivenessLevel::Strict)
            .with_stall_window(Duration::from_millis(100));
        let executor = SupervisedExecutor::new(&config);
        let start = Instant::now();
        let mut window = ProgressWindow::new(start, config.stall_window());

        let at_boundary = start + Duration::from_millis(100);
        window.trim(at_boundary);
        assert!(executor.check_deadlines(at_boundary, start, &window, "x").is_none());

        let past = start + Duration::from_millis(101);
        window.trim(past);
        let failure = executor.check_deadlines(past, start, &window, "x").unwrap();
        assert_eq!(failure.reason, ReasonToken::SubprocessStall);
    }

    #[test]
    fn test_basic_level_never_stalls() {
        let config = LivenessConfig::new(crate::liveness::LivenessLevel::Basic)
            .with_stall_window(Duration::from_millis(10));
        let executor = SupervisedExecutor::new(&config);
        let start = Instant::now();
        let mut window = ProgressWindow::new(start, config.stall_window());
        let later = start + Duration::from_secs(5);
        window.trim(later);
        assert!(executor.check_deadlines(later, start, &window, "x").is_none());
    }

    #[test]
    fn test_hard_cap_beats_stall() {
        let config = LivenessConfig::new(crate::liveness::LivenessLevel::Strict)
            .with_stall_window(Duration::from_millis(10))
            .with_hard_cap(Duration::from_millis(20));
        let executor = SupervisedExecutor::new(&config);
        let start = Instant::now();
        let mut window = ProgressWindow::new(start, config.stall_window());
        let later = start + Duration::from_millis(50);
        window.trim(later);
        let failure = executor.check_deadlines(later, start, &window, "x").unwrap();
        assert_eq!(failure.reason, ReasonToken::HardCapEmergency);
    }

    #[test]
    fn test_off_level_disables_hard_cap() {
        let config = LivenessConfig::new(crate::liveness::LivenessLevel::Off)
            .with_hard_cap(Duration::from_millis(1));
        let executor = SupervisedExecutor::new(&config);
        let start = Instant::now();
        let window = ProgressWindow::new(start, config.stall_window());
        assert!(executor
            .check_deadlines(start + Duration::from_secs(1), start, &window, "x")
            .is_none());
    }
}
