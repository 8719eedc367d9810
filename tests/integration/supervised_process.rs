//! Supervised executor against real process trees

use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use warden::cancel::CancelFlag;
use warden::liveness::{LivenessConfig, LivenessLevel, ReasonToken};
use warden::process::{run_supervised, ExecError, SupervisedExecutor};

use super::helpers::*;

#[test]
fn test_hard_cap_kills_whole_process_group() {
    let tmp = TempDir::new().expect("Failed to create temp dir");
    let pidfile = tmp.path().join("grandchild.pid");
    let script = format!("sleep 30 & echo $! > {}; wait", pidfile.display());

    let config = LivenessConfig::new(LivenessLevel::Basic)
        .with_hard_cap(Duration::from_millis(400))
        .with_kill_grace(Duration::from_millis(200));
    let err = run_supervised(&argv(&["sh", "-c", &script]), None, &config)
        .expect_err("Should hit the hard cap");
    let failure = err.liveness().expect("Should be a liveness failure");
    assert_eq!(failure.reason, ReasonToken::HardCapEmergency);

    let pid: u32 = fs::read_to_string(&pidfile)
        .expect("Grandchild pid should be written")
        .trim()
        .parse()
        .expect("Pid should be numeric");
    assert!(
        wait_until(Duration::from_secs(2), || !is_running(pid)),
        "Grandchild {pid} should not outlive the group kill"
    );
}

#[test]
fn test_strict_stall_after_initial_output() {
    let config = LivenessConfig::new(LivenessLevel::Strict)
        .with_stall_window(Duration::from_millis(300))
        .with_kill_grace(Duration::from_millis(200));

    let started = Instant::now();
    let err = run_supervised(&argv(&["sh", "-c", "echo warming up; sleep 10"]), None, &config)
        .expect_err("Silent process should stall");

    assert_eq!(err.liveness().map(|f| f.reason), Some(ReasonToken::SubprocessStall));
    assert!(err.to_string().starts_with("stall.subprocess.no_output_no_event"));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[test]
fn test_strict_chatty_process_completes() {
    let config = LivenessConfig::new(LivenessLevel::Strict)
        .with_stall_window(Duration::from_millis(500))
        .with_min_progress_events(1);

    let script = "for i in 1 2 3 4 5 6; do echo tick $i; sleep 0.1; done";
    let outcome = run_supervised(&argv(&["sh", "-c", script]), None, &config)
        .expect("Chatty process should finish");

    assert!(outcome.success());
    assert_eq!(outcome.stdout_text().lines().count(), 6);
}

#[test]
fn test_cancel_terminates_running_process() {
    let config = LivenessConfig::new(LivenessLevel::Off).with_kill_grace(Duration::from_millis(200));
    let cancel = CancelFlag::new();
    let trip = cancel.clone();
    let tripper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        trip.cancel();
    });

    let started = Instant::now();
    let err = SupervisedExecutor::new(&config)
        .with_cancel(&cancel)
        .run(&argv(&["sleep", "10"]), None)
        .expect_err("Cancelled process should not succeed");
    tripper.join().expect("Tripper thread panicked");

    assert!(matches!(err, ExecError::Cancelled { .. }));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[test]
fn test_large_output_is_captured() {
    let config = LivenessConfig::new(LivenessLevel::Strict).with_stall_window(Duration::from_millis(500));
    let outcome = run_supervised(&argv(&["sh", "-c", "seq 1 20000"]), None, &config)
        .expect("seq should finish");

    let stdout = outcome.stdout_text();
    assert!(stdout.starts_with("1\n"));
    assert!(stdout.trim_end().ends_with("20000"));
}
