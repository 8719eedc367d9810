//! Whole runs through the run command

use std::time::{Duration, Instant};

use serial_test::serial;

use warden::checks::CheckRegistry;
use warden::commands::run::{execute, execute_with};
use warden::commands::RunOutcome;
use warden::error::ConfigError;
use warden::liveness::LivenessLevel;

use super::helpers::*;

const ABC: &str = r#"
cases:
  - id: A
    check: command
    argv: ["sh", "-c", "sleep 0.05"]
  - id: B
    check: command
    argv: ["sh", "-c", "echo nope >&2; exit 1"]
  - id: C
    check: output_matches
    argv: ["echo", "hello"]
    pattern: "^hello$"
"#;

#[test]
#[serial]
fn test_sequential_failure_does_not_stop_siblings() {
    let (dir, manifest) = write_manifest(ABC);
    let timing = dir.path().join("out/timing.json");
    let options = warden::commands::run::RunOptions {
        timing_out: Some(timing.clone()),
        ..run_options(&manifest)
    };

    let outcome = execute(options, fast_settings(LivenessLevel::Off, 1_000))
        .expect("Run should complete");
    assert_eq!(outcome, RunOutcome::Failed);

    let json = read_json(&timing);
    assert_eq!(json["status"], "fail");
    assert_eq!(json["summary"]["task_count"], 3);
    assert_eq!(json["summary"]["failed_count"], 1);
    assert_eq!(json["summary"]["workers_used"], 1);
    let cases = json["cases"].as_array().expect("cases array");
    let ids: Vec<&str> = cases.iter().map(|c| c["case_id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["A", "B", "C"]);
    let statuses: Vec<&str> = cases.iter().map(|c| c["status"].as_str().unwrap()).collect();
    assert_eq!(statuses, vec!["pass", "fail", "pass"]);
    assert_eq!(cases[2]["check_id"], "output_matches");
}

#[test]
#[serial]
fn test_parallel_run_passes() {
    let yaml: String = std::iter::once("cases:\n".to_string())
        .chain((0..6).map(|i| {
            format!("  - id: case-{i}\n    check: command\n    argv: [\"sh\", \"-c\", \"sleep 0.{}\"]\n", 6 - i)
        }))
        .collect();
    let (dir, manifest) = write_manifest(&yaml);
    let timing = dir.path().join("timing.json");
    let options = warden::commands::run::RunOptions {
        workers: 3,
        timing_out: Some(timing.clone()),
        ..run_options(&manifest)
    };

    let started = Instant::now();
    let outcome = execute(options, fast_settings(LivenessLevel::Basic, 5_000))
        .expect("Run should complete");
    assert_eq!(outcome, RunOutcome::Passed);
    assert!(started.elapsed() < Duration::from_millis(2_100));

    let json = read_json(&timing);
    assert_eq!(json["status"], "pass");
    assert_eq!(json["summary"]["workers_used"], 3);
    let indices: Vec<u64> = json["cases"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["index"].as_u64().unwrap())
        .collect();
    assert_eq!(indices, (0..6).collect::<Vec<u64>>());
}

#[test]
#[serial]
fn test_stuck_case_becomes_runner_stall_row() {
    let yaml = r#"
cases:
  - id: stuck
    check: command
    argv: ["sleep", "3"]
  - id: never-started
    check: command
    argv: ["true"]
"#;
    let (dir, manifest) = write_manifest(yaml);
    let timing = dir.path().join("timing.json");
    let options = warden::commands::run::RunOptions {
        timing_out: Some(timing.clone()),
        ..run_options(&manifest)
    };

    let started = Instant::now();
    let outcome = execute(options, fast_settings(LivenessLevel::Basic, 50))
        .expect("Run should complete");
    assert_eq!(outcome, RunOutcome::Failed);
    assert!(started.elapsed() < Duration::from_secs(2));

    let json = read_json(&timing);
    assert_eq!(json["status"], "fail");
    let cases = json["cases"].as_array().unwrap();
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0]["case_id"], "runner");
    assert_eq!(cases[0]["check_id"], "runner.supervisor");
    assert_eq!(cases[0]["index"], 2);
    assert_eq!(json["summary"]["task_count"], 1);
    assert_eq!(json["summary"]["failed_count"], 1);
}

#[test]
#[serial]
fn test_custom_registry_runs_in_process_checks() {
    let yaml = "- id: custom\n  check: always_fails\n";
    let (_dir, manifest) = write_manifest(yaml);
    let mut registry = CheckRegistry::with_builtins();
    registry.register_fn("always_fails", |_, _| {
        Err(warden::checks::CheckError::Assertion("always".into()))
    });

    let outcome = execute_with(
        run_options(&manifest),
        fast_settings(LivenessLevel::Off, 1_000),
        registry,
    )
    .expect("Run should complete");
    assert_eq!(outcome, RunOutcome::Failed);
}

#[test]
#[serial]
fn test_invalid_input_is_config_error() {
    let (_dir, manifest) = write_manifest(ABC);

    let empty_filter = warden::commands::run::RunOptions {
        filter: Some("  ".into()),
        ..run_options(&manifest)
    };
    let err = execute(empty_filter, fast_settings(LivenessLevel::Off, 1_000))
        .expect_err("Blank filter should be rejected");
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::EmptyPattern)
    ));

    let no_match = warden::commands::run::RunOptions {
        filter: Some("zzz*".into()),
        ..run_options(&manifest)
    };
    let err = execute(no_match, fast_settings(LivenessLevel::Off, 1_000))
        .expect_err("Filter with no matches should be rejected");
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::NoCases)
    ));

    let too_many = warden::commands::run::RunOptions {
        workers: 10_000,
        ..run_options(&manifest)
    };
    let err = execute(too_many, fast_settings(LivenessLevel::Off, 1_000))
        .expect_err("Worker count should be bounded");
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::InvalidWorkers(10_000))
    ));
}

#[test]
#[serial]
fn test_pool_stall_terminates_running_subprocess() {
    let (dir, manifest) = write_manifest("cases: []\n");
    let pidfile = dir.path().join("stuck.pid");
    let yaml = format!(
        "cases:\n  - id: stuck\n    check: command\n    argv: [\"sh\", \"-c\", \"echo $$ > {}; sleep 30\"]\n  - id: queued\n    check: command\n    argv: [\"true\"]\n",
        pidfile.display()
    );
    std::fs::write(&manifest, yaml).expect("Failed to write manifest");

    let started = Instant::now();
    let outcome = execute(run_options(&manifest), fast_settings(LivenessLevel::Basic, 50))
        .expect("Run should complete");
    assert_eq!(outcome, RunOutcome::Failed);
    assert!(started.elapsed() < Duration::from_secs(10));

    let pid: u32 = std::fs::read_to_string(&pidfile)
        .expect("Stuck case should have written its pid")
        .trim()
        .parse()
        .expect("Pid should be numeric");
    assert!(
        !is_running(pid),
        "Subprocess {pid} should be terminated once the run returns"
    );
}
