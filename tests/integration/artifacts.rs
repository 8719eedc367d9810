//! Artifacts written by a run: timing, profile and trace

use std::fs;

use serial_test::serial;

use warden::commands::run::{execute, RunOptions};
use warden::liveness::LivenessLevel;
use warden::report::{ProfileArtifact, TOP_SLOWEST_LIMIT};

use super::helpers::*;

fn many_cases(count: usize, failing: &[usize]) -> String {
    let mut yaml = String::from("cases:\n");
    for i in 0..count {
        let code = if failing.contains(&i) { 1 } else { 0 };
        yaml.push_str(&format!(
            "  - id: case-{i:02}\n    check: command\n    argv: [\"sh\", \"-c\", \"exit {code}\"]\n"
        ));
    }
    yaml
}

#[test]
#[serial]
fn test_timing_counts_match_rows() {
    let (dir, manifest) = write_manifest(&many_cases(8, &[2, 5]));
    let timing = dir.path().join("timing.json");
    let options = RunOptions {
        workers: 4,
        timing_out: Some(timing.clone()),
        ..run_options(&manifest)
    };
    execute(options, fast_settings(LivenessLevel::Basic, 5_000)).expect("Run should complete");

    let json = read_json(&timing);
    assert_eq!(json["version"], 1);
    let cases = json["cases"].as_array().unwrap();
    let failed = cases.iter().filter(|c| c["status"] == "fail").count();
    assert_eq!(json["summary"]["task_count"], cases.len());
    assert_eq!(json["summary"]["task_count"], 8);
    assert_eq!(json["summary"]["failed_count"], failed);
    assert_eq!(failed, 2);
    assert!(json["summary"]["total_duration_ms"].as_f64().unwrap() > 0.0);
    for case in cases {
        assert!(case["duration_ms"].as_f64().unwrap() >= 0.0);
    }
}

#[test]
#[serial]
fn test_profile_artifact_caps_top_slowest() {
    let (dir, manifest) = write_manifest(&many_cases(15, &[]));
    let profile = dir.path().join("profile/warden-profile.json");
    let options = RunOptions {
        workers: 4,
        profile: true,
        profile_out: Some(profile.clone()),
        ..run_options(&manifest)
    };
    execute(options, fast_settings(LivenessLevel::Off, 1_000)).expect("Run should complete");

    let text = fs::read_to_string(&profile).expect("Profile artifact should exist");
    let artifact: ProfileArtifact = serde_json::from_str(&text).expect("Profile should parse");
    assert_eq!(artifact.version, 1);
    assert_eq!(artifact.status, "pass");
    assert_eq!(artifact.summary.task_count, 15);
    // one check.execute and one subprocess.exec row per case
    assert_eq!(artifact.summary.record_count, 30);
    assert_eq!(artifact.records.len(), 30);
    assert_eq!(artifact.top_slowest.len(), TOP_SLOWEST_LIMIT);
    assert!(artifact
        .top_slowest
        .windows(2)
        .all(|w| w[0].duration_ms >= w[1].duration_ms));
}

#[test]
#[serial]
fn test_trace_artifact_records_spans_and_redacts() {
    let yaml = r#"
cases:
  - id: secretive
    check: command
    argv: ["sh", "-c", "exit 0", "--api-key=hunter2"]
"#;
    let (dir, manifest) = write_manifest(yaml);
    let trace = dir.path().join("trace.json");
    let options = RunOptions {
        trace_out: Some(trace.clone()),
        ..run_options(&manifest)
    };
    execute(options, fast_settings(LivenessLevel::Basic, 5_000)).expect("Run should complete");

    let json = read_json(&trace);
    assert_eq!(json["version"], 1);
    assert_eq!(json["status"], "pass");
    let names: Vec<&str> = json["spans"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"runner.run"));
    assert!(names.contains(&"check.execute"));
    assert!(names.contains(&"subprocess.exec"));

    let text = fs::read_to_string(&trace).unwrap();
    assert!(!text.contains("hunter2"), "secret leaked into trace: {text}");
}

#[test]
#[serial]
fn test_no_artifacts_without_flags() {
    let (dir, manifest) = write_manifest(&many_cases(2, &[]));
    execute(run_options(&manifest), fast_settings(LivenessLevel::Off, 1_000))
        .expect("Run should complete");

    let written: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(written, vec![std::ffi::OsString::from("warden.yaml")]);
}
