//! Tests for the check registry and built-in checks

use std::path::Path;

use super::*;
use crate::cancel::CancelFlag;
use crate::liveness::{LivenessConfig, LivenessLevel};
use crate::report::ProfileSink;

struct Fixture {
    liveness: LivenessConfig,
    cancel: CancelFlag,
    profile: ProfileSink,
}

impl Fixture {
    fn new() -> Self {
        Self {
            liveness: LivenessConfig::new(LivenessLevel::Basic),
            cancel: CancelFlag::new(),
            profile: ProfileSink::new(),
        }
    }

    fn ctx<'a>(&'a self, base_dir: Option<&'a Path>) -> CheckContext<'a> {
        CheckContext {
            liveness: &self.liveness,
            tracer: None,
            span: None,
            cancel: &self.cancel,
            profile: &self.profile,
            base_dir,
        }
    }
}

fn sh_case(id: &str, check: &str, script: &str) -> TaskDescriptor {
    TaskDescriptor::new(id, check).with_argv(["sh", "-c", script])
}

#[test]
fn test_builtins_are_registered() {
    let registry = CheckRegistry::with_builtins();
    assert_eq!(registry.ids(), vec!["command", "file_exists", "output_matches"]);
    assert!(registry.contains("command"));
    assert!(registry.get("nope").is_none());
}

#[test]
fn test_register_fn_replaces_entry() {
    let mut registry = CheckRegistry::with_builtins();
    registry.register_fn("command", |_, _| Err(CheckError::Assertion("overridden".into())));

    let fixture = Fixture::new();
    let check = registry.get("command").unwrap();
    let err = check
        .execute(&TaskDescriptor::new("a", "command"), &fixture.ctx(None))
        .unwrap_err();
    assert_eq!(err.to_string(), "overridden");
}

#[test]
fn test_command_requires_argv() {
    assert!(CommandCheck.validate(&TaskDescriptor::new("a", "command")).is_err());
    assert!(CommandCheck.validate(&sh_case("a", "command", "true")).is_ok());
}

#[test]
fn test_output_matches_validates_pattern() {
    let missing = sh_case("a", "output_matches", "echo hi");
    assert_eq!(
        OutputMatchesCheck.validate(&missing).unwrap_err(),
        "pattern is required"
    );

    let invalid = missing.clone().with_pattern("(unclosed");
    assert!(OutputMatchesCheck
        .validate(&invalid)
        .unwrap_err()
        .starts_with("invalid pattern"));

    let valid = missing.with_pattern("^hi$");
    assert!(OutputMatchesCheck.validate(&valid).is_ok());
}

#[test]
fn test_file_exists_requires_path() {
    assert!(FileExistsCheck.validate(&TaskDescriptor::new("a", "file_exists")).is_err());
    let case = TaskDescriptor::new("a", "file_exists").with_path("x");
    assert!(FileExistsCheck.validate(&case).is_ok());
}

#[test]
fn test_command_passes_on_zero_exit() {
    let fixture = Fixture::new();
    let case = sh_case("ok", "command", "exit 0");
    CommandCheck.execute(&case, &fixture.ctx(None)).unwrap();

    let rows = fixture.profile.records();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].phase, "subprocess.exec");
    assert_eq!(rows[0].case_id, "ok");
}

#[test]
fn test_command_reports_unexpected_exit() {
    let fixture = Fixture::new();
    let case = sh_case("bad", "command", "echo broken >&2; exit 4");
    let err = CommandCheck.execute(&case, &fixture.ctx(None)).unwrap_err();

    assert!(matches!(err, CheckError::Assertion(_)));
    let message = err.to_string();
    assert!(message.contains("exit code 4"), "{message}");
    assert!(message.contains("broken"), "{message}");
}

#[test]
fn test_command_honours_expect_exit() {
    let fixture = Fixture::new();
    let mut case = sh_case("three", "command", "exit 3");
    case.expect_exit = Some(3);
    CommandCheck.execute(&case, &fixture.ctx(None)).unwrap();
}

#[test]
fn test_command_runs_in_case_cwd() {
    let tmp = tempfile::TempDir::new().unwrap();
    std::fs::create_dir(tmp.path().join("sub")).unwrap();
    std::fs::write(tmp.path().join("sub/marker"), "").unwrap();

    let fixture = Fixture::new();
    let mut case = sh_case("cwd", "command", "test -f marker");
    case.cwd = Some("sub".into());
    CommandCheck
        .execute(&case, &fixture.ctx(Some(tmp.path())))
        .unwrap();
}

#[test]
fn test_output_matches_passes_and_fails() {
    let fixture = Fixture::new();
    let hit = sh_case("hit", "output_matches", "echo version 1.2.3").with_pattern(r"\d+\.\d+\.\d+");
    OutputMatchesCheck.execute(&hit, &fixture.ctx(None)).unwrap();

    let miss = sh_case("miss", "output_matches", "echo nothing").with_pattern("^version");
    let err = OutputMatchesCheck
        .execute(&miss, &fixture.ctx(None))
        .unwrap_err();
    assert!(err.to_string().contains("did not match"));
}

#[test]
fn test_file_exists_resolves_against_base_dir() {
    let tmp = tempfile::TempDir::new().unwrap();
    std::fs::write(tmp.path().join("present.txt"), "x").unwrap();
    let fixture = Fixture::new();
    let ctx = fixture.ctx(Some(tmp.path()));

    let present = TaskDescriptor::new("p", "file_exists").with_path("present.txt");
    FileExistsCheck.execute(&present, &ctx).unwrap();

    let absent = TaskDescriptor::new("a", "file_exists").with_path("absent.txt");
    let err = FileExistsCheck.execute(&absent, &ctx).unwrap_err();
    assert!(err.to_string().contains("does not exist"));
    assert!(fixture.profile.is_empty());
}

#[test]
fn test_liveness_failure_surfaces_as_exec_error() {
    let mut fixture = Fixture::new();
    fixture.liveness = LivenessConfig::new(LivenessLevel::Basic)
        .with_hard_cap(std::time::Duration::from_millis(200))
        .with_kill_grace(std::time::Duration::from_millis(100));

    let case = sh_case("slow", "command", "sleep 10");
    let err = CommandCheck.execute(&case, &fixture.ctx(None)).unwrap_err();
    match err {
        CheckError::Exec(exec) => assert!(exec.liveness().is_some()),
        other => panic!("expected exec error, got {other:?}"),
    }
}

#[test]
fn test_subprocess_span_phase_is_check_id() {
    let recorder = crate::trace::TraceRecorder::new();
    let fixture = Fixture::new();
    let ctx = CheckContext {
        tracer: Some(&recorder),
        ..fixture.ctx(None)
    };

    let case = sh_case("banner", "output_matches", "echo ready").with_pattern("ready");
    OutputMatchesCheck.execute(&case, &ctx).unwrap();

    let spans = recorder.spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].name, "subprocess.exec");
    assert_eq!(spans[0].phase, "output_matches");
}
