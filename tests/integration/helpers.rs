//! Shared fixtures for integration tests

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tempfile::TempDir;

use warden::commands::run::RunOptions;
use warden::liveness::{LivenessConfig, LivenessLevel, RunSettings, SupervisorSettings};

/// Write `yaml` as `warden.yaml` inside a fresh temp dir
pub fn write_manifest(yaml: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("warden.yaml");
    fs::write(&path, yaml).expect("Failed to write manifest");
    (dir, path)
}

pub fn run_options(manifest: &Path) -> RunOptions {
    RunOptions {
        manifest: manifest.to_path_buf(),
        workers: 1,
        ..RunOptions::default()
    }
}

/// Settings with a fast heartbeat and a short per-case ceiling
pub fn fast_settings(level: LivenessLevel, stall_ms: u64) -> RunSettings {
    RunSettings {
        liveness: LivenessConfig::new(level).with_stall_window(Duration::from_millis(stall_ms)),
        supervisor: SupervisorSettings {
            heartbeat: Duration::from_millis(20),
            case_ceiling_floor: Duration::from_millis(200),
            ..SupervisorSettings::default()
        },
    }
}

pub fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

pub fn read_json(path: &Path) -> Value {
    let text = fs::read_to_string(path).expect("Failed to read artifact");
    serde_json::from_str(&text).expect("Artifact is not valid JSON")
}

/// Whether `pid` is still running; zombies count as gone
pub fn is_running(pid: u32) -> bool {
    match fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .and_then(|rest| rest.split_whitespace().next())
            .map(|state| state != "Z" && state != "X")
            .unwrap_or(false),
        Err(_) => false,
    }
}

/// Poll `cond` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    cond()
}
