//! Run summary and JSON artifacts

mod profile;
mod timing;


use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::ArtifactWriteError;
use crate::runner::{PoolReport, TaskStatus};

pub use profile::{ProfileArtifact, ProfileRecord, ProfileSink, ProfileSummary, TOP_SLOWEST_LIMIT};
pub use timing::{TimingArtifact, TimingCase, TimingSummary};

/// Headline numbers for one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub status: TaskStatus,
    pub task_count: usize,
    pub failed_count: usize,
    pub workers_used: usize,
    pub total_duration: Duration,
}

impl RunSummary {
    pub fn passed(&self) -> bool {
        self.status == TaskStatus::Pass
    }
}

/// Fail when any row failed, a stall occurred or the run was interrupted
pub fn summarize(report: &PoolReport) -> RunSummary {
    let failed_count = report.failed_count();
    let status = if failed_count > 0 || report.stall.is_some() || report.interrupted {
        TaskStatus::Fail
    } else {
        TaskStatus::Pass
    };
    RunSummary {
        status,
        task_count: report.records.len(),
        failed_count,
        workers_used: report.workers_used,
        total_duration: report.total_duration,
    }
}

/// Write `value` as pretty JSON, atomically, creating parent directories
///
/// The file is written to a temporary sibling and renamed into place so a
/// reader never sees a partial artifact.
pub fn write_json_artifact<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactWriteError> {
    let err = |source| ArtifactWriteError::new(path, source);

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(err)?;

    let mut body = serde_json::to_vec_pretty(value).map_err(|e| err(e.into()))?;
    body.push(b'\n');

    let mut tmp = NamedTempFile::new_in(dir).map_err(err)?;
    tmp.write_all(&body).map_err(err)?;
    tmp.persist(path).map_err(|e| err(e.error))?;
    Ok(())
}
