//! Per-phase profile rows and the profile artifact

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::duration_ms;

/// Rows listed in `top_slowest`
pub const TOP_SLOWEST_LIMIT: usize = 20;

/// Time spent in one phase of one case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub case_id: String,
    pub check_id: String,
    pub phase: String,
    pub duration_ms: f64,
}

impl ProfileRecord {
    pub fn new(case_id: &str, check_id: &str, phase: &str, duration: Duration) -> Self {
        Self {
            case_id: case_id.to_string(),
            check_id: check_id.to_string(),
            phase: phase.to_string(),
            duration_ms: duration_ms(duration),
        }
    }
}

/// Append-only collection of [`ProfileRecord`]s shared by every worker
#[derive(Debug, Default)]
pub struct ProfileSink {
    rows: Mutex<Vec<ProfileRecord>>,
}

impl ProfileSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: ProfileRecord) {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    pub fn records(&self) -> Vec<ProfileRecord> {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub task_count: usize,
    pub record_count: usize,
    pub total_duration_ms: f64,
}

/// `{version, status, summary, top_slowest, records}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileArtifact {
    pub version: u32,
    pub status: String,
    pub summary: ProfileSummary,
    pub top_slowest: Vec<ProfileRecord>,
    pub records: Vec<ProfileRecord>,
}

impl ProfileArtifact {
    /// Sort `records` slowest first and slice the top rows off the front
    pub fn build(status: &str, task_count: usize, total: Duration, mut records: Vec<ProfileRecord>) -> Self {
        records.sort_by(|a, b| b.duration_ms.total_cmp(&a.duration_ms));
        let top_slowest = records.iter().take(TOP_SLOWEST_LIMIT).cloned().collect();
        Self {
            version: 1,
            status: status.to_string(),
            summary: ProfileSummary {
                task_count,
                record_count: records.len(),
                total_duration_ms: duration_ms(total),
            },
            top_slowest,
            records,
        }
    }
}
