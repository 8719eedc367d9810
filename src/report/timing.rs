//! Timing artifact: per-case durations in submission order

use serde::{Deserialize, Serialize};

use super::RunSummary;
use crate::runner::{PoolReport, TaskStatus};
use crate::utils::duration_ms;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    pub task_count: usize,
    pub failed_count: usize,
    pub workers_used: usize,
    pub total_duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingCase {
    pub index: usize,
    pub case_id: String,
    pub check_id: String,
    pub duration_ms: f64,
    pub status: TaskStatus,
}

/// `{version, status, summary, cases}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingArtifact {
    pub version: u32,
    pub status: TaskStatus,
    pub summary: TimingSummary,
    pub cases: Vec<TimingCase>,
}

impl TimingArtifact {
    pub fn build(summary: &RunSummary, report: &PoolReport) -> Self {
        Self {
            version: 1,
            status: summary.status,
            summary: TimingSummary {
                task_count: summary.task_count,
                failed_count: summary.failed_count,
                workers_used: summary.workers_used,
                total_duration_ms: duration_ms(summary.total_duration),
            },
            cases: report
                .records
                .iter()
                .map(|r| TimingCase {
                    index: r.index,
                    case_id: r.task_id.clone(),
                    check_id: r.check_id.clone(),
                    duration_ms: duration_ms(r.duration),
                    status: r.status,
                })
                .collect(),
        }
    }
}
