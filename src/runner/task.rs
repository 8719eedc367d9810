//! Task descriptors in, task records out

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One case to run, as listed in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskDescriptor {
    pub id: String,
    /// Registry id of the check that decides the outcome
    pub check: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub argv: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_exit: Option<i32>,
}

impl TaskDescriptor {
    pub fn new(id: impl Into<String>, check: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            check: check.into(),
            argv: Vec::new(),
            cwd: None,
            pattern: None,
            path: None,
            expect_exit: None,
        }
    }

    pub fn with_argv<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv = argv.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pass,
    Fail,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pass => "pass",
            TaskStatus::Fail => "fail",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one submitted task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    /// Submission index
    pub index: usize,
    pub task_id: String,
    pub check_id: String,
    pub duration: Duration,
    pub status: TaskStatus,
    /// `<task_id>: <error>` for failed tasks
    pub failure_message: Option<String>,
}

impl TaskRecord {
    pub fn pass(index: usize, task: &TaskDescriptor, duration: Duration) -> Self {
        Self {
            index,
            task_id: task.id.clone(),
            check_id: task.check.clone(),
            duration,
            status: TaskStatus::Pass,
            failure_message: None,
        }
    }

    pub fn fail(index: usize, task: &TaskDescriptor, duration: Duration, error: impl fmt::Display) -> Self {
        Self {
            index,
            task_id: task.id.clone(),
            check_id: task.check.clone(),
            duration,
            status: TaskStatus::Fail,
            failure_message: Some(format!("{}: {error}", task.id)),
        }
    }

    pub fn failed(&self) -> bool {
        self.status == TaskStatus::Fail
    }
}
