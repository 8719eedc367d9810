//! Run-level errors
//!
//! Everything here stops a run. Per-check failures are recovered into task
//! records and never surface as one of these.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Largest worker count accepted from the command line or a caller
pub const MAX_WORKERS: usize = 512;

/// Invalid input detected before any check runs
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read manifest {}: {source}", path.display())]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse manifest {}: {source}", path.display())]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("duplicate case id '{0}'")]
    DuplicateCase(String),
    #[error("case filter pattern is empty")]
    EmptyPattern,
    #[error("invalid case filter pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("case '{case_id}' uses unknown check '{check_id}'")]
    UnknownCheck { case_id: String, check_id: String },
    #[error("case '{case_id}': {reason}")]
    InvalidCase { case_id: String, reason: String },
    #[error("worker count {0} exceeds the maximum of {MAX_WORKERS}")]
    InvalidWorkers(usize),
    #[error("no cases selected")]
    NoCases,
}

/// An artifact could not be written
#[derive(Error, Debug)]
#[error("failed to write artifact {}: {source}", path.display())]
pub struct ArtifactWriteError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl ArtifactWriteError {
    pub fn new(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}
