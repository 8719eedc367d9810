use std::io;

use thiserror::Error;

use crate::liveness::LivenessFailure;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("empty command")]
    EmptyCommand,
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("failed while supervising {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Liveness(#[from] LivenessFailure),
    #[error("{command} cancelled: run interrupted")]
    Cancelled { command: String },
}

impl ExecError {
    /// The liveness failure behind this error, if any
    pub fn liveness(&self) -> Option<&LivenessFailure> {
        match self {
            ExecError::Liveness(failure) => Some(failure),
            _ => None,
        }
    }
}
