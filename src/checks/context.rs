//! Per-case execution context handed to checks

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cancel::CancelFlag;
use crate::liveness::LivenessConfig;
use crate::process::SupervisedExecutor;
use crate::report::{ProfileRecord, ProfileSink};
use crate::runner::TaskDescriptor;
use crate::trace::{SpanId, Tracer};

/// What a running check may reach: the run's liveness thresholds, the
/// optional tracer, the cancel flag and the profile sink
pub struct CheckContext<'a> {
    pub liveness: &'a LivenessConfig,
    pub tracer: Option<&'a dyn Tracer>,
    /// The `check.execute` span wrapping this case, when tracing
    pub span: Option<&'a SpanId>,
    pub cancel: &'a CancelFlag,
    pub profile: &'a ProfileSink,
    /// Directory relative case paths resolve against
    pub base_dir: Option<&'a Path>,
}

impl<'a> CheckContext<'a> {
    /// Supervised executor wired to this context's tracer and cancel flag
    ///
    /// Subprocess spans carry the case's check id as their phase.
    pub fn executor<'b>(&'b self, case: &'b TaskDescriptor) -> SupervisedExecutor<'b> {
        SupervisedExecutor::new(self.liveness)
            .with_tracer(self.tracer, self.span)
            .with_cancel(self.cancel)
            .with_phase(&case.check)
    }

    /// Working directory for a case: its `cwd` resolved against the base dir
    pub fn working_dir(&self, case: &TaskDescriptor) -> Option<PathBuf> {
        match (&case.cwd, self.base_dir) {
            (Some(cwd), Some(base)) => Some(base.join(cwd)),
            (Some(cwd), None) => Some(cwd.clone()),
            (None, Some(base)) => Some(base.to_path_buf()),
            (None, None) => None,
        }
    }

    /// Resolve a case-relative path the same way as the working directory
    pub fn resolve(&self, case: &TaskDescriptor, path: &Path) -> PathBuf {
        match self.working_dir(case) {
            Some(dir) => dir.join(path),
            None => path.to_path_buf(),
        }
    }

    /// Append a profile row for `phase` of `case`
    pub fn record_phase(&self, case: &TaskDescriptor, phase: &str, duration: Duration) {
        self.profile
            .push(ProfileRecord::new(&case.id, &case.check, phase, duration));
    }
}
