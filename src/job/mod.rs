//! Units of repeated work.
//!
//! A [`Job`] has a three-phase lifecycle driven by a worker:
//! `setup` once, `do_single_task` until told to stop, `teardown` once.
//! Each task reports what the worker should do next through [`TaskOutcome`].

mod create_prs;
mod merge_branches;
mod merge_prs;
mod null;
mod thrash;

pub use create_prs::PullRequestCreatorJob;
pub use merge_branches::MergeRemoteBranchesJob;
pub use merge_prs::MergePullRequestsJob;
pub use null::NullJob;
pub use thrash::NewBranchThrashJob;

use crate::errors::JobError;
use crate::host::RemoteHost;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Wait requested when there is nothing to merge or create.
pub const IDLE_BACKOFF: Duration = Duration::from_secs(30);

/// A request to pause before the next task attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffRequest {
    pub message: String,
    pub wait: Duration,
    pub job_kind: String,
}

impl BackoffRequest {
    pub fn new(message: impl Into<String>, wait: Duration, job_kind: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            wait,
            job_kind: job_kind.into(),
        }
    }
}

impl std::fmt::Display for BackoffRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} (backoff: {}s)",
            self.job_kind,
            self.message,
            self.wait.as_secs()
        )
    }
}

/// What a single task tells its worker.
pub enum TaskOutcome {
    /// Work was done; run the next task.
    Continue,
    /// Nothing to do right now; sleep, then retry.
    Backoff(BackoffRequest),
    /// The job cannot continue; the worker winds down.
    Fail(String),
    /// Tear this job down and continue with the given replacement.
    Restart(Box<dyn Job>),
}

impl std::fmt::Debug for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskOutcome::Continue => f.write_str("Continue"),
            TaskOutcome::Backoff(req) => f.debug_tuple("Backoff").field(req).finish(),
            TaskOutcome::Fail(reason) => f.debug_tuple("Fail").field(reason).finish(),
            TaskOutcome::Restart(next) => f.debug_tuple("Restart").field(&next.describe()).finish(),
        }
    }
}

/// A unit of repeated, remote-visible work.
#[async_trait]
pub trait Job: Send {
    /// Short kind name used in logs and backoff requests.
    fn kind(&self) -> &'static str;

    /// Kind plus identifying state, e.g. the branch a job works on.
    fn describe(&self) -> String {
        self.kind().to_string()
    }

    /// One-off, possibly expensive initialization.
    async fn setup(&mut self) -> Result<(), JobError> {
        Ok(())
    }

    /// Exactly one unit of work. Must be safe to call repeatedly.
    async fn do_single_task(&mut self) -> Result<TaskOutcome, JobError>;

    /// Best-effort cleanup, called once after the task loop ends.
    async fn teardown(&mut self) -> Result<(), JobError> {
        Ok(())
    }
}

/// Serializable description of a job, used to build it in any worker model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobSpec {
    Null,
    Thrash { commits_per_branch: u64 },
    MergeBranches,
    MergePrs { verify: bool },
    CreatePrs,
}

impl JobSpec {
    pub fn build(&self, host: Arc<dyn RemoteHost>) -> Box<dyn Job> {
        match self {
            JobSpec::Null => Box::new(NullJob),
            JobSpec::Thrash { commits_per_branch } => {
                Box::new(NewBranchThrashJob::new(host, *commits_per_branch))
            }
            JobSpec::MergeBranches => Box::new(MergeRemoteBranchesJob::new(host)),
            JobSpec::MergePrs { verify } => Box::new(MergePullRequestsJob::new(host, *verify)),
            JobSpec::CreatePrs => Box::new(PullRequestCreatorJob::new(host)),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobSpec::Null => "null",
            JobSpec::Thrash { .. } => "thrash",
            JobSpec::MergeBranches => "merge-branches",
            JobSpec::MergePrs { .. } => "merge-prs",
            JobSpec::CreatePrs => "create-prs",
        }
    }
}
