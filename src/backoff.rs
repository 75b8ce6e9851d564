//! Classification of failed remote operations.
//!
//! [`guard`] wraps one remote call site. When the call fails with a
//! [`CommandError::Failed`], its raw stderr is classified and the failure is
//! either healed, swallowed, or turned into a [`BackoffRequest`]. Anything
//! else propagates unchanged.

use crate::errors::{CommandError, JobError};
use crate::host::RemoteHost;
use crate::job::BackoffRequest;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

pub const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(60);
pub const UNCLASSIFIED_BACKOFF: Duration = Duration::from_secs(5);

/// How a failed remote operation should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The head branch has nothing to merge; delete it.
    NothingToMerge,
    /// A known host-side flake; log and move on.
    RemoteFlake(&'static str),
    RateLimited,
    Unclassified,
}

/// Classify the raw stderr of a failed remote command.
pub fn classify(stderr: &str) -> Verdict {
    if stderr.contains("No commits between") {
        Verdict::NothingToMerge
    } else if stderr.contains("502") && stderr.contains("bug") {
        Verdict::RemoteFlake("unexpected 502 from the host, not a rate limit")
    } else if stderr.contains("the merge commit cannot be cleanly created") {
        Verdict::RemoteFlake("host cannot create the merge commit yet, likely lag after a previous merge")
    } else if stderr.contains("API rate limit exceeded") {
        Verdict::RateLimited
    } else {
        Verdict::Unclassified
    }
}

/// Result of a guarded remote call.
#[derive(Debug)]
pub enum Guarded<T> {
    Done(T),
    /// The failure was recognised and absorbed.
    Swallowed,
    Backoff(BackoffRequest),
}

/// Context a guarded call site carries for classification.
pub struct GuardScope<'a> {
    pub job_kind: &'static str,
    pub host: &'a dyn RemoteHost,
    /// Working directory for compensating remote operations.
    pub cwd: &'a Path,
    /// Branch the call concerns, if any. Needed to heal "no commits" failures.
    pub branch: Option<&'a str>,
}

impl<'a> GuardScope<'a> {
    pub fn new(job_kind: &'static str, host: &'a dyn RemoteHost) -> Self {
        Self {
            job_kind,
            host,
            cwd: host.control_dir(),
            branch: None,
        }
    }

    pub fn branch(mut self, branch: &'a str) -> Self {
        self.branch = Some(branch);
        self
    }
}

/// Run `op` and classify a failed-command error while it is still in scope.
pub async fn guard<T, Fut>(scope: &GuardScope<'_>, op: Fut) -> Result<Guarded<T>, JobError>
where
    Fut: Future<Output = Result<T, JobError>>,
{
    match op.await {
        Ok(value) => Ok(Guarded::Done(value)),
        Err(JobError::Command(err @ CommandError::Failed { .. })) => resolve(scope, err).await,
        Err(other) => Err(other),
    }
}

async fn resolve<T>(scope: &GuardScope<'_>, err: CommandError) -> Result<Guarded<T>, JobError> {
    let job = scope.job_kind;
    let stderr = err.stderr().unwrap_or_default();

    match classify(stderr) {
        Verdict::NothingToMerge => {
            let Some(branch) = scope.branch else {
                return Err(JobError::NoCommitsWithoutBranch { job: job.to_string() });
            };
            info!(%job, %branch, "No commits between trunk and branch, deleting the branch");
            delete_pointless_branch(scope, branch).await?;
            Ok(Guarded::Swallowed)
        }
        Verdict::RemoteFlake(reason) => {
            warn!(%job, reason, stderr = %stderr.trim(), "Ignoring known remote flake");
            Ok(Guarded::Swallowed)
        }
        Verdict::RateLimited => Ok(Guarded::Backoff(BackoffRequest::new(
            format!("GH API rate limit exceeded: {job}"),
            RATE_LIMIT_BACKOFF,
            job,
        ))),
        Verdict::Unclassified => {
            error!(
                %job,
                error = %err,
                stdout = %err.stdout().unwrap_or_default().trim(),
                stderr = %stderr.trim(),
                "Unclassified remote failure"
            );
            Ok(Guarded::Backoff(BackoffRequest::new(
                format!("Unknown error: {err}"),
                UNCLASSIFIED_BACKOFF,
                job,
            )))
        }
    }
}

/// Delete `branch` remotely; a failed delete is fine if the branch is already gone.
async fn delete_pointless_branch(scope: &GuardScope<'_>, branch: &str) -> Result<(), JobError> {
    let Err(delete_err) = scope.host.delete_remote_branch(scope.cwd, branch).await else {
        return Ok(());
    };

    let remaining = scope.host.list_remote_branches(scope.cwd).await?;
    if remaining.iter().any(|b| b == branch) {
        error!(job = %scope.job_kind, %branch, error = %delete_err, "Failed to delete branch and it still exists");
        return Err(delete_err);
    }
    info!(job = %scope.job_kind, %branch, "Failed to delete branch, but it is already gone");
    Ok(())
}
