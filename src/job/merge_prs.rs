use super::{BackoffRequest, IDLE_BACKOFF, Job, TaskOutcome};
use crate::backoff::{GuardScope, Guarded, guard};
use crate::errors::JobError;
use crate::host::{PrQuery, RemoteHost};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const VERIFY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Merges one open PR per task, waiting for the host to report it merged.
pub struct MergePullRequestsJob {
    host: Arc<dyn RemoteHost>,
    verify: bool,
}

impl MergePullRequestsJob {
    pub fn new(host: Arc<dyn RemoteHost>, verify: bool) -> Self {
        Self { host, verify }
    }

    /// Merge the oldest visible open PR. Returns whether one was merged.
    async fn merge_one(&self) -> Result<bool, JobError> {
        let host = self.host.as_ref();
        let prs = host.list_my_prs(&PrQuery::open().limit(1)).await?;
        let Some(pr) = prs.into_iter().next() else {
            return Ok(false);
        };

        info!(pr = %pr, "Merging PR");
        host.merge_pr(pr.number).await?;

        if self.verify {
            // Runs to completion once started; stop requests are not observed here.
            info!(number = pr.number, "Waiting for PR to merge");
            let query = PrQuery::open().limit(1).number(pr.number);
            while !host.list_my_prs(&query).await?.is_empty() {
                tokio::time::sleep(VERIFY_POLL_INTERVAL).await;
            }
            info!(number = pr.number, "PR merged");
        }
        Ok(true)
    }
}

#[async_trait]
impl Job for MergePullRequestsJob {
    fn kind(&self) -> &'static str {
        "merge-prs"
    }

    async fn do_single_task(&mut self) -> Result<TaskOutcome, JobError> {
        // No branch in scope, so a "no commits" failure here cannot be healed.
        let scope = GuardScope::new(self.kind(), self.host.as_ref());
        match guard(&scope, self.merge_one()).await? {
            Guarded::Done(true) => Ok(TaskOutcome::Continue),
            Guarded::Backoff(req) => Ok(TaskOutcome::Backoff(req)),
            Guarded::Done(false) | Guarded::Swallowed => Ok(TaskOutcome::Backoff(
                BackoffRequest::new("No PRs to merge", IDLE_BACKOFF, self.kind()),
            )),
        }
    }
}
