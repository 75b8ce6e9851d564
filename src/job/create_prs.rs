use super::{BackoffRequest, IDLE_BACKOFF, Job, TaskOutcome};
use crate::backoff::{GuardScope, Guarded, guard};
use crate::errors::JobError;
use crate::host::{PrQuery, RemoteHost};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Opens a PR for the first remote branch that lacks one.
pub struct PullRequestCreatorJob {
    host: Arc<dyn RemoteHost>,
}

/// What one pass over a branch did.
enum BranchStep {
    Created,
    Skipped,
}

impl PullRequestCreatorJob {
    pub fn new(host: Arc<dyn RemoteHost>) -> Self {
        Self { host }
    }

    async fn visit(&self, branch: &str) -> Result<BranchStep, JobError> {
        let host = self.host.as_ref();
        let open = host
            .list_my_prs(&PrQuery::open().limit(1).head(branch))
            .await?;
        if open.is_empty() {
            info!(%branch, "Creating PR for branch");
            host.create_pr(branch).await?;
            return Ok(BranchStep::Created);
        }

        let merged = host
            .list_my_prs(&PrQuery::merged().limit(1).head(branch))
            .await?;
        if !merged.is_empty() {
            info!(%branch, "Branch is merged but not deleted, deleting it");
            host.delete_remote_branch(host.control_dir(), branch).await?;
        }
        Ok(BranchStep::Skipped)
    }
}

#[async_trait]
impl Job for PullRequestCreatorJob {
    fn kind(&self) -> &'static str {
        "create-prs"
    }

    async fn do_single_task(&mut self) -> Result<TaskOutcome, JobError> {
        let host = self.host.as_ref();
        let trunk = host.trunk();
        let branches = host.list_remote_branches(host.control_dir()).await?;

        let mut created_pr = false;
        for branch in branches.iter().filter(|b| *b != trunk) {
            let scope = GuardScope::new(self.kind(), host).branch(branch);
            match guard(&scope, self.visit(branch)).await? {
                Guarded::Done(BranchStep::Created) => {
                    created_pr = true;
                    break;
                }
                Guarded::Backoff(req) => return Ok(TaskOutcome::Backoff(req)),
                Guarded::Done(BranchStep::Skipped) | Guarded::Swallowed => {}
            }
        }

        if created_pr {
            Ok(TaskOutcome::Continue)
        } else {
            Ok(TaskOutcome::Backoff(BackoffRequest::new(
                "No PRs to create",
                IDLE_BACKOFF,
                self.kind(),
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::PrState;
    use crate::host::fake::{FakeHost, failed};

    fn created(host: &FakeHost) -> Vec<String> {
        host.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix("create-pr ").map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn test_creates_pr_only_for_branch_without_one() {
        let host = Arc::new(FakeHost::with_branches(&["master", "b1", "b2"]));
        host.add_pr(1, "b1", PrState::Open);
        let mut job = PullRequestCreatorJob::new(host.clone());

        let outcome = job.do_single_task().await.unwrap();
        assert!(matches!(outcome, TaskOutcome::Continue));
        assert_eq!(created(&host), vec!["b2"]);
    }

    #[tokio::test]
    async fn test_stops_after_first_created_pr() {
        let host = Arc::new(FakeHost::with_branches(&["master", "b1", "b2"]));
        let mut job = PullRequestCreatorJob::new(host.clone());

        job.do_single_task().await.unwrap();
        assert_eq!(created(&host), vec!["b1"]);
    }

    #[tokio::test]
    async fn test_no_branches_backs_off() {
        let host = Arc::new(FakeHost::with_branches(&["master"]));
        let mut job = PullRequestCreatorJob::new(host.clone());

        match job.do_single_task().await.unwrap() {
            TaskOutcome::Backoff(req) => {
                assert_eq!(req.wait, IDLE_BACKOFF);
                assert_eq!(req.message, "No PRs to create");
            }
            other => panic!("Expected Backoff, got {other:?}"),
        }
        assert!(created(&host).is_empty());
    }

    #[tokio::test]
    async fn test_merged_but_undeleted_branch_is_deleted() {
        let host = Arc::new(FakeHost::with_branches(&["master", "b1"]));
        host.add_pr(1, "b1", PrState::Open);
        host.add_pr(2, "b1", PrState::Merged);
        let mut job = PullRequestCreatorJob::new(host.clone());

        let outcome = job.do_single_task().await.unwrap();
        assert!(matches!(outcome, TaskOutcome::Backoff(_)));
        assert!(host.calls().contains(&"delete b1".to_string()));
        assert_eq!(host.state().remote_branches, vec!["master"]);
    }

    #[tokio::test]
    async fn test_no_commits_failure_deletes_branch_and_continues() {
        let host = Arc::new(FakeHost::with_branches(&["master", "empty", "b2"]));
        host.fail_next(
            "create-pr empty",
            failed("GraphQL: No commits between master and empty (createPullRequest)"),
        );
        let mut job = PullRequestCreatorJob::new(host.clone());

        let outcome = job.do_single_task().await.unwrap();
        assert!(matches!(outcome, TaskOutcome::Continue));
        assert!(host.calls().contains(&"delete empty".to_string()));
        // the failed attempt is recorded, then b2 succeeds
        assert_eq!(created(&host), vec!["empty", "b2"]);
    }
}
