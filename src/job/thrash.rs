use super::{Job, TaskOutcome};
use crate::branch::Branch;
use crate::errors::JobError;
use crate::host::RemoteHost;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Commits a bumped counter to a fresh random branch, over and over.
///
/// After `commits_per_branch` commits the job asks to be replaced by a new
/// instance on a new branch, which keeps each branch's history bounded.
pub struct NewBranchThrashJob {
    host: Arc<dyn RemoteHost>,
    branch_name: String,
    commits_per_branch: u64,
    commit_count: u64,
    branch: Option<Branch>,
}

impl NewBranchThrashJob {
    pub fn new(host: Arc<dyn RemoteHost>, commits_per_branch: u64) -> Self {
        Self {
            host,
            branch_name: Uuid::new_v4().to_string(),
            commits_per_branch,
            commit_count: 0,
            branch: None,
        }
    }

    pub fn branch_name(&self) -> &str {
        &self.branch_name
    }

    pub fn commit_count(&self) -> u64 {
        self.commit_count
    }

    pub fn commits_per_branch(&self) -> u64 {
        self.commits_per_branch
    }

    /// A fresh job with the same limit on a new branch.
    pub fn successor(&self) -> Self {
        Self::new(self.host.clone(), self.commits_per_branch)
    }
}

#[async_trait]
impl Job for NewBranchThrashJob {
    fn kind(&self) -> &'static str {
        "thrash"
    }

    fn describe(&self) -> String {
        format!("thrash[{}]", self.branch_name)
    }

    async fn setup(&mut self) -> Result<(), JobError> {
        info!(branch = %self.branch_name, "Creating a shallow clone");
        let path = self.host.prepare_working_copy(&self.branch_name).await?;
        self.branch = Some(Branch::open(path, self.branch_name.clone())?);
        Ok(())
    }

    async fn do_single_task(&mut self) -> Result<TaskOutcome, JobError> {
        let Some(branch) = self.branch.as_mut() else {
            return Ok(TaskOutcome::Fail(format!(
                "no working copy for {}; setup did not run",
                self.branch_name
            )));
        };
        branch.increment_and_commit(self.host.as_ref()).await?;
        self.commit_count += 1;

        if self.commit_count >= self.commits_per_branch {
            info!(branch = %self.branch_name, commits = self.commit_count, "Pushing, then starting a new branch");
            return Ok(TaskOutcome::Restart(Box::new(self.successor())));
        }
        Ok(TaskOutcome::Continue)
    }

    async fn teardown(&mut self) -> Result<(), JobError> {
        // The working copy is only given up once its commits reached the remote.
        if let Some(branch) = &self.branch {
            self.host.push(branch.repo_path(), branch.name()).await?;
        }
        let Some(branch) = self.branch.take() else {
            return Ok(());
        };
        if let Err(err) = self.host.release_working_copy(branch.repo_path()).await {
            warn!(branch = %branch.name(), error = %err, "Failed to remove working copy");
        }
        Ok(())
    }
}
