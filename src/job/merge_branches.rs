use super::{Job, TaskOutcome};
use crate::errors::JobError;
use crate::host::RemoteHost;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fast-forwards every remote branch into trunk, pushes trunk, then deletes
/// the merged branches.
pub struct MergeRemoteBranchesJob {
    host: Arc<dyn RemoteHost>,
    working_copy: Option<PathBuf>,
}

impl MergeRemoteBranchesJob {
    pub fn new(host: Arc<dyn RemoteHost>) -> Self {
        Self {
            host,
            working_copy: None,
        }
    }
}

#[async_trait]
impl Job for MergeRemoteBranchesJob {
    fn kind(&self) -> &'static str {
        "merge-branches"
    }

    async fn setup(&mut self) -> Result<(), JobError> {
        let trunk = self.host.trunk().to_string();
        info!(branch = %trunk, "Creating a shallow clone");
        self.working_copy = Some(self.host.prepare_working_copy(&trunk).await?);
        Ok(())
    }

    async fn do_single_task(&mut self) -> Result<TaskOutcome, JobError> {
        let Some(cwd) = self.working_copy.as_deref() else {
            return Ok(TaskOutcome::Fail("no trunk working copy; setup did not run".into()));
        };
        let host = self.host.as_ref();
        let trunk = host.trunk();

        let candidates: Vec<String> = host
            .list_remote_branches(cwd)
            .await?
            .into_iter()
            .filter(|b| b != trunk)
            .collect();

        if candidates.is_empty() {
            debug!("No remote branches to merge");
            return Ok(TaskOutcome::Continue);
        }

        let mut merged = Vec::new();
        for branch in candidates {
            info!(%branch, "Merging branch");
            let attempt = async {
                host.fetch_branch(cwd, &branch).await?;
                host.merge(cwd, &branch).await
            };
            match attempt.await {
                Ok(()) => merged.push(branch),
                Err(err) => warn!(
                    %branch,
                    error = %err,
                    stderr = %err.failed_command().and_then(|e| e.stderr()).unwrap_or_default().trim(),
                    "Failed to merge branch"
                ),
            }
        }

        if merged.is_empty() {
            return Ok(TaskOutcome::Continue);
        }

        info!(count = merged.len(), %trunk, "Pushing merged branches to trunk");
        host.pull_and_push(cwd, trunk, false).await?;

        info!(branches = ?merged, "Deleting merged remote branches");
        host.delete_remote_branches(cwd, &merged).await?;
        Ok(TaskOutcome::Continue)
    }

    async fn teardown(&mut self) -> Result<(), JobError> {
        let Some(cwd) = self.working_copy.take() else {
            return Ok(());
        };
        let trunk = self.host.trunk();
        if let Err(err) = self.host.push(&cwd, trunk).await {
            warn!(branch = %trunk, error = %err, "Failed to push trunk during teardown");
        }
        if let Err(err) = self.host.release_working_copy(&cwd).await {
            warn!(error = %err, "Failed to remove trunk working copy");
        }
        Ok(())
    }
}
