//! Remote repository client.
//!
//! [`RemoteHost`] is the seam between jobs and the remote git host. The
//! production implementation is [`CliHost`], which shells out to `git` and
//! `gh`; tests use an in-memory fake.

mod cli;
#[cfg(test)]
pub(crate) mod fake;
mod retry;

pub use cli::CliHost;
pub use retry::{RetryPolicy, retry};

use crate::errors::JobError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// State filter for pull request queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

impl PrState {
    /// Value accepted by `gh pr list --state`.
    pub fn as_cli_arg(&self) -> &'static str {
        match self {
            PrState::Open => "open",
            PrState::Closed => "closed",
            PrState::Merged => "merged",
        }
    }
}

/// Read-only view of a pull request on the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub author: String,
    pub state: PrState,
    pub is_draft: bool,
    pub head: String,
    pub base: String,
}

impl std::fmt::Display for PullRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {} ({} -> {})", self.number, self.title, self.head, self.base)
    }
}

/// Filter for [`RemoteHost::list_my_prs`]. Results are always limited to the
/// configured author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrQuery {
    pub state: PrState,
    pub limit: u32,
    pub head: Option<String>,
    pub number: Option<u64>,
}

impl PrQuery {
    pub fn new(state: PrState) -> Self {
        Self {
            state,
            limit: 10,
            head: None,
            number: None,
        }
    }

    pub fn open() -> Self {
        Self::new(PrState::Open)
    }

    pub fn merged() -> Self {
        Self::new(PrState::Merged)
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Restrict to PRs whose head is `branch`. Clears any number filter.
    pub fn head(mut self, branch: impl Into<String>) -> Self {
        self.head = Some(branch.into());
        self.number = None;
        self
    }

    /// Restrict to a single PR number. Clears any head filter.
    pub fn number(mut self, number: u64) -> Self {
        self.number = Some(number);
        self.head = None;
        self
    }

    pub fn matches(&self, pr: &PullRequest) -> bool {
        pr.state == self.state
            && self.head.as_ref().is_none_or(|h| &pr.head == h)
            && self.number.is_none_or(|n| pr.number == n)
    }
}

/// Branch and pull request operations against the remote repository.
///
/// Methods taking `cwd` run inside that working copy.
#[async_trait]
pub trait RemoteHost: Send + Sync {
    /// Name of the trunk branch.
    fn trunk(&self) -> &str;

    /// Checkout used for operations that are not tied to a job's working copy.
    fn control_dir(&self) -> &Path;

    /// Acquire a working copy checked out on `branch`, creating the branch locally if needed.
    async fn prepare_working_copy(&self, branch: &str) -> Result<PathBuf, JobError>;

    /// Delete a working copy from disk.
    async fn release_working_copy(&self, path: &Path) -> Result<(), JobError>;

    /// Branch currently checked out in `cwd`.
    async fn current_branch(&self, cwd: &Path) -> Result<String, JobError>;

    /// Stage `file` and commit it with `message`.
    async fn commit_file(&self, cwd: &Path, file: &Path, message: &str) -> Result<(), JobError>;

    async fn push(&self, cwd: &Path, branch: &str) -> Result<(), JobError>;

    /// Pull `branch` (preferring remote changes on conflict) and push it back.
    async fn pull_and_push(
        &self,
        cwd: &Path,
        branch: &str,
        ignore_pull_failure: bool,
    ) -> Result<(), JobError>;

    /// Fetch `branch` from the remote into a local branch of the same name.
    async fn fetch_branch(&self, cwd: &Path, branch: &str) -> Result<(), JobError>;

    /// Fast-forward merge `branch` into the current branch.
    async fn merge(&self, cwd: &Path, branch: &str) -> Result<(), JobError>;

    async fn list_remote_branches(&self, cwd: &Path) -> Result<Vec<String>, JobError>;

    async fn delete_remote_branch(&self, cwd: &Path, branch: &str) -> Result<(), JobError>;

    async fn delete_remote_branches(&self, cwd: &Path, branches: &[String]) -> Result<(), JobError> {
        for branch in branches {
            self.delete_remote_branch(cwd, branch).await?;
        }
        Ok(())
    }

    async fn list_my_prs(&self, query: &PrQuery) -> Result<Vec<PullRequest>, JobError>;

    /// Open a PR from `head` into trunk.
    async fn create_pr(&self, head: &str) -> Result<(), JobError>;

    /// Merge PR `number` and delete its branch.
    async fn merge_pr(&self, number: u64) -> Result<(), JobError>;
}
