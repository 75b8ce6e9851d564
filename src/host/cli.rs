use super::{PrQuery, PrState, PullRequest, RemoteHost, RetryPolicy, retry};
use crate::config::HostConfig;
use crate::errors::JobError;
use crate::runner::CommandRunner;
use crate::util::remove_tree;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const MAX_CONCURRENT_DELETES: usize = 32;
const PR_JSON_FIELDS: &str = "number,title,author,state,isDraft,headRefName,baseRefName";

/// A PR as emitted by `gh pr list --json` / `gh pr view --json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhPullRequest {
    number: u64,
    title: String,
    author: GhAuthor,
    state: PrState,
    is_draft: bool,
    head_ref_name: String,
    base_ref_name: String,
}

#[derive(Debug, Deserialize)]
struct GhAuthor {
    login: String,
}

impl From<GhPullRequest> for PullRequest {
    fn from(pr: GhPullRequest) -> Self {
        PullRequest {
            number: pr.number,
            title: pr.title,
            author: pr.author.login,
            state: pr.state,
            is_draft: pr.is_draft,
            head: pr.head_ref_name,
            base: pr.base_ref_name,
        }
    }
}

/// [`RemoteHost`] backed by the `git` and `gh` command-line tools.
#[derive(Debug, Clone)]
pub struct CliHost {
    config: HostConfig,
    runner: CommandRunner,
}

impl CliHost {
    pub fn new(config: HostConfig, runner: CommandRunner) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    async fn git(&self, cwd: &Path, args: &[&str]) -> Result<String, JobError> {
        Ok(self.runner.run("git", args, Some(cwd)).await?.stdout)
    }

    async fn gh(&self, args: &[&str]) -> Result<(), JobError> {
        self.runner
            .run("gh", args, Some(&self.config.control_dir))
            .await?;
        Ok(())
    }

    /// Reset and update an existing working copy in place.
    async fn refresh_existing(&self, path: &Path, branch: &str) -> Result<(), JobError> {
        self.git(path, &["clean", "-dfx"]).await?;
        self.git(path, &["reset", "--hard"]).await?;
        self.git(path, &["pull", "origin", branch, "--ff"]).await?;
        Ok(())
    }

    async fn remove_dir(&self, path: &Path) -> Result<(), JobError> {
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || remove_tree(&owned))
            .await
            .map_err(|e| JobError::Other(anyhow::anyhow!("remove task failed: {e}")))?
            .map_err(|e| JobError::io(path, e))
    }
}

#[async_trait]
impl RemoteHost for CliHost {
    fn trunk(&self) -> &str {
        &self.config.trunk
    }

    fn control_dir(&self) -> &Path {
        &self.config.control_dir
    }

    async fn prepare_working_copy(&self, branch: &str) -> Result<PathBuf, JobError> {
        let path = self.config.working_copy_path(branch);
        info!(%branch, path = %path.display(), "Preparing working copy");

        let mut clone = true;
        if path.is_dir() {
            clone = false;
            if let Err(err) = self.refresh_existing(&path, branch).await {
                warn!(%branch, error = %err, "Failed to reset working copy, deleting it to start over");
                self.remove_dir(&path).await?;
                clone = true;
            }
        }

        if clone {
            let target = path.to_string_lossy();
            self.runner
                .run(
                    "git",
                    &["clone", "--depth", "1", self.config.clone_url.as_str(), target.as_ref()],
                    None,
                )
                .await?;
        }

        if self.git(&path, &["checkout", "-b", branch]).await.is_err() {
            self.git(&path, &["checkout", branch]).await?;
        }

        Ok(path)
    }

    async fn release_working_copy(&self, path: &Path) -> Result<(), JobError> {
        self.remove_dir(path).await
    }

    async fn current_branch(&self, cwd: &Path) -> Result<String, JobError> {
        let out = self
            .git(cwd, &["rev-parse", "--abbrev-ref", "HEAD"])
            .await?;
        Ok(out.trim().to_string())
    }

    async fn commit_file(&self, cwd: &Path, file: &Path, message: &str) -> Result<(), JobError> {
        let file = file.to_string_lossy();
        self.git(cwd, &["add", file.as_ref()]).await?;
        self.git(cwd, &["commit", "-m", message]).await?;
        Ok(())
    }

    async fn push(&self, cwd: &Path, branch: &str) -> Result<(), JobError> {
        self.git(cwd, &["push", "-u", "origin", branch]).await?;
        Ok(())
    }

    async fn pull_and_push(
        &self,
        cwd: &Path,
        branch: &str,
        ignore_pull_failure: bool,
    ) -> Result<(), JobError> {
        retry(RetryPolicy::PULL_AND_PUSH, "pull and push", || async move {
            let pulled = self
                .git(
                    cwd,
                    &["pull", "-s", "recursive", "-X", "theirs", "origin", branch],
                )
                .await;
            if let Err(err) = pulled {
                if !ignore_pull_failure {
                    return Err(err);
                }
                warn!(%branch, error = %err, "Ignoring pull failure");
            }
            self.push(cwd, branch).await
        })
        .await
    }

    async fn fetch_branch(&self, cwd: &Path, branch: &str) -> Result<(), JobError> {
        retry(RetryPolicy::FETCH, "fetch", || async move {
            self.git(cwd, &["fetch", "origin", branch]).await?;
            self.git(cwd, &["branch", branch, "FETCH_HEAD"]).await?;
            Ok(())
        })
        .await
    }

    async fn merge(&self, cwd: &Path, branch: &str) -> Result<(), JobError> {
        retry(RetryPolicy::MERGE, "merge", || async move {
            self.git(cwd, &["merge", branch, "--ff", "--no-edit"]).await?;
            Ok(())
        })
        .await
    }

    async fn list_remote_branches(&self, cwd: &Path) -> Result<Vec<String>, JobError> {
        let out = self
            .git(cwd, &["ls-remote", "--heads", "--quiet"])
            .await?;
        Ok(parse_ls_remote_heads(&out))
    }

    async fn delete_remote_branch(&self, cwd: &Path, branch: &str) -> Result<(), JobError> {
        self.git(cwd, &["push", "origin", "--delete", branch]).await?;
        Ok(())
    }

    async fn delete_remote_branches(&self, cwd: &Path, branches: &[String]) -> Result<(), JobError> {
        let deletes: Vec<_> = branches
            .iter()
            .map(|branch| self.delete_remote_branch(cwd, branch))
            .collect();
        let results: Vec<Result<(), JobError>> = stream::iter(deletes)
            .buffer_unordered(MAX_CONCURRENT_DELETES)
            .collect()
            .await;
        results.into_iter().collect()
    }

    async fn list_my_prs(&self, query: &PrQuery) -> Result<Vec<PullRequest>, JobError> {
        let control_dir = Some(self.config.control_dir.as_path());
        let raw: Vec<GhPullRequest> = match query.number {
            Some(number) => {
                let number = number.to_string();
                let pr: GhPullRequest = self
                    .runner
                    .run_json(
                        "gh",
                        &["pr", "view", number.as_str(), "--json", PR_JSON_FIELDS],
                        control_dir,
                    )
                    .await?;
                vec![pr]
            }
            None => {
                let limit = query.limit.to_string();
                let mut args = vec![
                    "pr",
                    "list",
                    "--state",
                    query.state.as_cli_arg(),
                    "--json",
                    PR_JSON_FIELDS,
                    "-L",
                    limit.as_str(),
                ];
                if let Some(head) = &query.head {
                    args.extend(["--head", head.as_str()]);
                }
                self.runner.run_json("gh", &args, control_dir).await?
            }
        };

        // `gh pr list --author` is unreliable, so filter here.
        Ok(raw
            .into_iter()
            .map(PullRequest::from)
            .filter(|pr| pr.author == self.config.author && query.matches(pr))
            .collect())
    }

    async fn create_pr(&self, head: &str) -> Result<(), JobError> {
        self.gh(&[
            "pr", "create", "--base", self.config.trunk.as_str(), "--body", "auto pr", "--title",
            "auto pr", "--head", head,
        ])
        .await
    }

    async fn merge_pr(&self, number: u64) -> Result<(), JobError> {
        let number = number.to_string();
        self.gh(&["pr", "merge", number.as_str(), "--delete-branch", "--merge"])
            .await
    }
}

/// Branch names from `git ls-remote --heads` output.
fn parse_ls_remote_heads(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().last())
        .map(|reference| {
            reference
                .strip_prefix("refs/heads/")
                .unwrap_or(reference)
                .to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ls_remote_heads() {
        let output = "\
3f1c0a\trefs/heads/master
9b2d11\trefs/heads/7f6c1d2e-0f4a-4a43-9d0c-1c2b3a4d5e6f
aa00ff\trefs/heads/feature/nested
";
        assert_eq!(
            parse_ls_remote_heads(output),
            vec![
                "master",
                "7f6c1d2e-0f4a-4a43-9d0c-1c2b3a4d5e6f",
                "feature/nested"
            ]
        );
        assert!(parse_ls_remote_heads("").is_empty());
    }

    #[test]
    fn test_gh_pull_request_json_maps_fields() {
        let json = r#"[{
            "number": 12,
            "title": "auto pr",
            "author": {"login": "csm10495", "is_bot": false},
            "state": "OPEN",
            "isDraft": false,
            "headRefName": "b1",
            "baseRefName": "master"
        }]"#;
        let raw: Vec<GhPullRequest> = serde_json::from_str(json).unwrap();
        let pr = PullRequest::from(raw.into_iter().next().unwrap());
        assert_eq!(pr.number, 12);
        assert_eq!(pr.author, "csm10495");
        assert_eq!(pr.state, PrState::Open);
        assert_eq!(pr.head, "b1");
        assert_eq!(pr.base, "master");
    }

    #[tokio::test]
    async fn test_release_working_copy_removes_directory() {
        let scratch = tempfile::tempdir().unwrap();
        let config = HostConfig {
            scratch_dir: scratch.path().to_path_buf(),
            ..Default::default()
        };
        let host = CliHost::new(config, CommandRunner::new(true));
        let copy = host.config().working_copy_path("abc-def");
        std::fs::create_dir_all(copy.join("branches")).unwrap();

        host.release_working_copy(&copy).await.unwrap();
        assert!(!copy.exists());
    }
}
