//! In-memory [`RemoteHost`] for unit tests.

use super::{PrQuery, PrState, PullRequest, RemoteHost};
use crate::errors::{CommandError, JobError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::TempDir;

/// A failed command whose stderr is `stderr`.
pub fn failed(stderr: &str) -> CommandError {
    CommandError::Failed {
        command: "fake".to_string(),
        exit_code: 1,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub remote_branches: Vec<String>,
    pub prs: Vec<PullRequest>,
    /// Every operation, in order, e.g. `"merge feature-x"`.
    pub calls: Vec<String>,
    /// `(branch, value)` for every commit, value read from the tracking file.
    pub commits: Vec<(String, u64)>,
    /// Errors returned by the next call(s) of an operation key such as `"merge feature-x"`.
    pub failures: HashMap<String, VecDeque<CommandError>>,
    /// How many times a freshly merged PR keeps showing up as open.
    pub merge_lag: u32,
    lagging: HashMap<u64, u32>,
    /// Branch reported by `current_branch`, keyed by directory.
    pub checkouts: HashMap<PathBuf, String>,
}

pub struct FakeHost {
    root: TempDir,
    state: Mutex<FakeState>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().expect("tempdir"),
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn with_branches(branches: &[&str]) -> Self {
        let host = Self::new();
        host.state().remote_branches = branches.iter().map(|b| b.to_string()).collect();
        host
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state poisoned")
    }

    pub fn fail_next(&self, key: &str, err: CommandError) {
        self.state()
            .failures
            .entry(key.to_string())
            .or_default()
            .push_back(err);
    }

    pub fn add_pr(&self, number: u64, head: &str, state: PrState) {
        self.state().prs.push(PullRequest {
            number,
            title: "auto pr".into(),
            author: "csm10495".into(),
            state,
            is_draft: false,
            head: head.into(),
            base: "master".into(),
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn commits(&self) -> Vec<(String, u64)> {
        self.state().commits.clone()
    }

    fn record(&self, call: String) -> Result<(), JobError> {
        let mut state = self.state();
        let scripted = state.failures.get_mut(&call).and_then(VecDeque::pop_front);
        state.calls.push(call);
        match scripted {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteHost for FakeHost {
    fn trunk(&self) -> &str {
        "master"
    }

    fn control_dir(&self) -> &Path {
        self.root.path()
    }

    async fn prepare_working_copy(&self, branch: &str) -> Result<PathBuf, JobError> {
        self.record(format!("prepare {branch}"))?;
        let path = self.root.path().join(format!("copy_{branch}"));
        std::fs::create_dir_all(&path).map_err(|e| JobError::io(&path, e))?;
        Ok(path)
    }

    async fn release_working_copy(&self, path: &Path) -> Result<(), JobError> {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        self.record(format!("release {}", name.unwrap_or_default()))?;
        crate::util::remove_tree(path).map_err(|e| JobError::io(path, e))
    }

    async fn current_branch(&self, cwd: &Path) -> Result<String, JobError> {
        let found = self.state().checkouts.get(cwd).cloned();
        found.ok_or_else(|| failed("fatal: not a git repository").into())
    }

    async fn commit_file(&self, _cwd: &Path, file: &Path, _message: &str) -> Result<(), JobError> {
        let branch = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.record(format!("commit {branch}"))?;
        let value = std::fs::read_to_string(file)
            .map_err(|e| JobError::io(file, e))?
            .trim()
            .parse::<u64>()
            .map_err(|e| JobError::Other(e.into()))?;
        self.state().commits.push((branch, value));
        Ok(())
    }

    async fn push(&self, _cwd: &Path, branch: &str) -> Result<(), JobError> {
        self.record(format!("push {branch}"))?;
        let mut state = self.state();
        if !state.remote_branches.iter().any(|b| b == branch) {
            state.remote_branches.push(branch.to_string());
        }
        Ok(())
    }

    async fn pull_and_push(
        &self,
        _cwd: &Path,
        branch: &str,
        _ignore_pull_failure: bool,
    ) -> Result<(), JobError> {
        self.record(format!("pull-push {branch}"))
    }

    async fn fetch_branch(&self, _cwd: &Path, branch: &str) -> Result<(), JobError> {
        self.record(format!("fetch {branch}"))
    }

    async fn merge(&self, _cwd: &Path, branch: &str) -> Result<(), JobError> {
        self.record(format!("merge {branch}"))
    }

    async fn list_remote_branches(&self, _cwd: &Path) -> Result<Vec<String>, JobError> {
        self.record("list-branches".to_string())?;
        Ok(self.state().remote_branches.clone())
    }

    async fn delete_remote_branch(&self, _cwd: &Path, branch: &str) -> Result<(), JobError> {
        self.record(format!("delete {branch}"))?;
        let mut state = self.state();
        let before = state.remote_branches.len();
        state.remote_branches.retain(|b| b != branch);
        if state.remote_branches.len() == before {
            return Err(failed(&format!(
                "error: unable to delete '{branch}': remote ref does not exist"
            ))
            .into());
        }
        Ok(())
    }

    async fn list_my_prs(&self, query: &PrQuery) -> Result<Vec<PullRequest>, JobError> {
        self.record(format!("list-prs {}", query.state.as_cli_arg()))?;
        let mut guard = self.state();
        let state = &mut *guard;

        if let Some(number) = query.number
            && query.state == PrState::Open
            && let Some(remaining) = state.lagging.get_mut(&number)
            && *remaining > 0
        {
            *remaining -= 1;
            let mut pr = state
                .prs
                .iter()
                .find(|p| p.number == number)
                .cloned()
                .expect("lagging PR exists");
            pr.state = PrState::Open;
            return Ok(vec![pr]);
        }

        Ok(state
            .prs
            .iter()
            .filter(|pr| query.matches(pr))
            .take(query.limit as usize)
            .cloned()
            .collect())
    }

    async fn create_pr(&self, head: &str) -> Result<(), JobError> {
        self.record(format!("create-pr {head}"))?;
        let number = self.state().prs.len() as u64 + 100;
        self.add_pr(number, head, PrState::Open);
        Ok(())
    }

    async fn merge_pr(&self, number: u64) -> Result<(), JobError> {
        self.record(format!("merge-pr {number}"))?;
        let mut guard = self.state();
        let state = &mut *guard;
        let lag = state.merge_lag;
        let head = match state.prs.iter_mut().find(|p| p.number == number) {
            Some(pr) => {
                pr.state = PrState::Merged;
                pr.head.clone()
            }
            None => return Err(failed("GraphQL: Could not resolve to a PullRequest").into()),
        };
        state.lagging.insert(number, lag);
        state.remote_branches.retain(|b| b != &head);
        Ok(())
    }
}
