//! Per-branch commit counter persisted inside a working copy.
//!
//! Each branch owns `branches/<name>` in its working copy. The file holds a
//! single decimal integer, bumped and committed once per thrash task.

use crate::errors::JobError;
use crate::host::RemoteHost;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory inside the working copy holding one counter file per branch.
pub const TRACKING_DIR: &str = "branches";

/// A branch checked out in a local working copy, with its cached counter.
#[derive(Debug)]
pub struct Branch {
    repo_path: PathBuf,
    name: String,
    file: PathBuf,
    last_index: Option<u64>,
}

impl Branch {
    /// Attach to `name` in `repo_path`, creating the tracking directory.
    pub fn open(repo_path: impl Into<PathBuf>, name: impl Into<String>) -> Result<Self, JobError> {
        let repo_path = repo_path.into();
        let name = name.into();
        let dir = repo_path.join(TRACKING_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| JobError::io(&dir, e))?;
        let file = dir.join(&name);
        Ok(Self {
            repo_path,
            name,
            file,
            last_index: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn tracking_file(&self) -> &Path {
        &self.file
    }

    /// Read the counter from disk. A missing or unparsable file counts as 0.
    pub fn live_index(&mut self) -> u64 {
        match std::fs::read_to_string(&self.file) {
            Ok(text) => match text.trim().parse::<u64>() {
                Ok(idx) => {
                    self.last_index = Some(idx);
                    idx
                }
                Err(_) => {
                    // An empty file is what a full disk leaves behind.
                    debug!(branch = %self.name, "Tracking file is not a number, starting at 0");
                    0
                }
            },
            Err(_) => 0,
        }
    }

    /// Cached counter, falling back to the file on first use.
    pub fn index(&mut self) -> u64 {
        match self.last_index {
            Some(idx) => idx,
            None => self.live_index(),
        }
    }

    /// Write `idx` to the tracking file, then cache it.
    pub fn set_index(&mut self, idx: u64) -> Result<(), JobError> {
        std::fs::write(&self.file, idx.to_string()).map_err(|e| JobError::io(&self.file, e))?;
        self.last_index = Some(idx);
        Ok(())
    }

    /// Bump the counter and commit the tracking file. Returns the new value.
    pub async fn increment_and_commit(&mut self, host: &dyn RemoteHost) -> Result<u64, JobError> {
        let idx = self.index() + 1;
        self.set_index(idx)?;
        let message = format!("Bumping idx -> {} for {}", idx, self.name);
        host.commit_file(&self.repo_path, &self.file, &message).await?;
        Ok(idx)
    }
}
