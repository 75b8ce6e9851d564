//! Pushing and removing working copies left behind by earlier runs.

use crate::errors::JobError;
use crate::host::RemoteHost;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Tally of one cleanup pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Checkouts whose branch was pushed before removal.
    pub pushed: usize,
    /// Directories that were not git checkouts and were just deleted.
    pub removed_invalid: usize,
    pub failed: usize,
}

enum Cleaned {
    Pushed,
    RemovedInvalid,
}

/// Directories under `scratch_root` named `<prefix>*-*`.
pub fn find_orphaned_clones(scratch_root: &Path, prefix: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(scratch_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(rest) = name.to_str().and_then(|n| n.strip_prefix(prefix)) else {
            continue;
        };
        if rest.contains('-') {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

async fn clean_one(host: &dyn RemoteHost, dir: &Path) -> Result<Cleaned, JobError> {
    let branch = match host.current_branch(dir).await {
        Ok(branch) => branch,
        Err(err) => {
            info!(path = %dir.display(), error = %err, "Not a usable checkout, deleting");
            host.release_working_copy(dir).await?;
            return Ok(Cleaned::RemovedInvalid);
        }
    };

    info!(path = %dir.display(), %branch, "Pushing orphaned clone");
    if branch == host.trunk() {
        host.pull_and_push(dir, &branch, true).await?;
    } else {
        host.push(dir, &branch).await?;
    }
    host.release_working_copy(dir).await?;
    Ok(Cleaned::Pushed)
}

/// Push and delete every orphaned clone, all directories concurrently.
pub async fn clean_up_local_clones(
    host: &dyn RemoteHost,
    scratch_root: &Path,
    prefix: &str,
) -> std::io::Result<CleanupReport> {
    let dirs = find_orphaned_clones(scratch_root, prefix)?;
    info!(count = dirs.len(), root = %scratch_root.display(), "Cleaning up local clones");

    let results = join_all(dirs.iter().map(|dir| clean_one(host, dir))).await;

    let mut report = CleanupReport::default();
    for (dir, result) in dirs.iter().zip(results) {
        match result {
            Ok(Cleaned::Pushed) => report.pushed += 1,
            Ok(Cleaned::RemovedInvalid) => report.removed_invalid += 1,
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "Failed to clean up clone");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}
