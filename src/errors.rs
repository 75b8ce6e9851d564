//! Typed error hierarchy for commitment.
//!
//! Two enums cover the two layers that can fail:
//! - `CommandError`: a single external program invocation (git, gh)
//! - `JobError`: anything a job, its working copy or the remote host reports

use thiserror::Error;

/// Errors from running an external command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {exit_code}")]
    Failed {
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("Failed to decode JSON output of `{command}`: {source}")]
    Decode {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CommandError {
    /// Raw stderr of a command that ran and exited non-zero.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            CommandError::Failed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }

    /// Raw stdout of a command that ran and exited non-zero.
    pub fn stdout(&self) -> Option<&str> {
        match self {
            CommandError::Failed { stdout, .. } => Some(stdout),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CommandError::Failed { .. })
    }
}

/// Errors surfaced by jobs and the remote host they drive.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{job}: remote reported no commits between branches, but no branch name was in scope")]
    NoCommitsWithoutBranch { job: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JobError {
    pub fn io(path: impl Into<std::path::PathBuf>, source: std::io::Error) -> Self {
        JobError::Io {
            path: path.into(),
            source,
        }
    }

    /// The underlying failed command, if this error is one.
    pub fn failed_command(&self) -> Option<&CommandError> {
        match self {
            JobError::Command(err) if err.is_failed() => Some(err),
            _ => None,
        }
    }
}
