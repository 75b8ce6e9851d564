use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File looked up in the current directory when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = "commitment.toml";

const DEFAULT_CLONE_URL: &str = "git@github.com:csm10495/commit-ment.git";
const DEFAULT_AUTHOR: &str = "csm10495";
const DEFAULT_TRUNK: &str = "master";
const DEFAULT_CLONE_PREFIX: &str = "commit-ment_";

/// Where the remote lives and where local working copies go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Clone URL of the remote repository.
    pub clone_url: String,
    /// Only pull requests authored by this login are acted on.
    pub author: String,
    /// The trunk branch other branches merge into.
    pub trunk: String,
    /// Directory-name prefix of every working copy in `scratch_dir`.
    pub clone_prefix: String,
    /// Checkout used for PR operations and remote branch listing.
    pub control_dir: PathBuf,
    /// Parent directory of per-job working copies.
    pub scratch_dir: PathBuf,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            clone_url: DEFAULT_CLONE_URL.to_string(),
            author: DEFAULT_AUTHOR.to_string(),
            trunk: DEFAULT_TRUNK.to_string(),
            clone_prefix: DEFAULT_CLONE_PREFIX.to_string(),
            control_dir: PathBuf::from("."),
            scratch_dir: std::env::temp_dir(),
        }
    }
}

/// Raw TOML structure for `commitment.toml`
#[derive(Debug, Serialize, Deserialize)]
struct HostToml {
    remote: Option<RemoteSection>,
    workspace: Option<WorkspaceSection>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RemoteSection {
    clone_url: Option<String>,
    author: Option<String>,
    trunk: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WorkspaceSection {
    clone_prefix: Option<String>,
    control_dir: Option<PathBuf>,
    scratch_dir: Option<PathBuf>,
}

impl HostConfig {
    /// Resolve the host configuration.
    ///
    /// An explicit path must exist. Otherwise `./commitment.toml` and then
    /// `<config dir>/commitment/config.toml` are tried, falling back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_file(path);
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Self::load_file(&local);
        }

        if let Some(user) = dirs::config_dir().map(|d| d.join("commitment").join("config.toml"))
            && user.is_file()
        {
            return Self::load_file(&user);
        }

        Ok(Self::default())
    }

    /// Load from a specific TOML file; keys missing from the file keep their defaults.
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let toml: HostToml = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        let mut config = Self::default();
        if let Some(remote) = toml.remote {
            if let Some(clone_url) = remote.clone_url {
                config.clone_url = clone_url;
            }
            if let Some(author) = remote.author {
                config.author = author;
            }
            if let Some(trunk) = remote.trunk {
                config.trunk = trunk;
            }
        }
        if let Some(workspace) = toml.workspace {
            if let Some(prefix) = workspace.clone_prefix {
                config.clone_prefix = prefix;
            }
            if let Some(control_dir) = workspace.control_dir {
                config.control_dir = control_dir;
            }
            if let Some(scratch_dir) = workspace.scratch_dir {
                config.scratch_dir = scratch_dir;
            }
        }

        Ok(config)
    }

    /// Render in the same `[remote]` / `[workspace]` layout that [`Self::load_file`] reads.
    pub fn to_toml(&self) -> Result<String> {
        let toml = HostToml {
            remote: Some(RemoteSection {
                clone_url: Some(self.clone_url.clone()),
                author: Some(self.author.clone()),
                trunk: Some(self.trunk.clone()),
            }),
            workspace: Some(WorkspaceSection {
                clone_prefix: Some(self.clone_prefix.clone()),
                control_dir: Some(self.control_dir.clone()),
                scratch_dir: Some(self.scratch_dir.clone()),
            }),
        };
        toml::to_string_pretty(&toml).context("Failed to render configuration")
    }

    /// Path of the working copy for `branch`.
    pub fn working_copy_path(&self, branch: &str) -> PathBuf {
        self.scratch_dir
            .join(format!("{}{}", self.clone_prefix, branch))
    }
}

/// How the main process should configure logging, repeated for child workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogOptions {
    pub verbose: bool,
    pub json: bool,
}

/// Settings fixed at startup and threaded into every worker and job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    pub host: HostConfig,
    /// Do not echo subprocess output.
    pub quiet: bool,
    /// Keep a worker's task loop running after an unhandled job error.
    pub continue_on_error: bool,
    pub log: LogOptions,
}

/// Execution model for workers, chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WorkerModel {
    /// Tokio tasks on the multi-threaded runtime of this process.
    Thread,
    /// One child process per worker.
    #[default]
    Process,
}

impl WorkerModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerModel::Thread => "thread",
            WorkerModel::Process => "process",
        }
    }
}

impl std::fmt::Display for WorkerModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
