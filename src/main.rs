use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use commitment::config::WorkerModel;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

/// Environment variable holding a tracing filter directive.
const LOG_ENV: &str = "COMMITMENT_LOG";

#[derive(Parser)]
#[command(name = "commitment")]
#[command(version, about = "Generates sustained commit, branch and pull request churn against a remote repository")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Answer yes to confirmation prompts
    #[arg(long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start workers and supervise them for a bounded time
    Run(RunArgs),
    /// View configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Run a single worker (used internally by the process worker model)
    #[command(hide = true)]
    Worker {
        /// JSON description of the job and settings
        #[arg(long)]
        launch: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Number of workers committing to fresh branches
    #[arg(short = 'w', long, default_value_t = 0)]
    pub commit_workers: usize,

    /// Commits per branch before a commit worker moves to a new branch
    #[arg(short = 'c', long, default_value_t = 1000)]
    pub max_commits_per_branch: u64,

    /// Run a worker that merges remote branches into the trunk
    #[arg(long)]
    pub merge_branches: bool,

    /// Run a worker that merges open pull requests
    #[arg(long)]
    pub merge_prs: bool,

    /// Run a worker that opens pull requests for remote branches
    #[arg(long)]
    pub create_prs: bool,

    /// Push and delete working copies left over from earlier runs first
    #[arg(long)]
    pub clean: bool,

    /// Keep a worker running after an unhandled error in its job
    #[arg(long)]
    pub worker_continue_on_exception: bool,

    /// How long to run, in seconds
    #[arg(short, long, default_value_t = 60)]
    pub seconds: u64,

    /// Execution model for workers
    #[arg(short = 't', long, value_enum, default_value_t = WorkerModel::Process)]
    pub worker_type: WorkerModel,

    /// Do not echo git and gh output
    #[arg(short, long)]
    pub quiet: bool,

    /// Path to a commitment.toml
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Workers running a job that touches nothing remote
    #[arg(long, hide = true, default_value_t = 0)]
    pub null_workers: usize,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the resolved configuration
    Show {
        /// Path to a commitment.toml
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    match &cli.command {
        Commands::Run(args) => cmd::cmd_run(&cli, args).await?,
        Commands::Config { command } => cmd::cmd_config(command)?,
        Commands::Worker { launch } => cmd::cmd_worker(launch).await?,
    }

    Ok(())
}
