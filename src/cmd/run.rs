//! Supervised run - `commitment run`.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{error, info};

use super::super::{Cli, RunArgs};
use commitment::cleanup::clean_up_local_clones;
use commitment::config::{HostConfig, LogOptions, RunSettings};
use commitment::job::JobSpec;
use commitment::signals::InterruptLatch;
use commitment::supervisor::Supervisor;
use commitment::worker::{WorkerHandle, build_host, start_worker};

/// Jobs to run, in start order. `confirm_merge` is only asked when the
/// branch-merging worker was requested.
pub fn job_specs(args: &RunArgs, confirm_merge: impl FnOnce() -> bool) -> Vec<JobSpec> {
    let mut specs = Vec::new();
    specs.extend(std::iter::repeat_n(JobSpec::Null, args.null_workers));
    specs.extend(std::iter::repeat_n(
        JobSpec::Thrash {
            commits_per_branch: args.max_commits_per_branch,
        },
        args.commit_workers,
    ));
    if args.merge_branches {
        if confirm_merge() {
            specs.push(JobSpec::MergeBranches);
        } else {
            info!("Not merging branches");
        }
    }
    if args.merge_prs {
        specs.push(JobSpec::MergePrs { verify: true });
    }
    if args.create_prs {
        specs.push(JobSpec::CreatePrs);
    }
    specs
}

fn confirm_merge_branches(yes: bool) -> bool {
    use dialoguer::Confirm;

    if yes {
        return true;
    }
    Confirm::new()
        .with_prompt("Merging branches pushes straight to the trunk of the remote. Continue?")
        .default(false)
        .interact()
        .unwrap_or(false)
}

pub async fn cmd_run(cli: &Cli, args: &RunArgs) -> Result<()> {
    let host = HostConfig::load(args.config.as_deref())?;
    let settings = RunSettings {
        host,
        quiet: args.quiet,
        continue_on_error: args.worker_continue_on_exception,
        log: LogOptions {
            verbose: cli.verbose,
            json: cli.json_logs,
        },
    };

    if args.clean {
        let host = build_host(&settings);
        let report = clean_up_local_clones(
            host.as_ref(),
            &settings.host.scratch_dir,
            &settings.host.clone_prefix,
        )
        .await
        .with_context(|| {
            format!(
                "Failed to scan {} for old clones",
                settings.host.scratch_dir.display()
            )
        })?;
        info!(
            pushed = report.pushed,
            removed_invalid = report.removed_invalid,
            failed = report.failed,
            "Finished cleaning up local clones"
        );
    }

    let specs = job_specs(args, || confirm_merge_branches(cli.yes));

    info!(model = %args.worker_type, "Using worker model");
    let latch = InterruptLatch::new();
    latch.hook();

    let mut workers: Vec<Box<dyn WorkerHandle>> = Vec::with_capacity(specs.len());
    for (index, spec) in specs.iter().enumerate() {
        match start_worker(spec, args.worker_type, &settings, index) {
            Ok(worker) => {
                info!(worker = %worker.name(), "Started worker");
                workers.push(worker);
            }
            Err(err) => error!(job = spec.label(), error = %format!("{err:#}"), "Failed to start worker"),
        }
    }

    let outcome = Supervisor::new(workers, Duration::from_secs(args.seconds), latch)
        .run()
        .await;
    info!(outcome = ?outcome, "Run finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["commitment", "run"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            crate::Commands::Run(args) => args,
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_defaults() {
        let args = run_args(&[]);
        assert_eq!(args.seconds, 60);
        assert_eq!(args.max_commits_per_branch, 1000);
        assert_eq!(args.worker_type, commitment::config::WorkerModel::Process);
        assert!(job_specs(&args, || true).is_empty());
    }

    #[test]
    fn test_specs_follow_flags() {
        let args = run_args(&["-w", "2", "-c", "5", "--merge-prs", "--create-prs"]);
        let specs = job_specs(&args, || unreachable!("merge-branches not requested"));
        assert_eq!(
            specs,
            vec![
                JobSpec::Thrash {
                    commits_per_branch: 5
                },
                JobSpec::Thrash {
                    commits_per_branch: 5
                },
                JobSpec::MergePrs { verify: true },
                JobSpec::CreatePrs,
            ]
        );
    }

    #[test]
    fn test_declined_merge_skips_only_that_worker() {
        let args = run_args(&["--merge-branches", "--create-prs"]);
        assert_eq!(job_specs(&args, || false), vec![JobSpec::CreatePrs]);
        assert_eq!(
            job_specs(&args, || true),
            vec![JobSpec::MergeBranches, JobSpec::CreatePrs]
        );
    }

    #[test]
    fn test_yes_skips_prompt() {
        assert!(confirm_merge_branches(true));
    }
}
