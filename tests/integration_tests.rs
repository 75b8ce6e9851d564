//! Integration tests for the commitment binary
//!
//! These drive the real binary. Nothing here talks to a remote: runs use
//! the hidden null workers, no workers at all, or a clone URL that cannot
//! be reached.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Helper to create a commitment Command isolated from any user config
fn commitment(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("commitment");
    cmd.current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .env_remove("COMMITMENT_LOG");
    cmd
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        let dir = TempDir::new().unwrap();
        commitment(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run"));
    }

    #[test]
    fn test_version() {
        let dir = TempDir::new().unwrap();
        commitment(&dir).arg("--version").assert().success();
    }

    #[test]
    fn test_run_help_lists_flags() {
        let dir = TempDir::new().unwrap();
        commitment(&dir)
            .args(["run", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--commit-workers"))
            .stdout(predicate::str::contains("--worker-type"))
            .stdout(predicate::str::contains("--null-workers").not());
    }

    #[test]
    fn test_unknown_worker_type_fails_at_parse_time() {
        let dir = TempDir::new().unwrap();
        commitment(&dir)
            .args(["run", "--worker-type", "fiber"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("fiber"));
    }
}

// =============================================================================
// Config Tests
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_show_defaults() {
        let dir = TempDir::new().unwrap();
        commitment(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[remote]"))
            .stdout(predicate::str::contains("trunk = \"master\""));
    }

    #[test]
    fn test_show_picks_up_local_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("commitment.toml"),
            "[remote]\ntrunk = \"main\"\nauthor = \"octocat\"\n",
        )
        .unwrap();

        commitment(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("trunk = \"main\""))
            .stdout(predicate::str::contains("author = \"octocat\""));
    }

    #[test]
    fn test_show_missing_explicit_file_fails() {
        let dir = TempDir::new().unwrap();
        commitment(&dir)
            .args(["config", "show", "--config", "missing.toml"])
            .assert()
            .failure();
    }
}

// =============================================================================
// Run Tests
// =============================================================================

mod run {
    use super::*;

    #[test]
    fn test_no_workers_exits_cleanly() {
        let dir = TempDir::new().unwrap();
        commitment(&dir)
            .args(["run", "--seconds", "1"])
            .assert()
            .success()
            .stderr(predicate::str::contains("No workers were started"));
    }

    #[test]
    fn test_null_workers_as_tasks() {
        let dir = TempDir::new().unwrap();
        commitment(&dir)
            .args(["run", "--seconds", "2", "--null-workers", "2", "-t", "thread"])
            .assert()
            .success()
            .stderr(predicate::str::contains("Using worker model"))
            .stderr(predicate::str::contains("Doing a single task"))
            .stderr(predicate::str::contains("Joining all workers"))
            .stderr(predicate::str::contains("Doing teardown"));
    }

    #[test]
    fn test_null_workers_as_processes() {
        let dir = TempDir::new().unwrap();
        commitment(&dir)
            .args(["run", "--seconds", "2", "--null-workers", "1", "-t", "process"])
            .assert()
            .success()
            .stderr(predicate::str::contains("Started worker process"))
            .stderr(predicate::str::contains("Doing setup"))
            .stderr(predicate::str::contains("Joining all workers"))
            .stderr(predicate::str::contains("Doing teardown"));
    }

    #[test]
    fn test_json_logs_reach_worker_processes() {
        let dir = TempDir::new().unwrap();
        commitment(&dir)
            .args([
                "--json-logs",
                "run",
                "--seconds",
                "1",
                "--null-workers",
                "1",
            ])
            .assert()
            .success()
            .stderr(predicate::str::contains(r#""message":"Doing teardown""#));
    }

    #[test]
    fn test_declined_merge_prompt_without_tty_skips_worker() {
        let dir = TempDir::new().unwrap();
        commitment(&dir)
            .args(["run", "--seconds", "1", "--merge-branches"])
            .assert()
            .success()
            .stderr(predicate::str::contains("Not merging branches"))
            .stderr(predicate::str::contains("No workers were started"));
    }

    /// Point the thrash worker at a repository that does not exist.
    fn write_unreachable_remote(dir: &TempDir) {
        let scratch = dir.path().join("scratch");
        fs::create_dir_all(&scratch).unwrap();
        fs::write(
            dir.path().join("commitment.toml"),
            format!(
                "[remote]\nclone_url = \"/nonexistent/repo.git\"\n\n[workspace]\nscratch_dir = '{}'\n",
                scratch.display()
            ),
        )
        .unwrap();
    }

    fn assert_early_death_ends_run(model: &str) {
        let dir = TempDir::new().unwrap();
        write_unreachable_remote(&dir);

        let started = Instant::now();
        commitment(&dir)
            .args(["run", "-q", "-w", "1", "-s", "30", "-t", model])
            .timeout(Duration::from_secs(60))
            .assert()
            .success()
            .stderr(predicate::str::contains("Worker died early"))
            .stderr(predicate::str::contains("Run time elapsed").not());
        assert!(
            started.elapsed() < Duration::from_secs(15),
            "run took {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn test_crashed_worker_process_ends_run_early() {
        assert_early_death_ends_run("process");
    }

    #[test]
    fn test_crashed_worker_task_ends_run_early() {
        assert_early_death_ends_run("thread");
    }
}
