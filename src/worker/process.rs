use super::{StopFlag, WorkerExit, WorkerHandle, WorkerOptions, build_host, run_worker};
use crate::config::{LogOptions, RunSettings};
use crate::job::JobSpec;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info, warn};

/// Line a supervisor writes to a child's stdin to ask it to stop.
pub const STOP_LINE: &str = "stop";

/// Everything a child process needs to build and run its job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerLaunch {
    pub job: JobSpec,
    pub settings: RunSettings,
}

impl WorkerLaunch {
    /// Arguments for re-executing this binary as a worker child.
    pub fn child_args(&self) -> Result<Vec<String>> {
        let LogOptions { verbose, json } = self.settings.log;
        let mut args = Vec::new();
        if verbose {
            args.push("--verbose".to_string());
        }
        if json {
            args.push("--json-logs".to_string());
        }
        args.push("worker".to_string());
        args.push("--launch".to_string());
        args.push(serde_json::to_string(self).context("Failed to encode worker launch")?);
        Ok(args)
    }
}

/// Worker running as a child process of this binary.
pub struct ProcessWorker {
    name: String,
    child: Child,
    stdin: Option<ChildStdin>,
}

impl ProcessWorker {
    pub fn spawn(name: String, launch: &WorkerLaunch) -> Result<Self> {
        let exe = std::env::current_exe().context("Failed to locate the current executable")?;
        let mut child = Command::new(&exe)
            .args(launch.child_args()?)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start worker process {name}"))?;
        let stdin = child.stdin.take();
        info!(worker = %name, pid = ?child.id(), "Started worker process");
        Ok(Self { name, child, stdin })
    }
}

#[async_trait]
impl WorkerHandle for ProcessWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn request_stop(&mut self) {
        // Dropping stdin afterwards doubles as a stop signal through EOF.
        if let Some(mut stdin) = self.stdin.take() {
            let line = format!("{STOP_LINE}\n");
            if let Err(err) = stdin.write_all(line.as_bytes()).await {
                debug!(worker = %self.name, error = %err, "Worker stdin already closed");
            }
        }
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn join(&mut self) -> Result<()> {
        self.stdin.take();
        let status = self
            .child
            .wait()
            .await
            .with_context(|| format!("Failed to wait for worker process {}", self.name))?;
        if !status.success() {
            warn!(worker = %self.name, %status, "Worker process exited unsuccessfully");
        }
        Ok(())
    }
}

/// Turn a stop line or end-of-input on the control pipe into a stop request.
///
/// Blocks on `input`, so it runs on its own thread.
pub fn watch_parent<R: BufRead>(input: R, stop: &StopFlag) {
    for line in input.lines() {
        match line {
            Ok(line) if line.trim() == STOP_LINE => {
                debug!("Supervisor asked this worker to stop");
                stop.request_stop();
                return;
            }
            Ok(other) => debug!(line = %other, "Ignoring unknown supervisor message"),
            Err(err) => {
                warn!(error = %err, "Failed to read from supervisor");
                stop.request_stop();
                return;
            }
        }
    }
    debug!("Supervisor closed the control pipe");
    stop.request_stop();
}

/// The supervisor owns interrupt handling and forwards it as a stop request.
///
/// The handler is registered before this returns, so an early Ctrl-C cannot
/// take the default action and kill the child.
#[cfg(unix)]
fn ignore_interrupts() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::interrupt()) {
        Ok(mut interrupts) => {
            tokio::spawn(async move {
                while interrupts.recv().await.is_some() {
                    debug!("Ignoring interrupt in worker process");
                }
            });
        }
        Err(err) => warn!(error = %err, "Failed to install interrupt handler"),
    }
}

#[cfg(not(unix))]
fn ignore_interrupts() {
    tokio::spawn(async {
        while tokio::signal::ctrl_c().await.is_ok() {
            debug!("Ignoring interrupt in worker process");
        }
    });
}

/// Entry point of a worker child: run the described job until the parent says stop.
pub async fn run_child(launch: WorkerLaunch) -> WorkerExit {
    ignore_interrupts();

    let stop = Arc::new(StopFlag::new());
    // Detached: a read blocked on stdin must not hold up process exit.
    let watcher = {
        let stop = stop.clone();
        std::thread::Builder::new()
            .name("control-pipe".into())
            .spawn(move || watch_parent(std::io::stdin().lock(), &stop))
    };
    if let Err(err) = watcher {
        return WorkerExit::Crashed(format!("failed to watch the control pipe: {err}"));
    }

    let options = WorkerOptions {
        continue_on_error: launch.settings.continue_on_error,
    };
    let job = launch.job.build(build_host(&launch.settings));
    run_worker(job, &stop, options).await
}
