//! Execution contexts that run one job each.
//!
//! A worker drives a [`Job`](crate::job::Job) through [`run_worker`] either as a
//! tokio task inside this process ([`TaskWorker`]) or as a child process
//! re-executing this binary ([`ProcessWorker`]). The supervisor only sees the
//! [`WorkerHandle`] trait.

mod lifecycle;
mod process;
mod stop;
mod task;

pub use lifecycle::{Lifecycle, Step, WorkerExit, WorkerOptions, run_worker};
pub use process::{ProcessWorker, WorkerLaunch, run_child};
pub use stop::{SLEEP_SLICE, StopFlag, WorkerState};
pub use task::TaskWorker;

use crate::config::{RunSettings, WorkerModel};
use crate::host::{CliHost, RemoteHost};
use crate::job::JobSpec;
use crate::runner::CommandRunner;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Supervisor-side view of a running worker.
#[async_trait]
pub trait WorkerHandle: Send {
    fn name(&self) -> &str;

    /// Ask the worker to stop after its current task. Never blocks on the task.
    async fn request_stop(&mut self);

    /// Whether the execution context is still running.
    fn is_alive(&mut self) -> bool;

    /// Wait for the execution context to finish.
    async fn join(&mut self) -> Result<()>;
}

/// Host used by jobs for the given settings.
pub fn build_host(settings: &RunSettings) -> Arc<dyn RemoteHost> {
    Arc::new(CliHost::new(
        settings.host.clone(),
        CommandRunner::new(settings.quiet),
    ))
}

/// Start a worker for `spec` under the chosen model.
pub fn start_worker(
    spec: &JobSpec,
    model: WorkerModel,
    settings: &RunSettings,
    index: usize,
) -> Result<Box<dyn WorkerHandle>> {
    let name = format!("{}-{}", spec.label(), index);
    let options = WorkerOptions {
        continue_on_error: settings.continue_on_error,
    };
    match model {
        WorkerModel::Thread => {
            let job = spec.build(build_host(settings));
            Ok(Box::new(TaskWorker::spawn(name, job, options)))
        }
        WorkerModel::Process => {
            let launch = WorkerLaunch {
                job: spec.clone(),
                settings: settings.clone(),
            };
            Ok(Box::new(ProcessWorker::spawn(name, &launch)?))
        }
    }
}
