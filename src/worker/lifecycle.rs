use super::stop::StopFlag;
use crate::errors::JobError;
use crate::job::{BackoffRequest, Job, TaskOutcome};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::{error, info, warn};

/// Per-worker behaviour fixed at startup.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerOptions {
    /// Log unhandled task errors and keep looping instead of ending the worker.
    pub continue_on_error: bool,
}

/// What one call to [`Lifecycle::step`] did.
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    Worked,
    Backoff(BackoffRequest),
    /// The job marked itself failed; the loop should end.
    Failed,
    /// The job was torn down and replaced by a freshly set-up successor.
    Restarted,
}

/// How a worker's execution context ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    Stopped,
    Failed(String),
    Crashed(String),
}

/// Owns one job and applies its task outcomes.
pub struct Lifecycle {
    job: Box<dyn Job>,
    failure: Option<String>,
    /// A restarted job whose setup has not succeeded yet.
    pending_setup: bool,
}

impl Lifecycle {
    pub fn new(job: Box<dyn Job>) -> Self {
        Self {
            job,
            failure: None,
            pending_setup: false,
        }
    }

    pub fn job(&self) -> &dyn Job {
        self.job.as_ref()
    }

    /// Record a failure. Only the first reason is kept.
    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        if self.failure.is_none() {
            self.failure = Some(reason.into());
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub async fn setup(&mut self) -> Result<(), JobError> {
        self.job.setup().await
    }

    /// Run one task and apply its outcome.
    ///
    /// A restart whose teardown fails leaves the old job in place, so the
    /// next step retries it. A successor whose setup fails is set up again
    /// before its first task.
    pub async fn step(&mut self) -> Result<Step, JobError> {
        if self.pending_setup {
            self.job.setup().await?;
            self.pending_setup = false;
        }
        match self.job.do_single_task().await? {
            TaskOutcome::Continue => Ok(Step::Worked),
            TaskOutcome::Backoff(req) => Ok(Step::Backoff(req)),
            TaskOutcome::Fail(reason) => {
                warn!(job = %self.job.describe(), %reason, "Job marked itself failed");
                self.mark_failed(reason);
                Ok(Step::Failed)
            }
            TaskOutcome::Restart(next) => {
                info!(from = %self.job.describe(), to = %next.describe(), "Restarting job");
                self.job.teardown().await?;
                self.job = next;
                self.pending_setup = true;
                self.job.setup().await?;
                self.pending_setup = false;
                Ok(Step::Restarted)
            }
        }
    }

    pub async fn teardown(&mut self) -> Result<(), JobError> {
        self.job.teardown().await
    }
}

/// Drive `job` through its lifecycle until stopped, failed, or crashed.
///
/// Never propagates: every error and panic is logged here, and `stop` is
/// marked stopped on the way out.
pub async fn run_worker(job: Box<dyn Job>, stop: &StopFlag, options: WorkerOptions) -> WorkerExit {
    let mut lifecycle = Lifecycle::new(job);
    let name = lifecycle.job().describe();
    info!(job = %name, "Worker starting");

    let driven = AssertUnwindSafe(drive(&mut lifecycle, stop, options))
        .catch_unwind()
        .await;

    let exit = match driven {
        Ok(Ok(())) => match lifecycle.failure() {
            Some(reason) => WorkerExit::Failed(reason.to_string()),
            None => WorkerExit::Stopped,
        },
        Ok(Err(err)) => {
            error!(job = %name, error = %err, detail = ?err, "Error reached the outer boundary of the worker");
            WorkerExit::Crashed(err.to_string())
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(job = %name, %message, "Worker panicked");
            WorkerExit::Crashed(message)
        }
    };

    stop.mark_stopped();
    info!(job = %name, exit = ?exit, "Worker finished");
    exit
}

async fn drive(lifecycle: &mut Lifecycle, stop: &StopFlag, options: WorkerOptions) -> Result<(), JobError> {
    let looped = match lifecycle.setup().await {
        Ok(()) => task_loop(lifecycle, stop, options).await,
        Err(err) => Err(err),
    };

    let torn_down = lifecycle.teardown().await;
    match (looped, torn_down) {
        (Err(err), Err(teardown_err)) => {
            error!(job = %lifecycle.job().describe(), error = %teardown_err, "Teardown failed after an earlier error");
            Err(err)
        }
        (looped, torn_down) => looped.and(torn_down),
    }
}

async fn task_loop(lifecycle: &mut Lifecycle, stop: &StopFlag, options: WorkerOptions) -> Result<(), JobError> {
    while !stop.is_stop_requested() && !lifecycle.is_failed() {
        match lifecycle.step().await {
            Ok(Step::Backoff(req)) => {
                info!(backoff = %req, "Job requested backoff");
                stop.sleep(req.wait).await;
            }
            Ok(Step::Worked | Step::Restarted | Step::Failed) => {}
            Err(err) if options.continue_on_error => {
                warn!(
                    job = %lifecycle.job().describe(),
                    error = %err,
                    detail = ?err,
                    "Task raised an unhandled error; continuing because continue-on-error is set"
                );
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
