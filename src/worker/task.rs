use super::{StopFlag, WorkerExit, WorkerHandle, WorkerOptions, run_worker};
use crate::job::Job;
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Worker running as a tokio task on the shared runtime.
pub struct TaskWorker {
    name: String,
    stop: Arc<StopFlag>,
    handle: Option<JoinHandle<WorkerExit>>,
    exit: Option<WorkerExit>,
}

impl TaskWorker {
    pub fn spawn(name: String, job: Box<dyn Job>, options: WorkerOptions) -> Self {
        let stop = Arc::new(StopFlag::new());
        let handle = {
            let stop = stop.clone();
            let span = tracing::info_span!("worker", name = %name);
            tokio::spawn(async move { run_worker(job, &stop, options).await }.instrument(span))
        };
        Self {
            name,
            stop,
            handle: Some(handle),
            exit: None,
        }
    }

    pub fn stop_flag(&self) -> &Arc<StopFlag> {
        &self.stop
    }

    /// Exit status once joined.
    pub fn exit(&self) -> Option<&WorkerExit> {
        self.exit.as_ref()
    }
}

#[async_trait]
impl WorkerHandle for TaskWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn request_stop(&mut self) {
        self.stop.request_stop();
    }

    fn is_alive(&mut self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    async fn join(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        match handle.await {
            Ok(exit) => {
                self.exit = Some(exit);
                Ok(())
            }
            Err(err) => bail!("worker {} did not finish cleanly: {err}", self.name),
        }
    }
}
