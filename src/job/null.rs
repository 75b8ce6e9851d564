use super::{Job, TaskOutcome};
use crate::errors::JobError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

const TASK_PAUSE: Duration = Duration::from_millis(200);

/// Touches nothing remote. Exercises the worker machinery on its own.
#[derive(Debug, Default)]
pub struct NullJob;

#[async_trait]
impl Job for NullJob {
    fn kind(&self) -> &'static str {
        "null"
    }

    async fn setup(&mut self) -> Result<(), JobError> {
        info!("Doing setup");
        Ok(())
    }

    async fn do_single_task(&mut self) -> Result<TaskOutcome, JobError> {
        info!("Doing a single task");
        tokio::time::sleep(TASK_PAUSE).await;
        Ok(TaskOutcome::Continue)
    }

    async fn teardown(&mut self) -> Result<(), JobError> {
        info!("Doing teardown");
        Ok(())
    }
}
