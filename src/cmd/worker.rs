//! Child side of the process worker model - `commitment worker --launch`.

use anyhow::{Context, Result, bail};
use commitment::worker::{WorkerExit, WorkerLaunch, run_child};

pub async fn cmd_worker(launch: &str) -> Result<()> {
    let launch: WorkerLaunch =
        serde_json::from_str(launch).context("Failed to decode worker launch description")?;

    match run_child(launch).await {
        WorkerExit::Crashed(reason) => bail!("Worker crashed: {reason}"),
        WorkerExit::Stopped | WorkerExit::Failed(_) => Ok(()),
    }
}
