//! Runs a set of workers for a bounded time, then stops and joins them all.

use crate::signals::InterruptLatch;
use crate::worker::WorkerHandle;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// How often the supervisor checks the clock, the latch and worker liveness.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Why supervision ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorOutcome {
    NoWorkers,
    Elapsed,
    Interrupted,
    WorkerDied(String),
}

pub struct Supervisor {
    workers: Vec<Box<dyn WorkerHandle>>,
    run_for: Duration,
    poll_interval: Duration,
    latch: InterruptLatch,
}

impl Supervisor {
    pub fn new(workers: Vec<Box<dyn WorkerHandle>>, run_for: Duration, latch: InterruptLatch) -> Self {
        Self {
            workers,
            run_for,
            poll_interval: POLL_INTERVAL,
            latch,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Poll until the run time elapses, an interrupt arrives or a worker
    /// dies, then stop and join every worker.
    pub async fn run(mut self) -> SupervisorOutcome {
        if self.workers.is_empty() {
            info!("No workers were started");
            return SupervisorOutcome::NoWorkers;
        }

        let outcome = self.watch().await;
        match &outcome {
            SupervisorOutcome::Elapsed => info!(seconds = self.run_for.as_secs(), "Run time elapsed"),
            SupervisorOutcome::Interrupted => info!("Interrupted, shutting down"),
            SupervisorOutcome::WorkerDied(name) => warn!(worker = %name, "Worker died early, shutting down"),
            SupervisorOutcome::NoWorkers => {}
        }

        self.shutdown().await;
        outcome
    }

    async fn watch(&mut self) -> SupervisorOutcome {
        let deadline = Instant::now() + self.run_for;
        loop {
            if self.latch.is_interrupted() {
                return SupervisorOutcome::Interrupted;
            }
            if Instant::now() >= deadline {
                return SupervisorOutcome::Elapsed;
            }
            for worker in &mut self.workers {
                if !worker.is_alive() {
                    return SupervisorOutcome::WorkerDied(worker.name().to_string());
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }

    async fn shutdown(&mut self) {
        info!("Requesting all workers stop");
        for worker in &mut self.workers {
            worker.request_stop().await;
        }

        info!("Joining all workers");
        for worker in &mut self.workers {
            if let Err(err) = worker.join().await {
                error!(worker = %worker.name(), error = %err, "Failed to join worker");
            }
        }
        info!("All workers joined");
    }
}
