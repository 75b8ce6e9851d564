use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Longest uninterrupted slice of a backoff sleep.
pub const SLEEP_SLICE: Duration = Duration::from_secs(1);

const RUNNING: u8 = 0;
const STOP_REQUESTED: u8 = 1;
const STOPPED: u8 = 2;

/// Observable state of a worker's stop flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    StopRequested,
    Stopped,
}

/// Stop flag shared between a worker and whoever supervises it.
///
/// Only ever moves forward: running -> stop requested -> stopped.
#[derive(Debug, Default)]
pub struct StopFlag {
    state: AtomicU8,
    wake: Notify,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the worker to stop. Safe from any thread, any number of times.
    pub fn request_stop(&self) {
        if self
            .state
            .compare_exchange(RUNNING, STOP_REQUESTED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.wake.notify_waiters();
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.state.load(Ordering::SeqCst) != RUNNING
    }

    /// Mark the worker's execution context as finished.
    pub fn mark_stopped(&self) {
        self.state.store(STOPPED, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    pub fn state(&self) -> WorkerState {
        match self.state.load(Ordering::SeqCst) {
            RUNNING => WorkerState::Running,
            STOP_REQUESTED => WorkerState::StopRequested,
            _ => WorkerState::Stopped,
        }
    }

    /// Sleep up to `duration` in slices of at most [`SLEEP_SLICE`], returning
    /// early once a stop is requested. Returns `true` if interrupted.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stop_requested() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let slice = (deadline - now).min(SLEEP_SLICE);
            tokio::select! {
                _ = tokio::time::sleep(slice) => {}
                _ = self.wake.notified() => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_request_stop_is_idempotent_and_monotonic() {
        let flag = StopFlag::new();
        assert_eq!(flag.state(), WorkerState::Running);
        flag.request_stop();
        flag.request_stop();
        assert_eq!(flag.state(), WorkerState::StopRequested);
        flag.mark_stopped();
        flag.request_stop();
        assert_eq!(flag.state(), WorkerState::Stopped);
        assert!(flag.is_stop_requested());
    }

    #[tokio::test]
    async fn test_sleep_runs_full_duration_without_stop() {
        let flag = StopFlag::new();
        let started = std::time::Instant::now();
        assert!(!flag.sleep(Duration::from_millis(300)).await);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_stop_during_long_sleep_returns_within_a_slice() {
        let flag = Arc::new(StopFlag::new());
        let sleeper = {
            let flag = flag.clone();
            tokio::spawn(async move { flag.sleep(Duration::from_secs(30)).await })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        let requested = std::time::Instant::now();
        flag.request_stop();

        let interrupted = sleeper.await.unwrap();
        assert!(interrupted);
        assert!(requested.elapsed() <= SLEEP_SLICE);
    }

    #[tokio::test]
    async fn test_sleep_after_stop_returns_immediately() {
        let flag = StopFlag::new();
        flag.request_stop();
        let started = std::time::Instant::now();
        assert!(flag.sleep(Duration::from_secs(30)).await);
        assert!(started.elapsed() < Duration::from_millis(100));
    }
}
