//! Interrupt handling for the supervisor.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Set once the user interrupts the run. Cheap to clone and poll.
#[derive(Debug, Clone, Default)]
pub struct InterruptLatch {
    flag: Arc<AtomicBool>,
}

impl InterruptLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a Ctrl-C listener that trips this latch.
    ///
    /// Must be called from within a tokio runtime.
    pub fn hook(&self) {
        let latch = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received");
                    latch.trigger();
                }
                Err(err) => warn!(error = %err, "Failed to install Ctrl-C handler"),
            }
        });
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let latch = InterruptLatch::new();
        let other = latch.clone();
        assert!(!other.is_interrupted());
        latch.trigger();
        assert!(other.is_interrupted());
    }
}
