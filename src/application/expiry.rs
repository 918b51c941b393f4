use super::task::TaskSlot;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{Instant, interval_at};
use tracing::info;

const TICK: Duration = Duration::from_secs(1);

/// Once-per-second countdown bounding how long a payment may stay open.
pub struct ExpiryTimer {
    total_secs: u64,
    remaining: Arc<AtomicU64>,
    slot: TaskSlot,
}

impl ExpiryTimer {
    pub fn new(duration: Duration) -> Self {
        let total_secs = duration.as_secs();
        Self {
            total_secs,
            remaining: Arc::new(AtomicU64::new(total_secs)),
            slot: TaskSlot::new("expiry-timer"),
        }
    }

    /// Restarts the countdown from the full duration. `on_expired` runs once
    /// when it reaches zero.
    pub fn start<F, Fut>(&self, on_expired: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.slot.stop();
        self.reset();

        let remaining = Arc::clone(&self.remaining);
        info!(seconds = self.total_secs, "countdown started");
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + TICK, TICK);
            loop {
                ticker.tick().await;
                let left = remaining.load(Ordering::SeqCst).saturating_sub(1);
                remaining.store(left, Ordering::SeqCst);
                if left == 0 {
                    info!("countdown expired");
                    on_expired().await;
                    break;
                }
            }
        });
        self.slot.replace(handle);
    }

    /// Idempotent. Leaves the remaining value where it stopped.
    pub fn stop(&self) -> bool {
        self.slot.stop()
    }

    pub fn reset(&self) {
        self.remaining.store(self.total_secs, Ordering::SeqCst);
    }

    pub fn remaining(&self) -> Duration {
        Duration::from_secs(self.remaining.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_active()
    }
}
