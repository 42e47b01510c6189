//! Outbound delivery pacing.
//!
//! The scheduler calls [`Pacer::pace`] before every delivery except the first of a sweep, so
//! the chat transport never sees a burst.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[async_trait]
pub trait Pacer: Send + Sync {
    /// Wait until the next send is allowed.
    async fn pace(&self);

    /// Forget the previous send so the next call returns immediately.
    async fn reset(&self) {}
}

/// Allows at most one send per `interval`.
#[derive(Debug)]
pub struct FixedIntervalPacer {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl FixedIntervalPacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl Pacer for FixedIntervalPacer {
    async fn pace(&self) {
        // Held across the sleep so concurrent callers queue up behind each other.
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            tokio::time::sleep_until(previous + self.interval).await;
        }
        *last = Some(Instant::now());
    }

    async fn reset(&self) {
        *self.last.lock().await = None;
    }
}

/// Never waits.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPacing;

#[async_trait]
impl Pacer for NoPacing {
    async fn pace(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_call_does_not_wait() {
        let pacer = FixedIntervalPacer::new(Duration::from_secs(1));
        let start = Instant::now();
        pacer.pace().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn successive_calls_are_spaced() {
        let pacer = FixedIntervalPacer::new(Duration::from_secs(1));
        let start = Instant::now();
        for _ in 0..4 {
            pacer.pace().await;
        }
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_time_counts_towards_interval() {
        let pacer = FixedIntervalPacer::new(Duration::from_secs(2));
        pacer.pace().await;
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let before = Instant::now();
        pacer.pace().await;
        assert_eq!(before.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_history() {
        let pacer = FixedIntervalPacer::new(Duration::from_secs(5));
        pacer.pace().await;
        pacer.reset().await;

        let before = Instant::now();
        pacer.pace().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }
}
