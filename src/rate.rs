//! Per-worker send pacing.

use std::time::Duration;
use tokio::time::sleep;

/// Fixed inter-send delay. The delay starts after a submission returns and
/// does not wait for its acknowledgment, so one worker sends at most one
/// record per interval.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    interval: Duration,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub async fn pause(&self) {
        sleep(self.interval).await;
    }

    /// Upper bound on submissions one worker can make within `window`.
    pub fn max_sends(&self, window: Duration) -> u64 {
        if self.interval.is_zero() {
            return u64::MAX;
        }
        window.as_nanos().div_ceil(self.interval.as_nanos()) as u64
    }
}
