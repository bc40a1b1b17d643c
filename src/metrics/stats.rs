use hdrhistogram::Histogram;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Production counters shared by every worker and completion handler.
pub struct Stats {
    // Submit-to-ack latency (microsecond precision)
    ack_latency_hist: RwLock<Histogram<u64>>,

    // Counters
    pub submitted: RwLock<u64>,
    pub submission_errors: RwLock<u64>,
    pub delivered: RwLock<u64>,
    pub delivery_failures: RwLock<u64>,

    // Timing
    start_time: Instant,
    last_snapshot: RwLock<(Instant, u64)>,
}

impl Stats {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            // 1us to 10min range, 3 significant digits
            ack_latency_hist: RwLock::new(
                Histogram::new_with_bounds(1, 600_000_000, 3).expect("static histogram bounds"),
            ),
            submitted: RwLock::new(0),
            submission_errors: RwLock::new(0),
            delivered: RwLock::new(0),
            delivery_failures: RwLock::new(0),
            start_time: now,
            last_snapshot: RwLock::new((now, 0)),
        }
    }

    pub async fn record_submitted(&self) {
        *self.submitted.write().await += 1;
    }

    pub async fn record_submission_error(&self) {
        *self.submission_errors.write().await += 1;
    }

    /// Record an acknowledged record with its submit-to-ack latency
    pub async fn record_delivered(&self, latency: Duration) {
        *self.delivered.write().await += 1;

        // Values past the upper bound clamp to it instead of being lost.
        self.ack_latency_hist
            .write()
            .await
            .saturating_record((latency.as_micros() as u64).max(1));
    }

    pub async fn record_delivery_failure(&self) {
        *self.delivery_failures.write().await += 1;
    }

    /// Get current snapshot of statistics
    pub async fn snapshot(&self) -> StatsSnapshot {
        let now = Instant::now();
        let submitted = *self.submitted.read().await;
        let submission_errors = *self.submission_errors.read().await;
        let delivered = *self.delivered.read().await;
        let delivery_failures = *self.delivery_failures.read().await;

        let hist = self.ack_latency_hist.read().await;
        let samples = hist.len();
        let (p50, p99, max) = if hist.is_empty() {
            (0, 0, 0)
        } else {
            (
                hist.value_at_quantile(0.5),
                hist.value_at_quantile(0.99),
                hist.max(),
            )
        };
        drop(hist);

        let total = now.duration_since(self.start_time);
        let (interval, interval_submitted) = {
            let mut last = self.last_snapshot.write().await;
            let since = now.duration_since(last.0);
            let delta = submitted.saturating_sub(last.1);
            *last = (now, submitted);
            (since, delta)
        };

        StatsSnapshot {
            timestamp: chrono::Utc::now().timestamp(),
            submitted,
            submission_errors,
            delivered,
            delivery_failures,
            in_flight: submitted.saturating_sub(delivered + delivery_failures),
            avg_rate: rate(submitted, total),
            interval_rate: rate(interval_submitted, interval),
            ack_samples: samples,
            ack_us_p50: p50,
            ack_us_p99: p99,
            ack_us_max: max,
            elapsed_secs: total.as_secs_f64(),
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

fn rate(count: u64, over: Duration) -> f64 {
    let secs = over.as_secs_f64();
    if secs > 0.0 { count as f64 / secs } else { 0.0 }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub timestamp: i64,
    pub submitted: u64,
    pub submission_errors: u64,
    pub delivered: u64,
    pub delivery_failures: u64,
    pub in_flight: u64,
    pub avg_rate: f64,
    pub interval_rate: f64,
    pub ack_samples: u64,
    pub ack_us_p50: u64,
    pub ack_us_p99: u64,
    pub ack_us_max: u64,
    pub elapsed_secs: f64,
}
