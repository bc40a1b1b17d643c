//! Fixed pool of independent publish workers.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::broker::Broker;
use crate::config::ProducerConfig;
use crate::metrics::stats::Stats;
use crate::rate::Pacer;
use crate::record::{JsonEncoder, RecordEncoder};
use crate::worker::{DeliveryReport, PublishWorker, WorkerSummary};

/// Spawns workers that share nothing mutable: each gets the read-only
/// producer config and builds its own client and random source.
pub struct WorkerPool {
    broker: Arc<dyn Broker>,
    cfg: Arc<ProducerConfig>,
    topic: Arc<str>,
    pacing: Duration,
    stats: Arc<Stats>,
    encoder: Arc<dyn RecordEncoder>,
    reports: Option<mpsc::UnboundedSender<DeliveryReport>>,
}

impl WorkerPool {
    pub fn new(broker: Arc<dyn Broker>, cfg: Arc<ProducerConfig>, topic: &str) -> Self {
        Self {
            broker,
            cfg,
            topic: Arc::from(topic),
            pacing: Duration::from_millis(100),
            stats: Arc::new(Stats::new()),
            encoder: Arc::new(JsonEncoder),
            reports: None,
        }
    }

    pub fn pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn stats(mut self, stats: Arc<Stats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn encoder(mut self, encoder: Arc<dyn RecordEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn delivery_reports(mut self, tx: mpsc::UnboundedSender<DeliveryReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    pub fn start(self, worker_count: usize) -> PoolHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let pacer = Pacer::new(self.pacing);
        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let mut worker = PublishWorker::new(
                id,
                Arc::clone(&self.broker),
                Arc::clone(&self.cfg),
                Arc::clone(&self.topic),
                pacer,
                cancel_rx.clone(),
            )
            .with_stats(Arc::clone(&self.stats))
            .with_encoder(Arc::clone(&self.encoder));
            if let Some(tx) = &self.reports {
                worker = worker.with_delivery_reports(tx.clone());
            }
            workers.push(tokio::spawn(worker.run()));
        }
        info!(
            workers = worker_count,
            topic = %self.topic,
            pacing_ms = self.pacing.as_millis() as u64,
            "worker pool started"
        );
        PoolHandle {
            cancel: cancel_tx,
            workers,
        }
    }
}

/// Bulk control over a running pool. Dropping it also stops the workers,
/// since they treat a vanished cancel sender as cancellation.
pub struct PoolHandle {
    cancel: watch::Sender<bool>,
    workers: Vec<JoinHandle<WorkerSummary>>,
}

impl PoolHandle {
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Signals every worker to stop after its current iteration.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Cancels and waits for every worker. A worker that panicked is logged
    /// and left out of the result.
    pub async fn shutdown(self) -> Vec<WorkerSummary> {
        self.cancel();
        let mut summaries = Vec::with_capacity(self.workers.len());
        for handle in self.workers {
            match handle.await {
                Ok(summary) => summaries.push(summary),
                Err(e) => error!(error = %e, "worker task failed"),
            }
        }
        summaries
    }
}
