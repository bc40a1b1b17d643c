//! One publish loop: generate, submit, hand the acknowledgment to a
//! completion task, sleep, repeat until cancelled.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::broker::{Broker, DeliveryFuture, DeliveryOutcome, Publisher};
use crate::config::ProducerConfig;
use crate::error::SubmissionError;
use crate::metrics::stats::Stats;
use crate::rate::Pacer;
use crate::record::{JsonEncoder, RecordEncoder, RecordGenerator};

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Observed outcome of one accepted submission.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    pub worker: usize,
    pub transaction_id: String,
    pub key: String,
    pub outcome: DeliveryOutcome,
    pub latency: Duration,
}

/// What a worker did before it was cancelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub id: usize,
    pub submitted: u64,
    pub submission_errors: u64,
    pub connect_attempts: u64,
}

pub struct PublishWorker {
    id: usize,
    broker: Arc<dyn Broker>,
    cfg: Arc<ProducerConfig>,
    topic: Arc<str>,
    pacer: Pacer,
    generator: RecordGenerator,
    encoder: Arc<dyn RecordEncoder>,
    stats: Arc<Stats>,
    reports: Option<mpsc::UnboundedSender<DeliveryReport>>,
    cancel: watch::Receiver<bool>,
    summary: WorkerSummary,
}

impl PublishWorker {
    pub fn new(
        id: usize,
        broker: Arc<dyn Broker>,
        cfg: Arc<ProducerConfig>,
        topic: Arc<str>,
        pacer: Pacer,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            broker,
            cfg,
            topic,
            pacer,
            generator: RecordGenerator::new(),
            encoder: Arc::new(JsonEncoder),
            stats: Arc::new(Stats::new()),
            reports: None,
            cancel,
            summary: WorkerSummary {
                id,
                ..Default::default()
            },
        }
    }

    pub fn with_stats(mut self, stats: Arc<Stats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn RecordEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_generator(mut self, generator: RecordGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_delivery_reports(mut self, tx: mpsc::UnboundedSender<DeliveryReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    /// Runs until the cancel signal flips (or its sender is dropped).
    /// Submission and client errors are logged and the loop carries on.
    pub async fn run(mut self) -> WorkerSummary {
        let Some(publisher) = self.connect().await else {
            return self.summary;
        };
        info!(worker = self.id, topic = %self.topic, "worker started");

        while !self.is_cancelled() {
            match self.publish_one(publisher.as_ref()).await {
                Ok(()) => self.summary.submitted += 1,
                Err(e) => {
                    self.summary.submission_errors += 1;
                    self.stats.record_submission_error().await;
                    warn!(worker = self.id, error = %e, transient = e.is_transient(), "submission failed");
                }
            }
            if !self.pause().await {
                break;
            }
        }

        if let Err(e) = publisher.flush(FLUSH_TIMEOUT).await {
            warn!(worker = self.id, error = %e, "flush on shutdown failed");
        }
        info!(
            worker = self.id,
            submitted = self.summary.submitted,
            errors = self.summary.submission_errors,
            "worker stopped"
        );
        self.summary
    }

    /// Builds this worker's own client, retrying every pacing interval.
    async fn connect(&mut self) -> Option<Box<dyn Publisher>> {
        loop {
            if self.is_cancelled() {
                return None;
            }
            self.summary.connect_attempts += 1;
            match self.broker.create_publisher(&self.cfg, self.id).await {
                Ok(p) => return Some(p),
                Err(e) => {
                    warn!(worker = self.id, error = %e, "client creation failed, retrying");
                    if !self.pause().await {
                        return None;
                    }
                }
            }
        }
    }

    async fn publish_one(&mut self, publisher: &dyn Publisher) -> Result<(), SubmissionError> {
        let record = self.generator.generate();
        let payload = self.encoder.encode(&record)?;
        let submitted_at = Instant::now();
        let delivery = publisher
            .publish(&self.topic, &record.user_id, payload)
            .inspect_err(|_| {
                debug!(worker = self.id, transaction_id = %record.transaction_id, "rejected at submit");
            })?;
        self.stats.record_submitted().await;

        self.spawn_completion(delivery, record.transaction_id, record.user_id, submitted_at);
        Ok(())
    }

    /// The completion task only logs and counts; it never feeds back into
    /// the loop and may finish after later iterations.
    fn spawn_completion(
        &self,
        delivery: DeliveryFuture,
        transaction_id: String,
        key: String,
        submitted_at: Instant,
    ) {
        let worker = self.id;
        let stats = Arc::clone(&self.stats);
        let reports = self.reports.clone();
        tokio::spawn(async move {
            let outcome = delivery.await;
            let latency = submitted_at.elapsed();
            match &outcome {
                DeliveryOutcome::Delivered { partition, offset } => {
                    debug!(worker, key = %key, transaction_id = %transaction_id, partition, offset, "delivered");
                    stats.record_delivered(latency).await;
                }
                DeliveryOutcome::Failed { kind, message } => {
                    warn!(worker, key = %key, transaction_id = %transaction_id, kind = %kind, error = %message, "delivery failed");
                    stats.record_delivery_failure().await;
                }
            }
            if let Some(tx) = reports {
                // Receiver gone means nobody is watching any more.
                let _ = tx.send(DeliveryReport {
                    worker,
                    transaction_id,
                    key,
                    outcome,
                    latency,
                });
            }
        });
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Sleeps one pacing interval. Returns false if cancelled meanwhile.
    async fn pause(&mut self) -> bool {
        tokio::select! {
            _ = self.pacer.pause() => !self.is_cancelled(),
            changed = self.cancel.changed() => changed.is_ok() && !*self.cancel.borrow(),
        }
    }
}
