//! In-memory broker for dry runs and tests.
//!
//! Topics, partitions and offsets live behind one mutex. Faults can be
//! injected at every seam: admin reachability, topic creation, listing
//! latency, client construction, submission and delivery.

use bytes::Bytes;
use futures::FutureExt;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::broker::{Broker, BrokerAdmin, DeliveryFuture, DeliveryOutcome, Publisher};
use crate::config::{ProducerConfig, TopicSpec};
use crate::error::{BrokerError, DeliveryErrorKind, ProvisionError, SubmissionError};
use crate::provision::ProvisionOutcome;

/// Decides whether submission number `attempt` (0-based, per worker) fails.
pub type SubmissionFault = Arc<dyn Fn(usize, u64) -> Option<SubmissionError> + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishedRecord {
    pub worker: usize,
    pub topic: String,
    pub key: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Bytes,
}

#[derive(Default)]
struct MockState {
    topics: BTreeMap<String, i32>,
    create_calls: Vec<TopicSpec>,
    list_calls: usize,
    published: Vec<PublishedRecord>,
    next_offset: HashMap<(String, i32), i64>,
    client_ids: Vec<String>,
    failed_connects: usize,
}

#[derive(Clone, Default)]
struct Faults {
    admin_unreachable: bool,
    reject_create: Option<String>,
    list_delay: Option<Duration>,
    connect_failures: usize,
    submission: Option<SubmissionFault>,
    reject_delivery: bool,
    delivery_latency: Option<Duration>,
    disable_auto_create: bool,
}

#[derive(Clone, Default)]
pub struct MockBroker {
    state: Arc<Mutex<MockState>>,
    faults: Faults,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_topic(self, name: &str, partitions: i32) -> Self {
        self.lock().topics.insert(name.to_string(), partitions);
        self
    }

    pub fn with_unreachable_admin(mut self) -> Self {
        self.faults.admin_unreachable = true;
        self
    }

    pub fn with_rejected_create(mut self, reason: &str) -> Self {
        self.faults.reject_create = Some(reason.to_string());
        self
    }

    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.faults.list_delay = Some(delay);
        self
    }

    /// The first `n` client constructions fail.
    pub fn with_connect_failures(mut self, n: usize) -> Self {
        self.faults.connect_failures = n;
        self
    }

    pub fn with_submission_fault(
        mut self,
        fault: impl Fn(usize, u64) -> Option<SubmissionError> + Send + Sync + 'static,
    ) -> Self {
        self.faults.submission = Some(Arc::new(fault));
        self
    }

    pub fn with_rejected_deliveries(mut self) -> Self {
        self.faults.reject_delivery = true;
        self
    }

    pub fn with_delivery_latency(mut self, latency: Duration) -> Self {
        self.faults.delivery_latency = Some(latency);
        self
    }

    /// Publishing to a missing topic fails delivery instead of creating it.
    pub fn without_auto_create(mut self) -> Self {
        self.faults.disable_auto_create = true;
        self
    }

    pub fn topics(&self) -> BTreeMap<String, i32> {
        self.lock().topics.clone()
    }

    pub fn create_calls(&self) -> Vec<TopicSpec> {
        self.lock().create_calls.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    pub fn published(&self) -> Vec<PublishedRecord> {
        self.lock().published.clone()
    }

    pub fn published_count(&self) -> usize {
        self.lock().published.len()
    }

    pub fn published_by(&self, worker: usize) -> usize {
        self.lock()
            .published
            .iter()
            .filter(|r| r.worker == worker)
            .count()
    }

    pub fn client_ids(&self) -> Vec<String> {
        self.lock().client_ids.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the recorded calls from the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl Broker for MockBroker {
    async fn admin(&self) -> Result<Box<dyn BrokerAdmin>, BrokerError> {
        Ok(Box::new(self.clone()))
    }

    async fn create_publisher(
        &self,
        cfg: &ProducerConfig,
        worker: usize,
    ) -> Result<Box<dyn Publisher>, BrokerError> {
        {
            let mut state = self.lock();
            if state.failed_connects < self.faults.connect_failures {
                state.failed_connects += 1;
                return Err(BrokerError::Connect(format!(
                    "mock connect failure {}",
                    state.failed_connects
                )));
            }
            state.client_ids.push(cfg.client_id(worker));
        }
        Ok(Box::new(MockPublisher {
            broker: self.clone(),
            worker,
            attempts: AtomicU64::new(0),
        }))
    }
}

#[async_trait::async_trait]
impl BrokerAdmin for MockBroker {
    async fn list_topic_names(&self, _timeout: Duration) -> Result<BTreeSet<String>, ProvisionError> {
        self.lock().list_calls += 1;
        if self.faults.admin_unreachable {
            return Err(ProvisionError::BrokerUnreachable("mock admin unreachable".into()));
        }
        // The answer reflects the moment the request arrived, not when it returns.
        let names: BTreeSet<String> = self.lock().topics.keys().cloned().collect();
        if let Some(delay) = self.faults.list_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(names)
    }

    async fn create_topic(
        &self,
        spec: &TopicSpec,
        _timeout: Duration,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        if self.faults.admin_unreachable {
            return Err(ProvisionError::BrokerUnreachable("mock admin unreachable".into()));
        }
        let mut state = self.lock();
        state.create_calls.push(spec.clone());
        if let Some(reason) = &self.faults.reject_create {
            return Err(ProvisionError::CreateRejected {
                topic: spec.name.clone(),
                reason: reason.clone(),
            });
        }
        if state.topics.contains_key(&spec.name) {
            return Ok(ProvisionOutcome::AlreadyExists);
        }
        state.topics.insert(spec.name.clone(), spec.partitions);
        Ok(ProvisionOutcome::Created)
    }
}

struct MockPublisher {
    broker: MockBroker,
    worker: usize,
    attempts: AtomicU64,
}

#[async_trait::async_trait]
impl Publisher for MockPublisher {
    fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: Bytes,
    ) -> Result<DeliveryFuture, SubmissionError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        let faults = &self.broker.faults;
        if let Some(err) = faults.submission.as_ref().and_then(|f| f(self.worker, attempt)) {
            return Err(err);
        }

        let outcome = if faults.reject_delivery {
            DeliveryOutcome::Failed {
                kind: DeliveryErrorKind::BrokerRejected,
                message: "mock broker rejected record".into(),
            }
        } else {
            self.append(topic, key, payload)
        };

        Ok(match faults.delivery_latency {
            Some(latency) => async move {
                tokio::time::sleep(latency).await;
                outcome
            }
            .boxed(),
            None => futures::future::ready(outcome).boxed(),
        })
    }
}

impl MockPublisher {
    fn append(&self, topic: &str, key: &str, payload: Bytes) -> DeliveryOutcome {
        let mut state = self.broker.lock();
        let partitions = match state.topics.get(topic) {
            Some(p) => *p,
            None if self.broker.faults.disable_auto_create => {
                return DeliveryOutcome::Failed {
                    kind: DeliveryErrorKind::BrokerRejected,
                    message: format!("unknown topic '{topic}'"),
                };
            }
            None => {
                state.topics.insert(topic.to_string(), 1);
                1
            }
        };
        let partition = partition_for(key, partitions);
        let slot = state
            .next_offset
            .entry((topic.to_string(), partition))
            .or_insert(0);
        let offset = *slot;
        *slot += 1;
        state.published.push(PublishedRecord {
            worker: self.worker,
            topic: topic.to_string(),
            key: key.to_string(),
            partition,
            offset,
            payload,
        });
        DeliveryOutcome::Delivered { partition, offset }
    }
}

/// Stable key hash (FNV-1a) so equal keys always land on one partition.
pub fn partition_for(key: &str, partitions: i32) -> i32 {
    let mut h: u32 = 0x811c_9dc5;
    for b in key.as_bytes() {
        h ^= *b as u32;
        h = h.wrapping_mul(0x0100_0193);
    }
    (h % partitions.max(1) as u32) as i32
}
