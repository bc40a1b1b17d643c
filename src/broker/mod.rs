//! Broker abstraction: admin and publish traits, delivery outcomes, and the
//! engine factory.

pub mod config;
#[cfg(feature = "transport-kafka")]
pub mod kafka;
#[cfg(any(test, feature = "transport-mock"))]
pub mod mock;

use bytes::Bytes;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ProducerConfig, TopicSpec};
use crate::error::{BrokerError, DeliveryErrorKind, ProvisionError, SubmissionError};
use crate::provision::ProvisionOutcome;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Kafka,
    Mock,
}

/// What the broker eventually said about one accepted submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { partition: i32, offset: i64 },
    Failed { kind: DeliveryErrorKind, message: String },
}

/// Resolves once the broker acknowledges or rejects the record.
pub type DeliveryFuture = BoxFuture<'static, DeliveryOutcome>;

#[async_trait::async_trait]
pub trait BrokerAdmin: Send + Sync {
    async fn list_topic_names(&self, timeout: Duration) -> Result<BTreeSet<String>, ProvisionError>;
    /// A create that loses a race against another provisioner reports
    /// `AlreadyExists` rather than an error.
    async fn create_topic(
        &self,
        spec: &TopicSpec,
        timeout: Duration,
    ) -> Result<ProvisionOutcome, ProvisionError>;
}

/// One worker's client handle. `publish` only enqueues; it never waits for
/// the broker.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: Bytes,
    ) -> Result<DeliveryFuture, SubmissionError>;
    /// Push out whatever is still buffered, bounded by `timeout`.
    async fn flush(&self, _timeout: Duration) -> Result<(), SubmissionError> {
        Ok(())
    }
}

#[async_trait::async_trait]
pub trait Broker: Send + Sync {
    async fn admin(&self) -> Result<Box<dyn BrokerAdmin>, BrokerError>;
    /// Builds a fresh client for `worker`. Workers never share clients, so
    /// their send buffers never contend.
    async fn create_publisher(
        &self,
        cfg: &ProducerConfig,
        worker: usize,
    ) -> Result<Box<dyn Publisher>, BrokerError>;
}

pub struct BrokerBuilder;

impl BrokerBuilder {
    pub async fn connect(
        engine: Engine,
        cfg: &ProducerConfig,
    ) -> Result<Arc<dyn Broker>, BrokerError> {
        match engine {
            Engine::Kafka => {
                #[cfg(feature = "transport-kafka")]
                {
                    return crate::broker::kafka::connect(cfg).await;
                }
                #[cfg(not(feature = "transport-kafka"))]
                {
                    let _ = cfg;
                    Err(BrokerError::Connect("kafka feature disabled".into()))
                }
            }
            Engine::Mock => {
                #[cfg(any(test, feature = "transport-mock"))]
                {
                    return Ok(Arc::new(crate::broker::mock::MockBroker::new()));
                }
                #[cfg(not(any(test, feature = "transport-mock")))]
                {
                    let _ = cfg;
                    Err(BrokerError::Connect("mock feature disabled".into()))
                }
            }
        }
    }
}
