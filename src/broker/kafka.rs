//! Kafka adapter (feature `transport-kafka`), using rdkafka's `AdminClient`
//! for provisioning and one `FutureProducer` per worker.
use bytes::Bytes;
use futures::FutureExt;
use futures::channel::oneshot::Canceled;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication, TopicResult};
use rdkafka::client::DefaultClientContext;
use rdkafka::error::KafkaError;
use rdkafka::producer::future_producer::OwnedDeliveryResult;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as _};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::ClientConfig;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::broker::{Broker, BrokerAdmin, DeliveryFuture, DeliveryOutcome, Publisher};
use crate::config::{ProducerConfig, TopicSpec};
use crate::error::{BrokerError, DeliveryErrorKind, ProvisionError, SubmissionError};
use crate::provision::ProvisionOutcome;

#[derive(Clone)]
pub struct KafkaBroker {
    bootstrap: String,
}

pub async fn connect(cfg: &ProducerConfig) -> Result<Arc<dyn Broker>, BrokerError> {
    if cfg.brokers.is_empty() {
        return Err(BrokerError::Connect("no bootstrap servers configured".into()));
    }
    Ok(Arc::new(KafkaBroker {
        bootstrap: cfg.brokers.join(","),
    }))
}

#[async_trait::async_trait]
impl Broker for KafkaBroker {
    async fn admin(&self) -> Result<Box<dyn BrokerAdmin>, BrokerError> {
        let client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.bootstrap)
            .create()
            .map_err(|e| BrokerError::Client(e.to_string()))?;
        Ok(Box::new(KafkaAdmin {
            client: Arc::new(client),
        }))
    }

    async fn create_publisher(
        &self,
        cfg: &ProducerConfig,
        worker: usize,
    ) -> Result<Box<dyn Publisher>, BrokerError> {
        let mut client_config = ClientConfig::new();
        for (k, v) in cfg.client_properties(worker) {
            client_config.set(k, v);
        }
        let producer: FutureProducer = client_config
            .create()
            .map_err(|e| BrokerError::Client(e.to_string()))?;
        debug!(worker, client_id = %cfg.client_id(worker), "kafka producer created");
        Ok(Box::new(KafkaPublisher { producer }))
    }
}

struct KafkaAdmin {
    client: Arc<AdminClient<DefaultClientContext>>,
}

#[async_trait::async_trait]
impl BrokerAdmin for KafkaAdmin {
    async fn list_topic_names(&self, timeout: Duration) -> Result<BTreeSet<String>, ProvisionError> {
        let client = Arc::clone(&self.client);
        // fetch_metadata blocks the calling thread
        tokio::task::spawn_blocking(move || {
            client.inner().fetch_metadata(None, timeout).map(|metadata| {
                metadata
                    .topics()
                    .iter()
                    .map(|t| t.name().to_string())
                    .collect::<BTreeSet<_>>()
            })
        })
        .await
        .map_err(|e| ProvisionError::BrokerUnreachable(e.to_string()))?
        .map_err(provision_error)
    }

    async fn create_topic(
        &self,
        spec: &TopicSpec,
        timeout: Duration,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let topic = NewTopic::new(
            &spec.name,
            spec.partitions,
            TopicReplication::Fixed(spec.replication),
        );
        let opts = AdminOptions::new()
            .operation_timeout(Some(timeout))
            .request_timeout(Some(timeout));
        let results = self
            .client
            .create_topics(&[topic], &opts)
            .await
            .map_err(provision_error)?;
        create_outcome(&spec.name, results.into_iter().next())
    }
}

/// A create that lost the race against another provisioner still counts.
fn create_outcome(
    topic: &str,
    result: Option<TopicResult>,
) -> Result<ProvisionOutcome, ProvisionError> {
    match result {
        Some(Ok(_)) => Ok(ProvisionOutcome::Created),
        Some(Err((_, RDKafkaErrorCode::TopicAlreadyExists))) => Ok(ProvisionOutcome::AlreadyExists),
        Some(Err((name, code))) => Err(ProvisionError::CreateRejected {
            topic: name,
            reason: code.to_string(),
        }),
        None => Err(ProvisionError::CreateRejected {
            topic: topic.to_string(),
            reason: "empty response".into(),
        }),
    }
}

fn provision_error(e: KafkaError) -> ProvisionError {
    match e.rdkafka_error_code() {
        Some(RDKafkaErrorCode::OperationTimedOut) | Some(RDKafkaErrorCode::RequestTimedOut) => {
            ProvisionError::Timeout
        }
        _ => ProvisionError::BrokerUnreachable(e.to_string()),
    }
}

struct KafkaPublisher {
    producer: FutureProducer,
}

#[async_trait::async_trait]
impl Publisher for KafkaPublisher {
    fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: Bytes,
    ) -> Result<DeliveryFuture, SubmissionError> {
        let record = FutureRecord::to(topic).key(key).payload(payload.as_ref());
        let delivery = self
            .producer
            .send_result(record)
            .map_err(|(e, _)| submission_error(e))?;
        Ok(delivery.map(delivery_outcome).boxed())
    }

    async fn flush(&self, timeout: Duration) -> Result<(), SubmissionError> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| SubmissionError::ConnectionLost(e.to_string()))?
            .map_err(submission_error)
    }
}

fn delivery_outcome(res: Result<OwnedDeliveryResult, Canceled>) -> DeliveryOutcome {
    match res {
        Ok(Ok((partition, offset))) => DeliveryOutcome::Delivered { partition, offset },
        Ok(Err((e, _))) => DeliveryOutcome::Failed {
            kind: delivery_error_kind(&e),
            message: e.to_string(),
        },
        Err(Canceled) => DeliveryOutcome::Failed {
            kind: DeliveryErrorKind::Cancelled,
            message: "producer dropped before acknowledgment".into(),
        },
    }
}

fn delivery_error_kind(e: &KafkaError) -> DeliveryErrorKind {
    match e.rdkafka_error_code() {
        Some(RDKafkaErrorCode::MessageTimedOut) => DeliveryErrorKind::Timeout,
        _ => DeliveryErrorKind::BrokerRejected,
    }
}

fn submission_error(e: KafkaError) -> SubmissionError {
    match e.rdkafka_error_code() {
        Some(RDKafkaErrorCode::QueueFull) => SubmissionError::BufferFull,
        Some(RDKafkaErrorCode::MessageSizeTooLarge) | Some(RDKafkaErrorCode::InvalidMessage) => {
            SubmissionError::Rejected(e.to_string())
        }
        _ => SubmissionError::ConnectionLost(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_is_transient_backpressure() {
        let e = submission_error(KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull));
        assert_eq!(e, SubmissionError::BufferFull);
        assert!(e.is_transient());
    }

    #[test]
    fn oversized_record_is_rejected_not_transient() {
        let e = submission_error(KafkaError::MessageProduction(
            RDKafkaErrorCode::MessageSizeTooLarge,
        ));
        assert!(matches!(e, SubmissionError::Rejected(_)));
        assert!(!e.is_transient());
    }

    #[test]
    fn other_submit_failures_mean_connection_lost() {
        let e = submission_error(KafkaError::MessageProduction(
            RDKafkaErrorCode::AllBrokersDown,
        ));
        assert!(matches!(e, SubmissionError::ConnectionLost(_)));
        assert!(e.is_transient());
    }

    #[test]
    fn delivery_errors_are_classified() {
        assert_eq!(
            delivery_error_kind(&KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut)),
            DeliveryErrorKind::Timeout
        );
        assert_eq!(
            delivery_error_kind(&KafkaError::MessageProduction(
                RDKafkaErrorCode::NotEnoughReplicas
            )),
            DeliveryErrorKind::BrokerRejected
        );
    }

    #[test]
    fn acknowledgment_carries_partition_and_offset() {
        assert_eq!(
            delivery_outcome(Ok(Ok((3, 42)))),
            DeliveryOutcome::Delivered {
                partition: 3,
                offset: 42
            }
        );
    }

    #[test]
    fn dropped_producer_cancels_delivery() {
        assert!(matches!(
            delivery_outcome(Err(Canceled)),
            DeliveryOutcome::Failed {
                kind: DeliveryErrorKind::Cancelled,
                ..
            }
        ));
    }

    #[test]
    fn admin_timeouts_map_to_provision_timeout() {
        assert_eq!(
            provision_error(KafkaError::AdminOp(RDKafkaErrorCode::OperationTimedOut)),
            ProvisionError::Timeout
        );
        assert_eq!(
            provision_error(KafkaError::MetadataFetch(RDKafkaErrorCode::RequestTimedOut)),
            ProvisionError::Timeout
        );
        assert!(matches!(
            provision_error(KafkaError::MetadataFetch(RDKafkaErrorCode::AllBrokersDown)),
            ProvisionError::BrokerUnreachable(_)
        ));
    }

    #[test]
    fn lost_create_race_counts_as_already_exists() {
        let lost = Err(("txns".to_string(), RDKafkaErrorCode::TopicAlreadyExists));
        assert_eq!(
            create_outcome("txns", Some(lost)),
            Ok(ProvisionOutcome::AlreadyExists)
        );
        assert_eq!(
            create_outcome("txns", Some(Ok("txns".to_string()))),
            Ok(ProvisionOutcome::Created)
        );
    }

    #[test]
    fn refused_create_names_topic_and_reason() {
        let refused = Err((
            "txns".to_string(),
            RDKafkaErrorCode::InvalidReplicationFactor,
        ));
        match create_outcome("txns", Some(refused)) {
            Err(ProvisionError::CreateRejected { topic, .. }) => assert_eq!(topic, "txns"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            create_outcome("txns", None),
            Err(ProvisionError::CreateRejected { .. })
        ));
    }
}
