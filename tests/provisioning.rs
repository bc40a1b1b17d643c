#![cfg(feature = "transport-mock")]
use std::time::Duration;
use txn_loadgen::broker::mock::MockBroker;
use txn_loadgen::config::TopicSpec;
use txn_loadgen::error::ProvisionError;
use txn_loadgen::provision::{ProvisionOutcome, ensure_topic, provision_or_continue};

const TIMEOUT: Duration = Duration::from_secs(10);

fn spec() -> TopicSpec {
    TopicSpec::new("financial_transactions", 5, 3)
}

#[tokio::test]
async fn absent_topic_is_created_with_configured_layout() {
    let broker = MockBroker::new();
    let outcome = ensure_topic(&broker, &spec(), TIMEOUT).await;
    assert_eq!(outcome, Ok(ProvisionOutcome::Created));
    assert_eq!(broker.create_calls(), vec![spec()]);
    assert_eq!(broker.topics().get("financial_transactions"), Some(&5));
}

#[tokio::test]
async fn second_call_reports_already_exists() {
    let broker = MockBroker::new();
    assert_eq!(ensure_topic(&broker, &spec(), TIMEOUT).await, Ok(ProvisionOutcome::Created));
    assert_eq!(
        ensure_topic(&broker, &spec(), TIMEOUT).await,
        Ok(ProvisionOutcome::AlreadyExists)
    );
    assert_eq!(broker.create_calls().len(), 1);
    assert_eq!(broker.list_calls(), 2);
}

#[tokio::test]
async fn existing_topic_is_left_alone() {
    let broker = MockBroker::new().with_topic("financial_transactions", 12);
    assert_eq!(
        ensure_topic(&broker, &spec(), TIMEOUT).await,
        Ok(ProvisionOutcome::AlreadyExists)
    );
    assert!(broker.create_calls().is_empty());
    assert_eq!(broker.topics().get("financial_transactions"), Some(&12));
}

#[tokio::test(start_paused = true)]
async fn slow_listing_times_out_without_creating() {
    let broker = MockBroker::new().with_list_delay(Duration::from_secs(60));
    let outcome = ensure_topic(&broker, &spec(), Duration::from_secs(10)).await;
    assert_eq!(outcome, Err(ProvisionError::Timeout));
    assert!(broker.create_calls().is_empty());
}

#[tokio::test]
async fn unreachable_broker_is_not_fatal() {
    let broker = MockBroker::new().with_unreachable_admin();
    assert!(matches!(
        ensure_topic(&broker, &spec(), TIMEOUT).await,
        Err(ProvisionError::BrokerUnreachable(_))
    ));
    assert_eq!(provision_or_continue(&broker, &spec(), TIMEOUT).await, None);
}

#[tokio::test]
async fn rejected_create_is_reported() {
    let broker = MockBroker::new().with_rejected_create("replication factor larger than brokers");
    let outcome = ensure_topic(&broker, &spec(), TIMEOUT).await;
    assert_eq!(
        outcome,
        Err(ProvisionError::CreateRejected {
            topic: "financial_transactions".into(),
            reason: "replication factor larger than brokers".into(),
        })
    );
    assert_eq!(provision_or_continue(&broker, &spec(), TIMEOUT).await, None);
}

#[tokio::test(start_paused = true)]
async fn concurrent_provisioners_race_but_both_succeed() {
    // Both list before either creates.
    let broker = MockBroker::new().with_list_delay(Duration::from_millis(10));
    let s = spec();
    let (a, b) = tokio::join!(
        ensure_topic(&broker, &s, TIMEOUT),
        ensure_topic(&broker, &s, TIMEOUT)
    );
    let mut outcomes = vec![a.unwrap(), b.unwrap()];
    outcomes.sort_by_key(|o| *o == ProvisionOutcome::AlreadyExists);
    assert_eq!(
        outcomes,
        vec![ProvisionOutcome::Created, ProvisionOutcome::AlreadyExists]
    );
    assert_eq!(broker.create_calls().len(), 2);
}
