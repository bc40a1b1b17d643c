#![cfg(feature = "transport-mock")]
use txn_loadgen::broker::{Broker, BrokerAdmin, BrokerBuilder, DeliveryOutcome, Engine, Publisher};
use txn_loadgen::config::{ProducerConfig, TopicSpec};
use txn_loadgen::provision::{ProvisionOutcome, ensure_topic};

#[tokio::test]
async fn publish_mock_smoke() {
    let cfg = ProducerConfig::default();
    let b = BrokerBuilder::connect(Engine::Mock, &cfg).await.expect("connect");
    let publisher = b.create_publisher(&cfg, 0).await.expect("pub");
    let outcome = publisher
        .publish("k1", "user_1", bytes::Bytes::from_static(b"hello"))
        .expect("send")
        .await;
    assert_eq!(outcome, DeliveryOutcome::Delivered { partition: 0, offset: 0 });
}

#[tokio::test]
async fn provision_mock_smoke() {
    let cfg = ProducerConfig::default();
    let b = BrokerBuilder::connect(Engine::Mock, &cfg).await.expect("connect");
    let admin = b.admin().await.expect("admin");
    let spec = TopicSpec::default();
    let outcome = ensure_topic(admin.as_ref(), &spec, std::time::Duration::from_secs(1))
        .await
        .expect("provision");
    assert_eq!(outcome, ProvisionOutcome::Created);
    let names = admin
        .list_topic_names(std::time::Duration::from_secs(1))
        .await
        .expect("list");
    assert!(names.contains("financial_transactions"));
}
