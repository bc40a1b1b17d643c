//! Idempotent topic provisioning.
//!
//! List-then-create is not atomic: two instances starting together can both
//! see the topic missing. The loser's create comes back as "already exists"
//! and is reported as such.

use std::time::Duration;
use tracing::{error, info};

use crate::broker::BrokerAdmin;
use crate::config::TopicSpec;
use crate::error::ProvisionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Created,
    AlreadyExists,
}

/// Creates `spec.name` with the configured partition and replication counts
/// unless the broker already lists it.
pub async fn ensure_topic(
    admin: &dyn BrokerAdmin,
    spec: &TopicSpec,
    timeout: Duration,
) -> Result<ProvisionOutcome, ProvisionError> {
    let existing = tokio::time::timeout(timeout, admin.list_topic_names(timeout))
        .await
        .map_err(|_| ProvisionError::Timeout)??;

    if existing.contains(&spec.name) {
        return Ok(ProvisionOutcome::AlreadyExists);
    }
    admin.create_topic(spec, timeout).await
}

/// Runs [`ensure_topic`] and logs the result. Failure is not fatal:
/// production goes ahead assuming the topic exists or will be auto-created.
pub async fn provision_or_continue(
    admin: &dyn BrokerAdmin,
    spec: &TopicSpec,
    timeout: Duration,
) -> Option<ProvisionOutcome> {
    match ensure_topic(admin, spec, timeout).await {
        Ok(ProvisionOutcome::Created) => {
            info!(
                topic = %spec.name,
                partitions = spec.partitions,
                replication = spec.replication,
                "topic created"
            );
            Some(ProvisionOutcome::Created)
        }
        Ok(ProvisionOutcome::AlreadyExists) => {
            info!(topic = %spec.name, "topic already exists");
            Some(ProvisionOutcome::AlreadyExists)
        }
        Err(e) => {
            error!(topic = %spec.name, error = %e, "failed to provision topic, producing anyway");
            None
        }
    }
}
