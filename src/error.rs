//! Error taxonomy for provisioning, submission and delivery.

use std::fmt;

/// Failure to list or create the target topic. Never fatal: the caller logs
/// it and starts producing anyway.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("timed out waiting for the broker")]
    Timeout,
    #[error("broker unreachable: {0}")]
    BrokerUnreachable(String),
    #[error("create of topic '{topic}' rejected: {reason}")]
    CreateRejected { topic: String, reason: String },
}

/// Failure to hand a record to the client. Caught at the worker loop
/// boundary; the loop continues.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("send buffer full")]
    BufferFull,
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("rejected by client: {0}")]
    Rejected(String),
}

impl SubmissionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::BufferFull | Self::ConnectionLost(_))
    }
}

/// Errors raised while building broker clients.
#[derive(thiserror::Error, Debug)]
pub enum BrokerError {
    #[error("connect: {0}")]
    Connect(String),
    #[error("client: {0}")]
    Client(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Why an accepted submission was not acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryErrorKind {
    BrokerRejected,
    Timeout,
    /// The client was dropped before the acknowledgment arrived.
    Cancelled,
}

impl fmt::Display for DeliveryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BrokerRejected => "broker_rejected",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_submission_errors() {
        assert!(SubmissionError::BufferFull.is_transient());
        assert!(SubmissionError::ConnectionLost("reset".into()).is_transient());
        assert!(!SubmissionError::Serialization("bad".into()).is_transient());
        assert!(!SubmissionError::Rejected("too large".into()).is_transient());
    }
}
