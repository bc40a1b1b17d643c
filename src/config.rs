//! Static configuration: producer client settings, topic spec and run options.
//!
//! Values come from built-in defaults, optionally overlaid by a YAML file,
//! then by CLI flags. Nothing here changes once the run has started.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::broker::Engine;
use crate::error::ConfigError;

/// How many replicas must confirm a write before it counts as delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Acks {
    None,
    #[default]
    Leader,
    All,
}

impl Acks {
    pub fn as_str(&self) -> &'static str {
        match self {
            Acks::None => "0",
            Acks::Leader => "1",
            Acks::All => "all",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "0" | "none" => Some(Acks::None),
            "1" | "leader" => Some(Acks::Leader),
            "all" | "-1" => Some(Acks::All),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    #[default]
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Snappy => "snappy",
            Compression::Lz4 => "lz4",
            Compression::Zstd => "zstd",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(Compression::None),
            "gzip" => Some(Compression::Gzip),
            "snappy" => Some(Compression::Snappy),
            "lz4" => Some(Compression::Lz4),
            "zstd" => Some(Compression::Zstd),
            _ => None,
        }
    }
}

/// Client settings shared read-only by every worker. Each worker still
/// builds its own client from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProducerConfig {
    pub brokers: Vec<String>,
    pub acks: Acks,
    pub linger_ms: u64,
    pub compression: Compression,
    pub batch_size_bytes: usize,
    pub buffer_bytes: usize,
    pub message_timeout_ms: u64,
    pub client_id_prefix: String,
    /// Raw client properties applied last; they win over the typed fields.
    pub extra: BTreeMap<String, String>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            brokers: vec![
                "localhost:29092".into(),
                "localhost:39092".into(),
                "localhost:49092".into(),
            ],
            acks: Acks::Leader,
            linger_ms: 10,
            compression: Compression::Gzip,
            batch_size_bytes: 1000,
            buffer_bytes: 512_000,
            message_timeout_ms: 30_000,
            client_id_prefix: "txn-loadgen".into(),
            extra: BTreeMap::new(),
        }
    }
}

impl ProducerConfig {
    pub fn linger(&self) -> Duration {
        Duration::from_millis(self.linger_ms)
    }

    pub fn client_id(&self, worker: usize) -> String {
        format!("{}-{}", self.client_id_prefix, worker)
    }

    /// librdkafka property map for one worker's producer.
    pub fn client_properties(&self, worker: usize) -> BTreeMap<String, String> {
        let mut props = BTreeMap::new();
        props.insert("bootstrap.servers".into(), self.brokers.join(","));
        props.insert("acks".into(), self.acks.as_str().into());
        props.insert("linger.ms".into(), self.linger_ms.to_string());
        props.insert("compression.type".into(), self.compression.as_str().into());
        props.insert("batch.size".into(), self.batch_size_bytes.to_string());
        props.insert(
            "queue.buffering.max.kbytes".into(),
            (self.buffer_bytes / 1024).max(1).to_string(),
        );
        props.insert("message.timeout.ms".into(), self.message_timeout_ms.to_string());
        props.insert("client.id".into(), self.client_id(worker));
        for (k, v) in &self.extra {
            props.insert(k.clone(), v.clone());
        }
        props
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.brokers.is_empty() || self.brokers.iter().any(|b| b.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "brokers",
                reason: "at least one non-empty endpoint is required".into(),
            });
        }
        if self.batch_size_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "batch_size_bytes",
                reason: "must be positive".into(),
            });
        }
        if self.buffer_bytes < self.batch_size_bytes {
            return Err(ConfigError::Invalid {
                field: "buffer_bytes",
                reason: format!(
                    "{} is smaller than one batch ({} bytes)",
                    self.buffer_bytes, self.batch_size_bytes
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: i32,
    pub replication: i32,
}

impl Default for TopicSpec {
    fn default() -> Self {
        Self {
            name: "financial_transactions".into(),
            partitions: 5,
            replication: 3,
        }
    }
}

impl TopicSpec {
    pub fn new(name: impl Into<String>, partitions: i32, replication: i32) -> Self {
        Self {
            name: name.into(),
            partitions,
            replication,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "topic.name",
                reason: "must not be empty".into(),
            });
        }
        if self.partitions < 1 {
            return Err(ConfigError::Invalid {
                field: "topic.partitions",
                reason: format!("{} < 1", self.partitions),
            });
        }
        if self.replication < 1 {
            return Err(ConfigError::Invalid {
                field: "topic.replication",
                reason: format!("{} < 1", self.replication),
            });
        }
        Ok(())
    }
}

/// Everything a run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadgenConfig {
    pub engine: Engine,
    pub producer: ProducerConfig,
    pub topic: TopicSpec,
    pub workers: usize,
    pub pacing_ms: u64,
    pub provision_timeout_ms: u64,
    /// Unset means run until interrupted.
    pub duration_secs: Option<u64>,
    pub snapshot_interval_secs: u64,
    pub csv: Option<String>,
}

impl Default for LoadgenConfig {
    fn default() -> Self {
        Self {
            engine: Engine::Kafka,
            producer: ProducerConfig::default(),
            topic: TopicSpec::default(),
            workers: 8,
            pacing_ms: 100,
            provision_timeout_ms: 10_000,
            duration_secs: None,
            snapshot_interval_secs: 1,
            csv: None,
        }
    }
}

impl LoadgenConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn provision_timeout(&self) -> Duration {
        Duration::from_millis(self.provision_timeout_ms)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.producer.validate()?;
        self.topic.validate()?;
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "workers",
                reason: "must be at least 1".into(),
            });
        }
        if self.pacing_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "pacing_ms",
                reason: "must be positive".into(),
            });
        }
        if self.snapshot_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "snapshot_interval_secs",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let cfg = LoadgenConfig::default();
        assert_eq!(cfg.workers, 8);
        assert_eq!(cfg.pacing(), Duration::from_millis(100));
        assert_eq!(cfg.topic, TopicSpec::new("financial_transactions", 5, 3));
        assert_eq!(cfg.producer.linger(), Duration::from_millis(10));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn client_properties_map_every_setting() {
        let mut producer = ProducerConfig::default();
        producer.extra.insert("linger.ms".into(), "25".into());
        let props = producer.client_properties(3);
        assert_eq!(
            props["bootstrap.servers"],
            "localhost:29092,localhost:39092,localhost:49092"
        );
        assert_eq!(props["acks"], "1");
        assert_eq!(props["compression.type"], "gzip");
        assert_eq!(props["batch.size"], "1000");
        assert_eq!(props["queue.buffering.max.kbytes"], "500");
        assert_eq!(props["client.id"], "txn-loadgen-3");
        assert_eq!(props["linger.ms"], "25");
    }

    #[test]
    fn yaml_overlays_defaults() {
        let cfg = LoadgenConfig::from_yaml_str(
            r#"
engine: mock
workers: 2
pacing_ms: 50
topic:
  name: txns
producer:
  acks: all
  compression: lz4
"#,
        )
        .unwrap();
        assert_eq!(cfg.engine, Engine::Mock);
        assert_eq!(cfg.workers, 2);
        assert_eq!(cfg.topic, TopicSpec::new("txns", 5, 3));
        assert_eq!(cfg.producer.acks, Acks::All);
        assert_eq!(cfg.producer.compression, Compression::Lz4);
        assert_eq!(cfg.producer.batch_size_bytes, 1000);
    }

    #[test]
    fn shipped_config_is_the_default_deployment() {
        let cfg = LoadgenConfig::from_yaml_str(include_str!("../configs/loadgen.yaml")).unwrap();
        assert_eq!(cfg, LoadgenConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            LoadgenConfig::from_yaml_str("wokers: 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn invalid_values_are_reported() {
        let mut cfg = LoadgenConfig::default();
        cfg.topic.partitions = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { field: "topic.partitions", .. })
        ));

        let mut cfg = LoadgenConfig::default();
        cfg.workers = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = LoadgenConfig::default();
        cfg.producer.buffer_bytes = 10;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { field: "buffer_bytes", .. })
        ));
    }

    #[test]
    fn parses_cli_spellings() {
        assert_eq!(Acks::parse("all"), Some(Acks::All));
        assert_eq!(Acks::parse("1"), Some(Acks::Leader));
        assert_eq!(Acks::parse("2"), None);
        assert_eq!(Compression::parse("ZSTD"), Some(Compression::Zstd));
        assert_eq!(Compression::parse("brotli"), None);
    }
}
