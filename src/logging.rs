// Tracing setup
use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

/// `level` is an `EnvFilter` directive such as `info` or
/// `txn_loadgen=debug,rdkafka=warn`. `RUST_LOG` wins when set.
pub fn init(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| anyhow!("invalid log level '{level}': {e}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        // stdout carries the stats rows
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("logging already initialised: {e}"))?;
    Ok(())
}
