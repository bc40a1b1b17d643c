use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info};
use txn_loadgen::broker::config::{parse_client_kv, parse_engine};
use txn_loadgen::broker::{Broker, BrokerBuilder};
use txn_loadgen::config::{Acks, Compression, LoadgenConfig};
use txn_loadgen::logging;
use txn_loadgen::metrics::stats::Stats;
use txn_loadgen::output::OutputWriter;
use txn_loadgen::pool::WorkerPool;
use txn_loadgen::provision::{ensure_topic, provision_or_continue};

#[derive(Parser)]
#[command(name = "txn-loadgen")]
#[command(about = "Synthetic financial-transaction load generator")]
struct Cli {
    /// Log level (EnvFilter directive)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// YAML configuration file; flags below override it
    #[arg(long)]
    config: Option<String>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the topic, then publish until Ctrl+C or --duration
    Run,
    /// Only make sure the topic exists
    Provision,
}

#[derive(Args, Default)]
struct Overrides {
    /// Broker engine (kafka|mock)
    #[arg(long)]
    engine: Option<String>,

    /// Bootstrap endpoints; repeat or comma-separate
    #[arg(long, value_delimiter = ',')]
    brokers: Vec<String>,

    /// Topic name
    #[arg(long)]
    topic: Option<String>,

    /// Partition count used when creating the topic
    #[arg(long)]
    partitions: Option<i32>,

    /// Replication factor used when creating the topic
    #[arg(long)]
    replication: Option<i32>,

    /// Number of publish workers
    #[arg(long)]
    workers: Option<usize>,

    /// Delay after each submission, per worker (ms)
    #[arg(long)]
    pacing_ms: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<u64>,

    /// Acknowledgment mode (0|1|all)
    #[arg(long)]
    acks: Option<String>,

    /// Batch linger (ms)
    #[arg(long)]
    linger_ms: Option<u64>,

    /// Compression (none|gzip|snappy|lz4|zstd)
    #[arg(long)]
    compression: Option<String>,

    /// Maximum batch size in bytes
    #[arg(long)]
    batch_size: Option<usize>,

    /// Client send-buffer size in bytes
    #[arg(long)]
    buffer_bytes: Option<usize>,

    /// Extra client properties as key=value
    #[arg(long = "client-prop")]
    client_props: Vec<String>,

    /// Topic provisioning timeout (ms)
    #[arg(long)]
    provision_timeout_ms: Option<u64>,

    /// Snapshot interval in seconds for periodic stats output
    #[arg(long)]
    snapshot_interval: Option<u64>,

    /// Optional CSV output file path (stdout if omitted)
    #[arg(long)]
    csv: Option<String>,
}

impl Overrides {
    fn apply(self, cfg: &mut LoadgenConfig) -> Result<()> {
        if let Some(e) = self.engine {
            cfg.engine = parse_engine(&e).ok_or_else(|| anyhow!("unknown engine '{e}'"))?;
        }
        if !self.brokers.is_empty() {
            cfg.producer.brokers = self.brokers;
        }
        if let Some(t) = self.topic {
            cfg.topic.name = t;
        }
        if let Some(p) = self.partitions {
            cfg.topic.partitions = p;
        }
        if let Some(r) = self.replication {
            cfg.topic.replication = r;
        }
        if let Some(w) = self.workers {
            cfg.workers = w;
        }
        if let Some(p) = self.pacing_ms {
            cfg.pacing_ms = p;
        }
        if let Some(d) = self.duration {
            cfg.duration_secs = Some(d);
        }
        if let Some(a) = self.acks {
            cfg.producer.acks = Acks::parse(&a).ok_or_else(|| anyhow!("unknown acks '{a}'"))?;
        }
        if let Some(l) = self.linger_ms {
            cfg.producer.linger_ms = l;
        }
        if let Some(c) = self.compression {
            cfg.producer.compression =
                Compression::parse(&c).ok_or_else(|| anyhow!("unknown compression '{c}'"))?;
        }
        if let Some(b) = self.batch_size {
            cfg.producer.batch_size_bytes = b;
        }
        if let Some(b) = self.buffer_bytes {
            cfg.producer.buffer_bytes = b;
        }
        cfg.producer.extra.extend(parse_client_kv(&self.client_props));
        if let Some(t) = self.provision_timeout_ms {
            cfg.provision_timeout_ms = t;
        }
        if let Some(s) = self.snapshot_interval {
            cfg.snapshot_interval_secs = s;
        }
        if self.csv.is_some() {
            cfg.csv = self.csv;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    logging::init(&cli.log_level)?;

    let mut cfg = match &cli.config {
        Some(path) => LoadgenConfig::from_yaml_file(path).with_context(|| format!("load {path}"))?,
        None => LoadgenConfig::default(),
    };
    cli.overrides.apply(&mut cfg)?;
    cfg.validate().context("invalid configuration")?;

    let broker = BrokerBuilder::connect(cfg.engine, &cfg.producer)
        .await
        .context("broker connect")?;
    info!(
        engine = ?cfg.engine,
        brokers = %cfg.producer.brokers.join(","),
        topic = %cfg.topic.name,
        "txn-loadgen starting"
    );

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Provision => {
            let admin = broker.admin().await.context("admin client")?;
            let outcome = ensure_topic(admin.as_ref(), &cfg.topic, cfg.provision_timeout()).await?;
            info!(topic = %cfg.topic.name, ?outcome, "provisioning done");
            Ok(())
        }
        Commands::Run => run(cfg, broker).await,
    }
}

async fn run(cfg: LoadgenConfig, broker: Arc<dyn Broker>) -> Result<()> {
    // Provisioning finishes (or fails) before any worker publishes.
    match broker.admin().await {
        Ok(admin) => {
            provision_or_continue(admin.as_ref(), &cfg.topic, cfg.provision_timeout()).await;
        }
        Err(e) => error!(error = %e, "admin client unavailable, skipping provisioning"),
    }

    let stats = Arc::new(Stats::new());
    let output = Arc::new(Mutex::new(match &cfg.csv {
        Some(path) => OutputWriter::new_csv(path)?,
        None => OutputWriter::new_stdout(),
    }));

    let snapshot_stats = Arc::clone(&stats);
    let snapshot_output = Arc::clone(&output);
    let snapshot_every = Duration::from_secs(cfg.snapshot_interval_secs);
    let snapshot_handle = tokio::spawn(async move {
        let mut t = tokio::time::interval(snapshot_every);
        // First tick completes immediately
        t.tick().await;
        loop {
            t.tick().await;
            let snap = snapshot_stats.snapshot().await;
            if let Err(e) = snapshot_output.lock().await.write_snapshot(&snap) {
                error!(error = %e, "stats snapshot write failed");
            }
        }
    });

    let pool = WorkerPool::new(broker, Arc::new(cfg.producer.clone()), &cfg.topic.name)
        .pacing(cfg.pacing())
        .stats(Arc::clone(&stats))
        .start(cfg.workers);

    // Wait for either the duration limit or Ctrl+C
    match cfg.duration() {
        Some(limit) => tokio::select! {
            _ = tokio::time::sleep(limit) => info!("duration limit reached, stopping workers"),
            _ = tokio::signal::ctrl_c() => info!("Ctrl+C received, stopping workers"),
        },
        None => {
            tokio::signal::ctrl_c().await.context("listen for Ctrl+C")?;
            info!("Ctrl+C received, stopping workers");
        }
    }

    let summaries = pool.shutdown().await;
    snapshot_handle.abort();

    let final_stats = stats.snapshot().await;
    output.lock().await.write_snapshot(&final_stats)?;

    for s in &summaries {
        info!(
            worker = s.id,
            submitted = s.submitted,
            errors = s.submission_errors,
            "worker summary"
        );
    }
    info!(
        submitted = final_stats.submitted,
        delivered = final_stats.delivered,
        submission_errors = final_stats.submission_errors,
        delivery_failures = final_stats.delivery_failures,
        avg_rate = final_stats.avg_rate,
        elapsed_secs = final_stats.elapsed_secs,
        "final statistics"
    );
    Ok(())
}
