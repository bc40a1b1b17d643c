use crate::metrics::stats::StatsSnapshot;
use anyhow::{Context, Result};
use std::fs::{self, File};
use tracing::info;

pub enum OutputWriter {
    Csv(csv::Writer<File>),
    Stdout(csv::Writer<std::io::Stdout>),
}

impl OutputWriter {
    pub fn new_csv(path: &str) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
        }
        let writer = csv::Writer::from_path(path).with_context(|| format!("open {path}"))?;
        info!(path, "writing stats snapshots as CSV");
        Ok(Self::Csv(writer))
    }

    pub fn new_stdout() -> Self {
        Self::Stdout(csv::Writer::from_writer(std::io::stdout()))
    }

    /// Header is emitted with the first row.
    pub fn write_snapshot(&mut self, snapshot: &StatsSnapshot) -> Result<()> {
        match self {
            Self::Csv(w) => {
                w.serialize(snapshot)?;
                // Flush so external tail/readers see progress promptly
                w.flush()?;
            }
            Self::Stdout(w) => {
                w.serialize(snapshot)?;
                w.flush()?;
            }
        }
        Ok(())
    }
}
