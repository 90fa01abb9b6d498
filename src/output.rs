use crate::metrics::stats::StatsSnapshot;
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::Path;

pub enum OutputWriter {
    Csv(csv::Writer<File>),
    Log,
}

impl OutputWriter {
    pub fn new_csv(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
        }
        let writer = csv::Writer::from_path(path)
            .with_context(|| format!("create {}", path.display()))?;
        tracing::info!(path = %path.display(), "writing snapshots as CSV");
        Ok(Self::Csv(writer))
    }

    pub fn new_log() -> Self {
        Self::Log
    }

    pub fn write_snapshot(&mut self, snapshot: &StatsSnapshot) -> Result<()> {
        match self {
            Self::Csv(writer) => {
                writer.serialize(snapshot)?;
                // Flush so external tail/readers see progress promptly
                writer.flush()?;
            }
            Self::Log => {
                tracing::info!(
                    producers = snapshot.producers_started,
                    producer_failures = snapshot.producer_failures,
                    produced = snapshot.messages_produced,
                    send_errors = snapshot.send_errors,
                    rate_avg = format_args!("{:.2}", snapshot.total_throughput()),
                    rate_inst = format_args!("{:.2}", snapshot.interval_throughput()),
                    p99_ms = format_args!("{:.2}", snapshot.latency_ns_p99 as f64 / 1_000_000.0),
                    "load stats"
                );
            }
        }
        Ok(())
    }
}
