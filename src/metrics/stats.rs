use hdrhistogram::Histogram;
use prometheus::{IntCounter, Registry};
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(thiserror::Error, Debug)]
pub enum StatsError {
    #[error("register counter: {0}")]
    Register(#[from] prometheus::Error),
    #[error("latency histogram: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),
}

/// Counters shared by every publish loop of a run.
///
/// The counters are registered in the registry passed to [`Stats::new`], so the
/// metrics endpoint and the snapshot writer read the same values.
pub struct Stats {
    // Send-to-ack latency (nanosecond precision)
    latency_hist: RwLock<Histogram<u64>>,

    pub messages_produced: IntCounter,
    pub producers_started: IntCounter,
    pub send_errors: IntCounter,
    pub producer_failures: IntCounter,

    start_time: Instant,
    last_snapshot: RwLock<(Instant, u64)>,
}

impl Stats {
    pub fn new(registry: &Registry) -> Result<Self, StatsError> {
        let messages_produced = IntCounter::new(
            "loadgen_messages_produced_total",
            "Messages acknowledged by the broker",
        )?;
        let producers_started = IntCounter::new(
            "loadgen_producers_started_total",
            "Producers created successfully",
        )?;
        let send_errors = IntCounter::new("loadgen_send_errors_total", "Failed message sends")?;
        let producer_failures = IntCounter::new(
            "loadgen_producer_failures_total",
            "Producer creations that failed",
        )?;
        for c in [&messages_produced, &producers_started, &send_errors, &producer_failures] {
            registry.register(Box::new(c.clone()))?;
        }

        let now = Instant::now();
        Ok(Self {
            // 1ns to 60s range, 3 significant digits
            latency_hist: RwLock::new(Histogram::new_with_bounds(1, 60_000_000_000, 3)?),
            messages_produced,
            producers_started,
            send_errors,
            producer_failures,
            start_time: now,
            last_snapshot: RwLock::new((now, 0)),
        })
    }

    /// Record an acknowledged message and its send latency
    pub async fn record_sent(&self, latency: Duration) {
        self.messages_produced.inc();
        // Skip the sample rather than stall a publish loop on a busy histogram
        if let Ok(mut hist) = self.latency_hist.try_write() {
            let _ = hist.record((latency.as_nanos() as u64).max(1));
        }
    }

    pub fn record_send_error(&self) {
        self.send_errors.inc();
    }

    pub fn record_producer_started(&self) {
        self.producers_started.inc();
    }

    pub fn record_producer_failure(&self) {
        self.producer_failures.inc();
    }

    /// Get current snapshot of statistics
    pub async fn snapshot(&self) -> StatsSnapshot {
        let now = Instant::now();
        let produced = self.messages_produced.get();

        let (p50, p99, max) = {
            let hist = self.latency_hist.read().await;
            (hist.value_at_quantile(0.5), hist.value_at_quantile(0.99), hist.max())
        };

        let (interval_duration, interval_produced) = {
            let mut last = self.last_snapshot.write().await;
            let (at, count) = *last;
            *last = (now, produced);
            (now.duration_since(at), produced.saturating_sub(count))
        };

        StatsSnapshot {
            timestamp: chrono::Utc::now().timestamp(),
            producers_started: self.producers_started.get(),
            producer_failures: self.producer_failures.get(),
            messages_produced: produced,
            send_errors: self.send_errors.get(),
            total_duration: now.duration_since(self.start_time),
            interval_duration,
            interval_produced,
            latency_ns_p50: p50,
            latency_ns_p99: p99,
            latency_ns_max: max,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub timestamp: i64,
    pub producers_started: u64,
    pub producer_failures: u64,
    pub messages_produced: u64,
    pub send_errors: u64,
    #[serde(skip)]
    pub total_duration: Duration,
    #[serde(skip)]
    pub interval_duration: Duration,
    pub interval_produced: u64,
    pub latency_ns_p50: u64,
    pub latency_ns_p99: u64,
    pub latency_ns_max: u64,
}

impl StatsSnapshot {
    /// Messages per second since the previous snapshot
    pub fn interval_throughput(&self) -> f64 {
        let secs = self.interval_duration.as_secs_f64();
        if secs > 0.0 {
            self.interval_produced as f64 / secs
        } else {
            0.0
        }
    }

    /// Messages per second since the run started
    pub fn total_throughput(&self) -> f64 {
        let secs = self.total_duration.as_secs_f64();
        if secs > 0.0 {
            self.messages_produced as f64 / secs
        } else {
            0.0
        }
    }
}
