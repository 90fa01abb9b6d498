use crate::client::BrokerClient;
use crate::config::Config;
use crate::metrics::stats::Stats;
use crate::roles::publisher::{PublisherConfig, PublisherExit, run_publisher};
use crate::topic::load_topic;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Multi-topic fanout driver (single process)
/// Drives `producers_per_topic × topics` logical producers over the topics
/// `{tenant}/{namespace}/topic-{t}`, launching them one `startup_interval` apart.
#[derive(Clone, Debug)]
pub struct FanoutConfig {
    pub tenant: String,
    pub namespace: String,
    pub topics: u32,
    pub producers_per_topic: u32,
    pub message_interval: Duration,
    pub startup_interval: Duration,
}

impl FanoutConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            tenant: cfg.tenant.clone(),
            namespace: cfg.namespace.clone(),
            topics: cfg.num_topics,
            producers_per_topic: cfg.num_producers_per_topic,
            message_interval: cfg.message_interval(),
            startup_interval: cfg.producer_start_interval(),
        }
    }
}

/// One cell of the producer grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProducerSlot {
    /// `slot * topics + topic_index`, unique across the run
    pub index: u32,
    pub topic_index: u32,
    pub topic: String,
}

/// Launch order: producer slot outer, topic inner, so every topic gets its first
/// producer before any topic gets a second.
pub fn plan(config: &FanoutConfig) -> Vec<ProducerSlot> {
    let mut slots =
        Vec::with_capacity(config.topics as usize * config.producers_per_topic as usize);
    for tp in 0..config.producers_per_topic {
        for t in 0..config.topics {
            slots.push(ProducerSlot {
                index: tp * config.topics + t,
                topic_index: t,
                topic: load_topic(&config.tenant, &config.namespace, t),
            });
        }
    }
    slots
}

/// Running publish loops of one fanout.
pub struct Fanout {
    handles: Vec<JoinHandle<PublisherExit>>,
}

impl Fanout {
    pub fn launched(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every loop to end. Call after cancelling the token the loops were started with.
    pub async fn drain(self) -> Vec<PublisherExit> {
        let mut exits = Vec::with_capacity(self.handles.len());
        for joined in join_all(self.handles).await {
            match joined {
                Ok(exit) => exits.push(exit),
                Err(e) => tracing::error!(error = %e, "publish loop panicked"),
            }
        }
        exits
    }
}

/// Launch the grid. Returns once every loop is launched or `cancel` fires mid-launch.
pub async fn run_fanout(
    client: Arc<dyn BrokerClient>,
    config: &FanoutConfig,
    stats: Arc<Stats>,
    cancel: CancellationToken,
) -> Fanout {
    let slots = plan(config);
    tracing::info!(
        producers = slots.len(),
        topics = config.topics,
        producers_per_topic = config.producers_per_topic,
        interval_ms = config.message_interval.as_millis() as u64,
        startup_interval_ms = config.startup_interval.as_millis() as u64,
        "starting producers"
    );

    let total = slots.len();
    let mut handles = Vec::with_capacity(total);
    for (i, slot) in slots.into_iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        let span = tracing::info_span!("producer", index = slot.index, topic = %slot.topic);
        let cfg = PublisherConfig {
            slot,
            message_interval: config.message_interval,
        };
        handles.push(tokio::spawn(
            run_publisher(client.clone(), cfg, stats.clone(), cancel.clone()).instrument(span),
        ));

        if i + 1 < total && !config.startup_interval.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(config.startup_interval) => {}
            }
        }
    }
    if handles.len() < total {
        tracing::info!(launched = handles.len(), total, "launch interrupted");
    }
    Fanout { handles }
}
