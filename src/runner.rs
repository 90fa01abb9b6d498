//! Run orchestration: purge, fan out, wait for shutdown, drain, clean up.

use crate::admin::{Admin, CleanupReport, cleanup_topics};
use crate::client::BrokerClient;
use crate::metrics::exporter;
use crate::metrics::stats::{Stats, StatsSnapshot};
use crate::output::OutputWriter;
use crate::roles::fanout::{FanoutConfig, run_fanout};
use crate::roles::publisher::PublisherExit;
use crate::topic::NamespaceName;
use anyhow::{Context, Result};
use prometheus::Registry;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct RunOptions {
    pub namespace: NamespaceName,
    pub fanout: FanoutConfig,
    pub purge_on_start: bool,
    pub cleanup_on_exit: bool,
    pub snapshot_interval: Duration,
    pub output: OutputWriter,
    pub metrics_listener: Option<TcpListener>,
}

pub struct RunSummary {
    pub exits: Vec<PublisherExit>,
    pub final_snapshot: StatsSnapshot,
    pub cleanup: Option<CleanupReport>,
}

/// Delete leftover topics and produce until `shutdown` resolves, then stop
/// every producer, wait for the loops to drain and only then clean up.
pub async fn run_load<F>(
    admin: &dyn Admin,
    client: Arc<dyn BrokerClient>,
    registry: Registry,
    opts: RunOptions,
    shutdown: F,
) -> Result<RunSummary>
where
    F: Future<Output = ()>,
{
    let RunOptions {
        namespace,
        fanout,
        purge_on_start,
        cleanup_on_exit,
        snapshot_interval,
        mut output,
        metrics_listener,
    } = opts;

    if purge_on_start {
        purge(admin, &namespace).await;
    }

    let stats = Arc::new(Stats::new(&registry).context("register load counters")?);
    let producers = CancellationToken::new();
    let aux = CancellationToken::new();

    let metrics_handle = metrics_listener.map(|listener| {
        let registry = registry.clone();
        let token = aux.clone();
        tokio::spawn(async move {
            if let Err(e) = exporter::serve(listener, registry, token).await {
                tracing::error!(error = %e, "metrics endpoint failed");
            }
        })
    });

    let snapshot_handle = {
        let stats = stats.clone();
        let token = aux.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(snapshot_interval.max(Duration::from_millis(1)));
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let snap = stats.snapshot().await;
                        if let Err(e) = output.write_snapshot(&snap) {
                            tracing::warn!(error = %e, "unable to write snapshot");
                        }
                    }
                }
            }
            output
        })
    };

    tokio::pin!(shutdown);
    let launch = run_fanout(client, &fanout, stats.clone(), producers.clone());
    tokio::pin!(launch);
    let running = tokio::select! {
        f = &mut launch => f,
        _ = &mut shutdown => {
            producers.cancel();
            launch.await
        }
    };
    tracing::info!(producers = running.launched(), "launch finished");

    if !producers.is_cancelled() {
        shutdown.await;
        producers.cancel();
    }
    tracing::info!("shutting down producers");
    let exits = running.drain().await;

    aux.cancel();
    let final_snapshot = stats.snapshot().await;
    if let Some(mut output) = join_aux("snapshot", snapshot_handle).await {
        if let Err(e) = output.write_snapshot(&final_snapshot) {
            tracing::warn!(error = %e, "unable to write final snapshot");
        }
    }
    if let Some(h) = metrics_handle {
        join_aux("metrics", h).await;
    }

    let cleanup = if cleanup_on_exit {
        match cleanup_topics(admin, &namespace).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(namespace = %namespace, error = %e, "cleanup on exit failed");
                None
            }
        }
    } else {
        None
    };

    Ok(RunSummary {
        exits,
        final_snapshot,
        cleanup,
    })
}

/// Await an auxiliary task; a panic or abort is logged, not propagated.
async fn join_aux<T>(task: &'static str, handle: JoinHandle<T>) -> Option<T> {
    match handle.await {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(task, error = %e, "auxiliary task failed");
            None
        }
    }
}

/// Best-effort removal of topics left over from a previous run.
async fn purge(admin: &dyn Admin, namespace: &NamespaceName) {
    match cleanup_topics(admin, namespace).await {
        Ok(report) if report.is_clean() => {
            tracing::info!(deleted = report.deleted.len(), "removed leftover topics");
        }
        Ok(report) => tracing::warn!(
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "some leftover topics could not be removed"
        ),
        Err(e) => {
            tracing::warn!(namespace = %namespace, error = %e, "unable to list leftover topics")
        }
    }
}

/// Cleanup mode: delete every topic of the namespace; any failure is an error.
pub async fn run_cleanup(
    admin: &dyn Admin,
    namespace: &NamespaceName,
) -> Result<CleanupReport> {
    let report = cleanup_topics(admin, namespace)
        .await
        .with_context(|| format!("list topics of {}", namespace))?;
    if !report.is_clean() {
        let failed: Vec<&str> = report.failed.iter().map(|(t, _)| t.as_str()).collect();
        anyhow::bail!(
            "deleted {} topics, failed to delete {}: {}",
            report.deleted.len(),
            failed.len(),
            failed.join(", ")
        );
    }
    tracing::info!(namespace = %namespace, deleted = report.deleted.len(), "cleanup complete");
    Ok(report)
}
