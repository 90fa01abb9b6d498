use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prometheus::Registry;
use pulsar_loadgen::admin::rest::RestAdmin;
use pulsar_loadgen::admin::{Admin, provision_namespace};
use pulsar_loadgen::client::{ClientBuilder, ConnectOptions, Engine};
use pulsar_loadgen::config::Config;
use pulsar_loadgen::logging;
use pulsar_loadgen::metrics::exporter;
use pulsar_loadgen::output::OutputWriter;
use pulsar_loadgen::roles::fanout::FanoutConfig;
use pulsar_loadgen::roles::publisher::PublisherExit;
use pulsar_loadgen::runner::{RunOptions, run_cleanup, run_load};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CONFIG: &str = "loadgen.yaml";

#[derive(Parser)]
#[command(name = "pulsar-loadgen")]
#[command(about = "Provision a Pulsar namespace and drive producer load against it")]
struct Cli {
    /// YAML configuration file (defaults to ./loadgen.yaml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Run ID for tagging outputs
    #[arg(long, default_value = "")]
    run_id: String,

    /// Snapshot interval in seconds for periodic stats output
    #[arg(long, default_value = "30", value_parser = clap::value_parser!(u64).range(1..))]
    snapshot_interval: u64,

    /// Optional CSV output file path for snapshots (logged if omitted)
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Delete every topic in the namespace and exit
    #[arg(long)]
    cleanup: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the namespace and produce until Ctrl+C (default)
    Run {
        /// Number of topics
        #[arg(long)]
        topics: Option<u32>,

        /// Producers per topic
        #[arg(long)]
        producers_per_topic: Option<u32>,

        /// Interval between messages of one producer (ms)
        #[arg(long)]
        message_interval_ms: Option<u64>,

        /// Delay between producer launches (ms)
        #[arg(long)]
        producer_start_interval_ms: Option<u64>,

        /// Metrics listen address
        #[arg(long)]
        metrics_addr: Option<String>,

        /// Delete the namespace's topics after producers have drained
        #[arg(long)]
        cleanup_on_exit: bool,
    },
    /// Provision the namespace, delete its topics and exit
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    logging::init(&cli.log_level)?;

    let run_id = if cli.run_id.is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        cli.run_id.clone()
    };
    tracing::info!(%run_id, "pulsar-loadgen starting");

    let mut config = load_config(cli.config.as_deref())?;
    let cleanup_mode = match &cli.command {
        Some(Commands::Cleanup) => true,
        Some(Commands::Run {
            topics,
            producers_per_topic,
            message_interval_ms,
            producer_start_interval_ms,
            metrics_addr,
            cleanup_on_exit,
        }) => {
            if let Some(v) = topics {
                config.num_topics = *v;
            }
            if let Some(v) = producers_per_topic {
                config.num_producers_per_topic = *v;
            }
            if let Some(v) = message_interval_ms {
                config.message_interval_ms = *v;
            }
            if let Some(v) = producer_start_interval_ms {
                config.producer_start_interval_ms = *v;
            }
            if let Some(v) = metrics_addr {
                config.metrics_addr = v.clone();
            }
            config.cleanup_on_exit |= *cleanup_on_exit;
            cli.cleanup || config.cleanup
        }
        None => cli.cleanup || config.cleanup,
    };
    config.validate().context("invalid configuration")?;
    let target = config.target()?;

    let admin = RestAdmin::new(&config.admin_service_url, config.admin_oauth())?;
    tracing::info!(url = %config.admin_service_url, "created admin client");

    if let Err(e) = provision_namespace(&admin, &target).await {
        tracing::error!(namespace = %target.namespace, error = %e, "provisioning failed");
        return Err(e).context("provision namespace");
    }

    if cleanup_mode {
        run_cleanup(&admin, &target.namespace).await?;
        return Ok(());
    }

    run(&config, &cli, &admin, target.namespace.clone()).await
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(p) => Config::load(Some(p)).with_context(|| format!("load {}", p.display())),
        None => {
            let default = std::path::Path::new(DEFAULT_CONFIG);
            let found = default.exists().then_some(default);
            Ok(Config::load(found)?)
        }
    }
}

async fn run(
    config: &Config,
    cli: &Cli,
    admin: &dyn Admin,
    namespace: pulsar_loadgen::topic::NamespaceName,
) -> Result<()> {
    let client = ClientBuilder::connect(
        Engine::Pulsar,
        ConnectOptions {
            service_url: config.client_service_url.clone(),
            oauth: config.client_oauth(),
            producer_name_prefix: config.producer_name_prefix.clone(),
        },
    )
    .await
    .context("connect to broker")?;
    let client: Arc<dyn pulsar_loadgen::client::BrokerClient> = Arc::from(client);

    let output = match &cli.csv {
        Some(path) => OutputWriter::new_csv(path)?,
        None => OutputWriter::new_log(),
    };
    let listener = exporter::bind(config.metrics_socket_addr()?)
        .await
        .with_context(|| format!("bind metrics endpoint {}", config.metrics_addr))?;

    let opts = RunOptions {
        namespace,
        fanout: FanoutConfig::from_config(config),
        purge_on_start: config.purge_on_start,
        cleanup_on_exit: config.cleanup_on_exit,
        snapshot_interval: Duration::from_secs(cli.snapshot_interval),
        output,
        metrics_listener: Some(listener),
    };
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "unable to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        tracing::info!("Ctrl+C received");
    };

    let summary = run_load(admin, client, Registry::new(), opts, shutdown).await?;

    let failed_producers = summary
        .exits
        .iter()
        .filter(|e| matches!(e, PublisherExit::CreateFailed { .. }))
        .count();
    let snap = &summary.final_snapshot;
    tracing::info!(
        producers = snap.producers_started,
        failed_producers,
        produced = snap.messages_produced,
        send_errors = snap.send_errors,
        duration_s = format_args!("{:.1}", snap.total_duration.as_secs_f64()),
        "run finished"
    );
    if let Some(report) = summary.cleanup {
        tracing::info!(
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "cleaned up topics"
        );
    }
    Ok(())
}
