#![cfg(feature = "mock")]
use prometheus::Registry;
use pulsar_loadgen::admin::mock::MockAdmin;
use pulsar_loadgen::admin::{AdminError, provision_namespace};
use pulsar_loadgen::client::BrokerClient;
use pulsar_loadgen::client::mock::MockClient;
use pulsar_loadgen::config::Target;
use pulsar_loadgen::metrics::exporter;
use pulsar_loadgen::output::OutputWriter;
use pulsar_loadgen::payload::LoadMessage;
use pulsar_loadgen::roles::fanout::FanoutConfig;
use pulsar_loadgen::roles::publisher::PublisherExit;
use pulsar_loadgen::runner::{RunOptions, run_cleanup, run_load};
use pulsar_loadgen::topic::NamespaceName;
use std::sync::Arc;
use std::time::Duration;

fn options(topics: u32, per_topic: u32, interval_ms: u64, startup_ms: u64) -> RunOptions {
    RunOptions {
        namespace: NamespaceName::new("tenant", "ns").unwrap(),
        fanout: FanoutConfig {
            tenant: "tenant".into(),
            namespace: "ns".into(),
            topics,
            producers_per_topic: per_topic,
            message_interval: Duration::from_millis(interval_ms),
            startup_interval: Duration::from_millis(startup_ms),
        },
        purge_on_start: true,
        cleanup_on_exit: false,
        snapshot_interval: Duration::from_secs(60),
        output: OutputWriter::new_log(),
        metrics_listener: None,
    }
}

fn client(mock: &MockClient) -> Arc<dyn BrokerClient> {
    Arc::new(mock.clone())
}

#[tokio::test(start_paused = true)]
async fn two_topics_one_producer_each() {
    let admin = MockAdmin::new();
    admin.add_topic("persistent://tenant/ns/leftover", false);
    let mock = MockClient::new();
    let mut opts = options(2, 1, 1000, 0);
    opts.cleanup_on_exit = true;

    let summary = run_load(
        &admin,
        client(&mock),
        Registry::new(),
        opts,
        tokio::time::sleep(Duration::from_millis(5500)),
    )
    .await
    .unwrap();

    assert_eq!(summary.exits.len(), 2);
    assert_eq!(mock.topics(), vec!["tenant/ns/topic-0", "tenant/ns/topic-1"]);
    for topic in ["tenant/ns/topic-0", "tenant/ns/topic-1"] {
        let sent = mock.sent(topic);
        assert_eq!(sent.len(), 6, "one message per second on {}", topic);
        let seqs: Vec<u64> = sent.iter().map(|b| LoadMessage::decode(b).unwrap().seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5, 6]);
    }
    assert_eq!(summary.final_snapshot.producers_started, 2);
    assert_eq!(summary.final_snapshot.messages_produced, 12);
    assert_eq!(mock.producers_closed(), 2);

    // leftover topic purged before producing; exit cleanup ran after the drain
    assert_eq!(admin.deleted(), vec![("persistent://tenant/ns/leftover".to_string(), false)]);
    assert!(summary.cleanup.expect("cleanup report").is_clean());
}

#[tokio::test(start_paused = true)]
async fn failed_producer_does_not_stop_the_others() {
    let admin = MockAdmin::new();
    let mock = MockClient::rejecting(["tenant/ns/topic-1"]);

    let summary = run_load(
        &admin,
        client(&mock),
        Registry::new(),
        options(2, 1, 1000, 0),
        tokio::time::sleep(Duration::from_millis(3500)),
    )
    .await
    .unwrap();

    assert_eq!(summary.final_snapshot.producers_started, 1);
    assert_eq!(summary.final_snapshot.producer_failures, 1);
    assert_eq!(mock.sent("tenant/ns/topic-0").len(), 4);
    assert!(mock.sent("tenant/ns/topic-1").is_empty());

    let failed: Vec<&str> = summary
        .exits
        .iter()
        .filter(|e| matches!(e, PublisherExit::CreateFailed { .. }))
        .map(|e| e.slot().topic.as_str())
        .collect();
    assert_eq!(failed, vec!["tenant/ns/topic-1"]);
}

#[tokio::test(start_paused = true)]
async fn every_grid_cell_gets_a_unique_producer() {
    let admin = MockAdmin::new();
    let mock = MockClient::new();

    let summary = run_load(
        &admin,
        client(&mock),
        Registry::new(),
        options(3, 2, 500, 10),
        tokio::time::sleep(Duration::from_millis(1000)),
    )
    .await
    .unwrap();

    let mut indices: Vec<u32> = summary.exits.iter().map(|e| e.slot().index).collect();
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(summary.final_snapshot.producers_started, 6);

    // two producers share each topic; sequence numbers are per producer
    let producers: Vec<u32> = {
        let mut p: Vec<u32> = mock
            .sent("tenant/ns/topic-0")
            .iter()
            .map(|b| LoadMessage::decode(b).unwrap().producer)
            .collect();
        p.sort_unstable();
        p.dedup();
        p
    };
    assert_eq!(producers, vec![0, 3]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_staggered_launch_stops_launching() {
    let admin = MockAdmin::new();
    let mock = MockClient::new();

    let summary = run_load(
        &admin,
        client(&mock),
        Registry::new(),
        options(3, 2, 1000, 1000),
        tokio::time::sleep(Duration::from_millis(2500)),
    )
    .await
    .unwrap();

    assert_eq!(summary.exits.len(), 3);
    assert_eq!(mock.producers_created(), 3);
    assert_eq!(mock.producers_closed(), 3);
    assert!(summary.exits.iter().all(|e| matches!(e, PublisherExit::Stopped { .. })));
}

#[tokio::test(start_paused = true)]
async fn zero_sized_grid_runs_nothing() {
    let admin = MockAdmin::new();
    let mock = MockClient::new();
    let summary = run_load(
        &admin,
        client(&mock),
        Registry::new(),
        options(0, 4, 1000, 0),
        tokio::time::sleep(Duration::from_millis(100)),
    )
    .await
    .unwrap();
    assert!(summary.exits.is_empty());
    assert_eq!(mock.producers_created(), 0);
}

#[tokio::test(start_paused = true)]
async fn purge_failure_does_not_abort_the_run() {
    let admin = MockAdmin::new();
    admin.fail_listing(AdminError::Request("connection refused".into()));
    let mock = MockClient::new();
    let summary = run_load(
        &admin,
        client(&mock),
        Registry::new(),
        options(1, 1, 1000, 0),
        tokio::time::sleep(Duration::from_millis(1500)),
    )
    .await
    .unwrap();
    assert_eq!(summary.final_snapshot.messages_produced, 2);
}

#[tokio::test]
async fn metrics_endpoint_reports_live_counters() {
    let admin = MockAdmin::new();
    let mock = MockClient::new();
    let mut opts = options(1, 1, 20, 0);
    let listener = exporter::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    opts.metrics_listener = Some(listener);

    let scraped = Arc::new(tokio::sync::Mutex::new(String::new()));
    let sink = scraped.clone();
    let shutdown = async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let body = reqwest::get(format!("http://{}/metrics", addr))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        *sink.lock().await = body;
    };

    let summary = run_load(&admin, client(&mock), Registry::new(), opts, shutdown)
        .await
        .unwrap();

    let body = scraped.lock().await.clone();
    assert!(body.contains("loadgen_producers_started_total 1"));
    assert!(body.contains("loadgen_messages_produced_total"));
    assert!(summary.final_snapshot.messages_produced > 0);
    // endpoint is gone after the run
    assert!(reqwest::get(format!("http://{}/metrics", addr)).await.is_err());
}

#[tokio::test]
async fn cleanup_mode_reports_partial_failure() {
    let ns = NamespaceName::new("tenant", "ns").unwrap();

    let admin = MockAdmin::new();
    admin.add_topic("persistent://tenant/ns/topic-0", false);
    admin.add_topic("persistent://tenant/ns/big", true);
    let report = run_cleanup(&admin, &ns).await.unwrap();
    assert_eq!(report.deleted.len(), 2);
    assert!(admin.remaining_topics().is_empty());

    let admin = MockAdmin::new();
    admin.add_topic("persistent://tenant/ns/topic-0", false);
    admin.add_topic("persistent://tenant/ns/topic-1", false);
    admin.fail_delete("persistent://tenant/ns/topic-0");
    let err = run_cleanup(&admin, &ns).await.unwrap_err();
    assert!(err.to_string().contains("persistent://tenant/ns/topic-0"));
    // the failing topic did not stop the next one
    assert_eq!(admin.remaining_topics(), vec!["persistent://tenant/ns/topic-0"]);
}

#[tokio::test]
async fn provisioning_aborts_only_on_real_errors() {
    let target = Target {
        cluster: "standalone".into(),
        namespace: NamespaceName::new("tenant", "ns").unwrap(),
        role: "heartbeat".into(),
    };

    let admin = MockAdmin::new();
    provision_namespace(&admin, &target).await.unwrap();
    // second run sees 409s for both and still succeeds
    provision_namespace(&admin, &target).await.unwrap();

    let admin = MockAdmin::new();
    admin.fail_next_tenant(AdminError::Status {
        status: 500,
        reason: "boom".into(),
    });
    assert!(provision_namespace(&admin, &target).await.is_err());
    assert!(!admin.has_namespace("tenant/ns"));
}
