use crate::client::{BrokerClient, ClientError};
use crate::metrics::stats::Stats;
use crate::payload::generate_payload;
use crate::rate::RateController;
use crate::roles::fanout::ProducerSlot;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub struct PublisherConfig {
    pub slot: ProducerSlot,
    pub message_interval: Duration,
}

/// How a publish loop ended.
#[derive(Debug)]
pub enum PublisherExit {
    /// The producer could not be created; the loop never ran.
    CreateFailed { slot: ProducerSlot, error: ClientError },
    /// The loop was cancelled after `sent` acknowledged and `failed` failed sends.
    Stopped { slot: ProducerSlot, sent: u64, failed: u64 },
}

impl PublisherExit {
    pub fn slot(&self) -> &ProducerSlot {
        match self {
            Self::CreateFailed { slot, .. } | Self::Stopped { slot, .. } => slot,
        }
    }
}

/// One publish loop: create the producer, then send one message per interval until cancelled.
///
/// Creation failure ends only this loop. Send failures are counted and logged, and
/// the loop carries on with the next sequence number.
pub async fn run_publisher(
    client: Arc<dyn BrokerClient>,
    config: PublisherConfig,
    stats: Arc<Stats>,
    cancel: CancellationToken,
) -> PublisherExit {
    let slot = config.slot;

    let created = tokio::select! {
        biased;
        _ = cancel.cancelled() => return PublisherExit::Stopped { slot, sent: 0, failed: 0 },
        r = client.create_producer(&slot.topic) => r,
    };
    let mut producer = match created {
        Ok(p) => p,
        Err(error) => {
            tracing::warn!(%error, "unable to create producer");
            stats.record_producer_failure();
            return PublisherExit::CreateFailed { slot, error };
        }
    };
    stats.record_producer_started();
    tracing::info!(
        interval_ms = config.message_interval.as_millis() as u64,
        "producer started"
    );

    let mut rate = RateController::new(config.message_interval);
    let progress_every = rate.messages_per_progress_log();
    let mut seq = 0u64;
    let mut sent = 0u64;
    let mut failed = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = rate.wait_for_next() => {}
        }

        seq += 1;
        let payload = match generate_payload(slot.index, &slot.topic, seq) {
            Ok(p) => p,
            Err(e) => {
                failed += 1;
                stats.record_send_error();
                tracing::warn!(seq, error = %e, "unable to encode message");
                continue;
            }
        };

        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            r = producer.send(payload) => r,
        };
        match result {
            Ok(id) => {
                sent += 1;
                stats.record_sent(started.elapsed()).await;
                tracing::debug!(seq, msg_id = %id, "produced message");
            }
            Err(e) => {
                failed += 1;
                stats.record_send_error();
                tracing::warn!(seq, error = %e, "send failed");
            }
        }
        // spaced by attempts, so a failed send on a milestone still reports
        if seq % progress_every == 0 {
            tracing::info!(seq, sent, failed, "producer progress");
        }
    }

    if let Err(e) = producer.close().await {
        tracing::warn!(error = %e, "producer close failed");
    }
    tracing::info!(sent, failed, "producer stopped");
    PublisherExit::Stopped { slot, sent, failed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockClient;
    use crate::payload::LoadMessage;
    use prometheus::Registry;
    use std::io;
    use std::sync::Mutex;
    use tracing::instrument::WithSubscriber;

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn lines_containing(&self, needle: &str) -> Vec<String> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8_lossy(&bytes)
                .lines()
                .filter(|l| l.contains(needle))
                .map(str::to_string)
                .collect()
        }
    }

    fn slot(topic: &str) -> ProducerSlot {
        ProducerSlot {
            index: 7,
            topic_index: 0,
            topic: topic.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sends_one_message_per_interval_with_increasing_seq() {
        let mock = MockClient::new();
        let stats = Arc::new(Stats::new(&Registry::new()).unwrap());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_publisher(
            Arc::new(mock.clone()),
            PublisherConfig {
                slot: slot("t/n/topic-0"),
                message_interval: Duration::from_millis(100),
            },
            stats.clone(),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(450)).await;
        cancel.cancel();
        let exit = handle.await.unwrap();

        let sent = mock.sent("t/n/topic-0");
        assert_eq!(sent.len(), 5);
        let seqs: Vec<u64> = sent.iter().map(|b| LoadMessage::decode(b).unwrap().seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
        assert!(sent.iter().all(|b| LoadMessage::decode(b).unwrap().producer == 7));
        assert!(matches!(exit, PublisherExit::Stopped { sent: 5, failed: 0, .. }));
        assert_eq!(stats.producers_started.get(), 1);
        assert_eq!(stats.messages_produced.get(), 5);
        assert_eq!(mock.producers_closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn send_failures_do_not_stop_the_loop() {
        let mock = MockClient::failing_every(2);
        let stats = Arc::new(Stats::new(&Registry::new()).unwrap());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_publisher(
            Arc::new(mock.clone()),
            PublisherConfig {
                slot: slot("t/n/topic-0"),
                message_interval: Duration::from_millis(100),
            },
            stats.clone(),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(550)).await;
        cancel.cancel();
        let exit = handle.await.unwrap();

        assert_eq!(mock.send_attempts(), 6);
        assert_eq!(mock.total_sent(), 3);
        assert_eq!(stats.messages_produced.get(), 3);
        assert_eq!(stats.send_errors.get(), 3);
        assert!(matches!(exit, PublisherExit::Stopped { sent: 3, failed: 3, .. }));
        // failed attempts still consume a sequence number
        let seqs: Vec<u64> = mock
            .sent("t/n/topic-0")
            .iter()
            .map(|b| LoadMessage::decode(b).unwrap().seq)
            .collect();
        assert_eq!(seqs, vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn creation_failure_is_isolated_and_counted() {
        let mock = MockClient::rejecting(["t/n/topic-1"]);
        let stats = Arc::new(Stats::new(&Registry::new()).unwrap());
        let exit = run_publisher(
            Arc::new(mock.clone()),
            PublisherConfig {
                slot: slot("t/n/topic-1"),
                message_interval: Duration::from_millis(100),
            },
            stats.clone(),
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(exit, PublisherExit::CreateFailed { .. }));
        assert_eq!(stats.producers_started.get(), 0);
        assert_eq!(stats.producer_failures.get(), 1);
        assert_eq!(mock.send_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_logged_every_thirty_seconds_of_attempts() {
        // one second interval: a progress line every 30 attempts; attempts 30 and 60 fail
        let mock = MockClient::failing_every(30);
        let stats = Arc::new(Stats::new(&Registry::new()).unwrap());
        let cancel = CancellationToken::new();
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        let handle = tokio::spawn(
            run_publisher(
                Arc::new(mock.clone()),
                PublisherConfig {
                    slot: slot("t/n/topic-0"),
                    message_interval: Duration::from_millis(1000),
                },
                stats.clone(),
                cancel.clone(),
            )
            .with_subscriber(subscriber),
        );

        tokio::time::sleep(Duration::from_millis(60_500)).await;
        cancel.cancel();
        let exit = handle.await.unwrap();
        assert!(matches!(exit, PublisherExit::Stopped { sent: 59, failed: 2, .. }));

        let progress = logs.lines_containing("producer progress");
        assert_eq!(progress.len(), 2, "{:?}", progress);
        assert!(progress[0].contains("seq=30"));
        assert!(progress[0].contains("sent=29"));
        assert!(progress[0].contains("failed=1"));
        assert!(progress[1].contains("seq=60"));
        assert!(progress[1].contains("failed=2"));
    }
}
