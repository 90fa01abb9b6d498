//! In-process broker client for tests and dry runs (feature `mock`).
use crate::client::{BrokerClient, ClientError, MessageId, Producer};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Shared {
    reject_topics: HashSet<String>,
    fail_every_nth_send: Option<u64>,
    sent: Mutex<HashMap<String, Vec<Bytes>>>,
    created: AtomicU64,
    closed: AtomicU64,
    attempts: AtomicU64,
}

/// Accepts every producer except those for rejected topics and stores every
/// payload it is sent. Clones share state, so a test can keep one to inspect.
#[derive(Clone, Default)]
pub struct MockClient {
    shared: Arc<Shared>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Producer creation fails for these topics.
    pub fn rejecting<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::builder(topics.into_iter().map(Into::into).collect(), None)
    }

    /// Every `n`th send attempt (across all producers) fails.
    pub fn failing_every(n: u64) -> Self {
        Self::builder(HashSet::new(), Some(n.max(1)))
    }

    fn builder(reject_topics: HashSet<String>, fail_every_nth_send: Option<u64>) -> Self {
        Self {
            shared: Arc::new(Shared {
                reject_topics,
                fail_every_nth_send,
                ..Shared::default()
            }),
        }
    }

    pub fn producers_created(&self) -> u64 {
        self.shared.created.load(Ordering::SeqCst)
    }

    pub fn producers_closed(&self) -> u64 {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn send_attempts(&self) -> u64 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Payloads accepted for `topic`, in send order.
    pub fn sent(&self, topic: &str) -> Vec<Bytes> {
        self.shared
            .sent
            .lock()
            .map(|m| m.get(topic).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn total_sent(&self) -> usize {
        self.shared
            .sent
            .lock()
            .map(|m| m.values().map(Vec::len).sum())
            .unwrap_or_default()
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .shared
            .sent
            .lock()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        topics.sort();
        topics
    }
}

#[async_trait::async_trait]
impl BrokerClient for MockClient {
    async fn create_producer(&self, topic: &str) -> Result<Box<dyn Producer>, ClientError> {
        if self.shared.reject_topics.contains(topic) {
            return Err(ClientError::CreateProducer {
                topic: topic.to_string(),
                reason: "rejected by mock".into(),
            });
        }
        self.shared.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockProducer {
            shared: self.shared.clone(),
            topic: topic.to_string(),
            closed: false,
        }))
    }
}

struct MockProducer {
    shared: Arc<Shared>,
    topic: String,
    closed: bool,
}

#[async_trait::async_trait]
impl Producer for MockProducer {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn send(&mut self, payload: Bytes) -> Result<MessageId, ClientError> {
        if self.closed {
            return Err(ClientError::Closed);
        }
        let attempt = self.shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(n) = self.shared.fail_every_nth_send {
            if attempt % n == 0 {
                return Err(ClientError::Send(format!("mock failure on attempt {}", attempt)));
            }
        }
        let mut sent = self
            .shared
            .sent
            .lock()
            .map_err(|_| ClientError::Send("mock state poisoned".into()))?;
        let entries = sent.entry(self.topic.clone()).or_default();
        entries.push(payload);
        Ok(MessageId {
            ledger_id: 1,
            entry_id: entries.len() as u64 - 1,
            partition: -1,
            batch_index: -1,
        })
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        if !self.closed {
            self.closed = true;
            self.shared.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
