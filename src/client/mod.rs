//! Broker client abstraction: producer traits, error type and the connect factory.

#[cfg(any(test, feature = "mock"))]
pub mod mock;
#[cfg(feature = "client-pulsar")]
pub mod pulsar;

use crate::config::OAuthSettings;
use bytes::Bytes;
use std::fmt;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("connect: {0}")]
    Connect(String),
    #[error("create producer for {topic}: {reason}")]
    CreateProducer { topic: String, reason: String },
    #[error("send: {0}")]
    Send(String),
    #[error("closed")]
    Closed,
}

/// Position of an acknowledged message in the broker's log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageId {
    pub ledger_id: u64,
    pub entry_id: u64,
    pub partition: i32,
    pub batch_index: i32,
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.ledger_id, self.entry_id, self.partition, self.batch_index)
    }
}

#[async_trait::async_trait]
pub trait BrokerClient: Send + Sync {
    /// Create a producer bound to `topic`. The handle is owned by exactly one publish loop.
    async fn create_producer(&self, topic: &str) -> Result<Box<dyn Producer>, ClientError>;
}

#[async_trait::async_trait]
pub trait Producer: Send {
    fn topic(&self) -> &str;
    async fn send(&mut self, payload: Bytes) -> Result<MessageId, ClientError>;
    async fn close(&mut self) -> Result<(), ClientError> {
        Ok(())
    }
}

/// Connection settings for the broker client.
#[derive(Clone, Debug)]
pub struct ConnectOptions {
    pub service_url: String,
    pub oauth: Option<OAuthSettings>,
    pub producer_name_prefix: String,
}

#[derive(Clone, Debug)]
pub enum Engine {
    Pulsar,
    #[cfg(any(test, feature = "mock"))]
    Mock,
}

pub struct ClientBuilder;

impl ClientBuilder {
    pub async fn connect(
        engine: Engine,
        opts: ConnectOptions,
    ) -> Result<Box<dyn BrokerClient>, ClientError> {
        match engine {
            Engine::Pulsar => {
                #[cfg(feature = "client-pulsar")]
                {
                    return crate::client::pulsar::connect(opts).await;
                }
                #[cfg(not(feature = "client-pulsar"))]
                {
                    let _ = opts;
                    Err(ClientError::Connect("pulsar feature disabled".into()))
                }
            }
            #[cfg(any(test, feature = "mock"))]
            Engine::Mock => {
                let _ = opts;
                return Ok(Box::new(crate::client::mock::MockClient::new()));
            }
        }
    }
}
