//! Pulsar adapter (feature `client-pulsar`), using pulsar-rs on the tokio executor.
use crate::client::{BrokerClient, ClientError, ConnectOptions, MessageId, Producer};
use bytes::Bytes;
use pulsar::authentication::oauth2::{OAuth2Authentication, OAuth2Params};
use pulsar::proto::MessageIdData;
use pulsar::{Pulsar, TokioExecutor};

pub struct PulsarClient {
    pulsar: Pulsar<TokioExecutor>,
    name_prefix: String,
}

pub async fn connect(opts: ConnectOptions) -> Result<Box<dyn BrokerClient>, ClientError> {
    let mut builder = Pulsar::builder(opts.service_url.clone(), TokioExecutor);
    if let Some(oauth) = opts.oauth {
        builder = builder.with_auth_provider(OAuth2Authentication::client_credentials(OAuth2Params {
            issuer_url: oauth.issuer_url,
            credentials_url: oauth.credentials_file_url,
            audience: (!oauth.audience.is_empty()).then_some(oauth.audience),
            scope: None,
        }));
    }
    let pulsar = builder
        .build()
        .await
        .map_err(|e| ClientError::Connect(e.to_string()))?;
    tracing::info!(url = %opts.service_url, "connected to broker");
    Ok(Box::new(PulsarClient {
        pulsar,
        name_prefix: opts.producer_name_prefix,
    }))
}

#[async_trait::async_trait]
impl BrokerClient for PulsarClient {
    async fn create_producer(&self, topic: &str) -> Result<Box<dyn Producer>, ClientError> {
        let name = format!("{}-{}", self.name_prefix, uuid::Uuid::new_v4());
        let inner = self
            .pulsar
            .producer()
            .with_topic(topic)
            .with_name(name)
            .build()
            .await
            .map_err(|e| ClientError::CreateProducer {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(PulsarProducer {
            inner,
            topic: topic.to_string(),
        }))
    }
}

struct PulsarProducer {
    inner: pulsar::Producer<TokioExecutor>,
    topic: String,
}

#[async_trait::async_trait]
impl Producer for PulsarProducer {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn send(&mut self, payload: Bytes) -> Result<MessageId, ClientError> {
        let pending = self
            .inner
            .send_non_blocking(payload.to_vec())
            .await
            .map_err(|e| ClientError::Send(e.to_string()))?;
        let receipt = pending.await.map_err(|e| ClientError::Send(e.to_string()))?;
        Ok(receipt.message_id.as_ref().map(message_id).unwrap_or_default())
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        self.inner
            .close()
            .await
            .map_err(|e| ClientError::Send(format!("close {}: {}", self.topic, e)))
    }
}

fn message_id(id: &MessageIdData) -> MessageId {
    MessageId {
        ledger_id: id.ledger_id,
        entry_id: id.entry_id,
        partition: id.partition.unwrap_or(-1),
        batch_index: id.batch_index.unwrap_or(-1),
    }
}
