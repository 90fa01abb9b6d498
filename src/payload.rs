use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of every load message: who sent it, where, which sequence number, when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadMessage {
    pub producer: u32,
    pub topic: String,
    pub seq: u64,
    pub sent_at: DateTime<Utc>,
}

impl LoadMessage {
    pub fn new(producer: u32, topic: &str, seq: u64) -> Self {
        Self {
            producer,
            topic: topic.to_string(),
            seq,
            sent_at: Utc::now(),
        }
    }

    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(buf)
    }
}

/// Generate the payload for message `seq` of producer `producer`
pub fn generate_payload(producer: u32, topic: &str, seq: u64) -> Result<Bytes, serde_json::Error> {
    LoadMessage::new(producer, topic, seq).encode()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_sequence_and_timestamp() {
        let before = Utc::now();
        let bytes = generate_payload(3, "t/n/topic-1", 42).unwrap();
        let msg = LoadMessage::decode(&bytes).unwrap();
        assert_eq!(msg.producer, 3);
        assert_eq!(msg.topic, "t/n/topic-1");
        assert_eq!(msg.seq, 42);
        assert!(msg.sent_at >= before);
    }
}
