use async_trait::async_trait;
use bytes::Bytes;

use crate::Result;

/// An owned broker message, detached from the client that fetched it.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Bytes>,
    /// `None` for tombstones.
    pub payload: Option<Bytes>,
}

impl BrokerMessage {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            payload: Some(payload.into()),
        }
    }

    pub fn payload(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }
}

/// A subscription the consumer loop reads from.
///
/// Implementations own their connection exclusively; one source is driven by
/// exactly one loop.
#[async_trait]
pub trait MessageSource: Send {
    /// Waits for the next message. Errors are transport failures; the caller
    /// retries after a backoff.
    async fn recv(&mut self) -> Result<BrokerMessage>;

    /// Marks `message` as processed so its offset may be committed.
    fn ack(&mut self, message: &BrokerMessage) -> Result<()>;
}
