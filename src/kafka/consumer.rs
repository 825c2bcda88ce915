use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::{ClientConfig, Message, Offset, TopicPartitionList};
use tracing::{debug, info, instrument};

use super::message::{BrokerMessage, MessageSource};
use crate::config::KafkaConfig;
use crate::{Error, Result};

/// A consumer-group subscription to a single topic.
///
/// Offsets are stored only after the loop acknowledges a message and are
/// committed by the client's periodic auto-commit, so a crash between
/// processing and commit re-delivers the message.
pub struct KafkaSource {
    consumer: StreamConsumer,
    topic: String,
    group_id: String,
}

impl KafkaSource {
    #[instrument(skip(config))]
    pub fn new(config: &KafkaConfig, topic: &str, group_id: &str) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", config.bootstrap_servers())
            .set("group.id", group_id)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set(
                "auto.commit.interval.ms",
                config.auto_commit_interval_ms.to_string(),
            )
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set("enable.partition.eof", "false")
            .create()
            .map_err(Error::Kafka)?;

        consumer.subscribe(&[topic]).map_err(Error::Kafka)?;
        info!("Subscribed to topic '{}' as group '{}'", topic, group_id);

        Ok(Self {
            consumer,
            topic: topic.to_string(),
            group_id: group_id.to_string(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn recv(&mut self) -> Result<BrokerMessage> {
        let message = self.consumer.recv().await.map_err(Error::Kafka)?;
        Ok(BrokerMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(Bytes::copy_from_slice),
            payload: message.payload().map(Bytes::copy_from_slice),
        })
    }

    fn ack(&mut self, message: &BrokerMessage) -> Result<()> {
        // The stored offset is the next one to read.
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset + 1),
            )
            .map_err(Error::Kafka)?;
        self.consumer.store_offsets(&offsets).map_err(Error::Kafka)?;
        debug!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            "Stored offset"
        );
        Ok(())
    }
}
