pub mod consumer;
pub mod message;

pub use consumer::KafkaSource;
pub use message::{BrokerMessage, MessageSource};
