//! The per-topic consume → decode → route → handle loop.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cdc;
use crate::kafka::{BrokerMessage, MessageSource};
use crate::registry::{HandlerContext, Registry};
use crate::shutdown::ShutdownSignal;
use crate::Error;

pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

const PAYLOAD_PREVIEW_LEN: usize = 256;

/// What happened to a single message. Every outcome except [`Outcome::Aborted`]
/// consumes the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Handled,
    HandlerFailed,
    DecodeFailed,
    /// No table in the event, or no handler for it.
    Unrouted,
    /// Null-valued message the connector emits after a delete.
    Tombstone,
    /// The handler was cut short by shutdown. The message must be delivered
    /// again, so its offset is not stored.
    Aborted,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub handled: u64,
    pub handler_failed: u64,
    pub decode_failed: u64,
    pub unrouted: u64,
    pub tombstones: u64,
    pub aborted: u64,
    pub transport_errors: u64,
}

impl ConsumerStats {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Handled => self.handled += 1,
            Outcome::HandlerFailed => self.handler_failed += 1,
            Outcome::DecodeFailed => self.decode_failed += 1,
            Outcome::Unrouted => self.unrouted += 1,
            Outcome::Tombstone => self.tombstones += 1,
            Outcome::Aborted => self.aborted += 1,
        }
    }
}

/// Decodes `message`, routes it through `registry` and invokes the handler.
///
/// Never fails: every problem is logged and reported as an [`Outcome`].
pub async fn process_message(
    registry: &Registry,
    message: &BrokerMessage,
    shutdown: &ShutdownSignal,
) -> Outcome {
    if message.payload.is_none() {
        debug!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            "Skipping tombstone"
        );
        return Outcome::Tombstone;
    }

    let event = match cdc::decode(message.payload()) {
        Ok(event) => event,
        Err(e) => {
            warn!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                payload = %preview(message.payload()),
                "Skipping undecodable CDC message: {}",
                e
            );
            return Outcome::DecodeFailed;
        }
    };

    let Some(table) = event.table() else {
        warn!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            op = %event.operation,
            "CDC event has no source table, skipping"
        );
        return Outcome::Unrouted;
    };

    let Some(handler) = registry.lookup(table) else {
        warn!(table, op = %event.operation, "No handler for table");
        return Outcome::Unrouted;
    };

    let ctx = HandlerContext::new(
        message.topic.clone(),
        message.partition,
        message.offset,
        shutdown.clone(),
    );

    match handler
        .handle(&ctx, &event.operation, event.after.as_ref(), event.before.as_ref())
        .await
    {
        Ok(()) => {
            debug!(table, op = %event.operation, offset = message.offset, "CDC event handled");
            Outcome::Handled
        }
        Err(Error::Shutdown) => {
            info!(table, op = %event.operation, offset = message.offset, "Handler aborted by shutdown");
            Outcome::Aborted
        }
        Err(e) => {
            error!(table, op = %event.operation, offset = message.offset, "Handler error: {}", e);
            Outcome::HandlerFailed
        }
    }
}

/// Sequential consumer over one [`MessageSource`].
///
/// Messages are handled one at a time in delivery order. Transport errors are
/// retried after a fixed backoff; nothing short of shutdown ends the loop. A
/// message whose handler was aborted by shutdown is not acknowledged.
pub struct ConsumerLoop<S> {
    name: String,
    source: S,
    registry: Arc<Registry>,
    shutdown: ShutdownSignal,
    retry_backoff: Duration,
    stats: ConsumerStats,
}

impl<S: MessageSource> ConsumerLoop<S> {
    pub fn new(
        name: impl Into<String>,
        source: S,
        registry: Arc<Registry>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            registry,
            shutdown,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            stats: ConsumerStats::default(),
        }
    }

    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    pub fn stats(&self) -> ConsumerStats {
        self.stats
    }

    /// Runs until shutdown and returns the final counters.
    pub async fn run(mut self) -> ConsumerStats {
        info!(consumer = %self.name, "Consumer loop started");

        while !self.shutdown.is_shutdown() {
            let received = tokio::select! {
                biased;
                _ = self.shutdown.recv() => break,
                received = self.source.recv() => received,
            };

            let message = match received {
                Ok(message) => message,
                Err(e) => {
                    self.stats.transport_errors += 1;
                    error!(
                        consumer = %self.name,
                        backoff_ms = self.retry_backoff.as_millis() as u64,
                        "Broker read error (will retry): {}",
                        e
                    );
                    tokio::select! {
                        biased;
                        _ = self.shutdown.recv() => break,
                        _ = tokio::time::sleep(self.retry_backoff) => continue,
                    }
                }
            };

            self.stats.received += 1;
            let outcome = process_message(&self.registry, &message, &self.shutdown).await;
            self.stats.record(outcome);

            if outcome == Outcome::Aborted {
                info!(
                    consumer = %self.name,
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    "Leaving offset unstored for redelivery"
                );
                break;
            }

            if let Err(e) = self.source.ack(&message) {
                warn!(
                    consumer = %self.name,
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    "Failed to store offset: {}",
                    e
                );
            }
        }

        info!(consumer = %self.name, stats = ?self.stats, "Consumer loop stopped");
        self.stats
    }
}

fn preview(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    match text.char_indices().nth(PAYLOAD_PREVIEW_LEN) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.into_owned(),
    }
}
