use serde::Deserialize;
use tracing::trace;

use super::types::{CdcEvent, Operation, Row};
use crate::{Error, Result};

#[derive(Deserialize)]
struct Envelope {
    payload: Payload,
}

#[derive(Deserialize)]
struct Payload {
    op: String,
    #[serde(default)]
    after: Option<Row>,
    #[serde(default)]
    before: Option<Row>,
    source: Row,
}

/// Decodes a broker message value into a [`CdcEvent`].
///
/// The value must be a JSON document shaped like
/// `{"payload": {"op": .., "after": .., "before": .., "source": {..}}}`.
/// `after` and `before` may be `null` or absent; every other deviation from
/// that shape is an [`Error::Decode`]. Table-specific typing of the row
/// images is left to the handlers.
pub fn decode(raw: &[u8]) -> Result<CdcEvent> {
    if raw.is_empty() {
        return Err(Error::decode("empty message value"));
    }

    let envelope: Envelope =
        serde_json::from_slice(raw).map_err(|e| Error::decode(e.to_string()))?;
    let payload = envelope.payload;

    let event = CdcEvent {
        operation: Operation::from_code(&payload.op),
        after: payload.after,
        before: payload.before,
        source: payload.source,
    };

    trace!(op = %event.operation, table = ?event.table(), "Decoded CDC envelope");
    Ok(event)
}
