use serde_json::{Map, Value};
use std::fmt;

/// A row image: column name → loosely typed value, as emitted by the connector.
pub type Row = Map<String, Value>;

/// Kind of mutation carried by an event, from the envelope's `op` code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
    /// Any other code (snapshot reads, truncates, ...). Carries the raw code.
    Unknown(String),
}

impl Operation {
    pub fn from_code(code: &str) -> Self {
        match code {
            "c" => Operation::Create,
            "u" => Operation::Update,
            "d" => Operation::Delete,
            other => Operation::Unknown(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Operation::Create => "c",
            Operation::Update => "u",
            Operation::Delete => "d",
            Operation::Unknown(code) => code,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A decoded change event.
#[derive(Debug, Clone, PartialEq)]
pub struct CdcEvent {
    pub operation: Operation,
    /// Row state after the change. Present for create and update.
    pub after: Option<Row>,
    /// Row state before the change. Present for update and delete.
    pub before: Option<Row>,
    /// Connector metadata; `table` names the originating table.
    pub source: Row,
}

impl CdcEvent {
    /// Originating table, or `None` when the event cannot be routed.
    pub fn table(&self) -> Option<&str> {
        self.source
            .get("table")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
    }

    /// The image that describes the affected row: `before` for deletes,
    /// `after` otherwise.
    pub fn authoritative_row(&self) -> Option<&Row> {
        match self.operation {
            Operation::Delete => self.before.as_ref(),
            _ => self.after.as_ref(),
        }
    }
}
