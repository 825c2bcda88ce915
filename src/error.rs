//! Error types and result handling for goldgym-cdc.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! # Example
//!
//! ```rust
//! use goldgym_cdc::{Error, Result};
//!
//! fn decode_member() -> Result<()> {
//!     Err(Error::Mapping {
//!         table: "data_peserta".to_string(),
//!         message: "missing column gold_id".to_string(),
//!     })
//! }
//!
//! match decode_member() {
//!     Ok(()) => println!("Decoded"),
//!     Err(Error::Mapping { table, message }) => eprintln!("{}: {}", table, message),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use thiserror::Error;

/// The main error type for goldgym-cdc operations.
///
/// Only [`Error::Config`] and boot-time connection failures are fatal to the
/// process. Everything raised while consuming a single message is logged by
/// the consumer loop and swallowed.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error, from the config file or environment overrides.
    #[error("Configuration error: {0}")]
    Config(String),

    /// PostgreSQL client error raised by the downstream store.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Kafka client or consumer error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// Generic connection error not covered by specific types.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The broker message could not be parsed as a CDC envelope.
    #[error("Invalid CDC envelope: {message}")]
    Decode {
        /// Description of what was invalid
        message: String,
    },

    /// A row image could not be converted into the table's entity.
    #[error("Cannot map row of table {table}: {message}")]
    Mapping {
        /// Source table of the row
        table: String,
        /// Description of the offending column
        message: String,
    },

    /// Business-level failure reported by a membership service.
    #[error("Service error: {message}")]
    Service {
        /// Description of the failure
        message: String,
    },

    /// Graceful shutdown was requested (e.g., via Ctrl+C).
    ///
    /// This is not really an error but uses the error mechanism
    /// to cleanly abort in-flight service calls.
    #[error("Shutdown requested")]
    Shutdown,
}

impl Error {
    pub(crate) fn decode(message: impl Into<String>) -> Self {
        Error::Decode {
            message: message.into(),
        }
    }

    pub(crate) fn mapping(table: &str, message: impl Into<String>) -> Self {
        Error::Mapping {
            table: table.to_string(),
            message: message.into(),
        }
    }
}

/// A convenient Result type alias for goldgym-cdc operations.
///
/// This is equivalent to `std::result::Result<T, goldgym_cdc::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
