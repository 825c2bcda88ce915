//! Column extraction from untyped row images.
//!
//! Connectors emit integers as JSON numbers, temporal columns as epoch
//! numbers and text as strings, but nothing stops a column from arriving as
//! `null` or in a sibling representation. [`RowReader`] applies the same
//! leniency everywhere: absent or `null` text columns read as empty, numeric
//! strings are accepted for numbers, and only key columns are mandatory.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::cdc::Row;
use crate::{Error, Result};

pub struct RowReader<'a> {
    table: &'static str,
    row: &'a Row,
}

impl<'a> RowReader<'a> {
    pub fn new(table: &'static str, row: &'a Row) -> Self {
        Self { table, row }
    }

    fn value(&self, column: &str) -> Option<&'a Value> {
        self.row.get(column).filter(|v| !v.is_null())
    }

    /// A mandatory integer column, typically the primary key.
    pub fn required_i64(&self, column: &str) -> Result<i64> {
        match self.value(column) {
            Some(value) => as_i64(value).ok_or_else(|| {
                Error::mapping(self.table, format!("column {} is not an integer: {}", column, value))
            }),
            None => Err(Error::mapping(self.table, format!("missing column {}", column))),
        }
    }

    /// A mandatory, non-empty text column.
    pub fn required_string(&self, column: &str) -> Result<String> {
        let value = self.string(column)?;
        if value.is_empty() {
            return Err(Error::mapping(self.table, format!("missing column {}", column)));
        }
        Ok(value)
    }

    /// A text column; absent or `null` reads as empty.
    pub fn string(&self, column: &str) -> Result<String> {
        Ok(self.optional_string(column)?.unwrap_or_default())
    }

    pub fn optional_string(&self, column: &str) -> Result<Option<String>> {
        match self.value(column) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(other) => Err(Error::mapping(
                self.table,
                format!("column {} is not text: {}", column, other),
            )),
        }
    }

    pub fn optional_f64(&self, column: &str) -> Result<Option<f64>> {
        match self.value(column) {
            None => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(Value::String(s)) => s.trim().parse::<f64>().map(Some).map_err(|_| {
                Error::mapping(self.table, format!("column {} is not numeric: {:?}", column, s))
            }),
            Some(other) => Err(Error::mapping(
                self.table,
                format!("column {} is not numeric: {}", column, other),
            )),
        }
    }

    /// A date column rendered as `YYYYMMDD`. Epoch milliseconds are converted;
    /// strings are taken as already formatted.
    pub fn compact_date(&self, column: &str) -> Result<String> {
        Ok(self
            .temporal(column, "%Y%m%d")?
            .unwrap_or_default())
    }

    /// A timestamp column rendered as `YYYY-MM-DD HH:MM:SS` (UTC).
    pub fn optional_datetime(&self, column: &str) -> Result<Option<String>> {
        self.temporal(column, "%Y-%m-%d %H:%M:%S")
    }

    fn temporal(&self, column: &str, format: &str) -> Result<Option<String>> {
        match self.value(column) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(value @ Value::Number(_)) => {
                let millis = as_i64(value).ok_or_else(|| {
                    Error::mapping(self.table, format!("column {} is not epoch millis: {}", column, value))
                })?;
                let ts = from_epoch_millis(millis).ok_or_else(|| {
                    Error::mapping(self.table, format!("column {} out of range: {}", column, millis))
                })?;
                Ok(Some(ts.format(format).to_string()))
            }
            Some(other) => Err(Error::mapping(
                self.table,
                format!("column {} is not a date: {}", column, other),
            )),
        }
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            // Float-encoded integers, e.g. 1695859200000.0
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
}
