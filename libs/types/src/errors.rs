//! Error types for telemetry ingestion
//!
//! Comprehensive error taxonomy using thiserror. None of these are fatal
//! to the process: each one drops the offending unit of data (a row, a
//! message, a sample, or the whole historical load) and is surfaced as a
//! diagnostic.

use thiserror::Error;

/// Top-level ingestion error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    #[error("Unknown channel: {key}")]
    UnknownChannel { key: String },

    #[error("Invalid value: {raw:?}")]
    InvalidValue { raw: String },

    #[error("Invalid timestamp: {raw:?}")]
    InvalidTimestamp { raw: String },

    #[error("Out of order: timestamp {timestamp} precedes series tail {tail}")]
    OutOfOrder { timestamp: i64, tail: i64 },

    #[error("Historical source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    #[error("Malformed row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },

    #[error("Live queue full: capacity {capacity}")]
    QueueFull { capacity: usize },
}

impl IngestError {
    /// Short label for logging and metric keys.
    pub fn label(&self) -> &'static str {
        match self {
            IngestError::UnknownChannel { .. } => "unknown_channel",
            IngestError::InvalidValue { .. } => "invalid_value",
            IngestError::InvalidTimestamp { .. } => "invalid_timestamp",
            IngestError::OutOfOrder { .. } => "out_of_order",
            IngestError::SourceUnavailable { .. } => "source_unavailable",
            IngestError::MalformedRow { .. } => "malformed_row",
            IngestError::QueueFull { .. } => "queue_full",
        }
    }
}

/// Why the series store refused a single append.
///
/// On rejection the store is unchanged.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    #[error("out of order: timestamp {timestamp} precedes tail {tail}")]
    OutOfOrder { timestamp: i64, tail: i64 },

    #[error("invalid value: {value}")]
    InvalidValue { value: f64 },

    #[error("invalid timestamp: {timestamp}")]
    InvalidTimestamp { timestamp: i64 },

    #[error("channel has no series")]
    UnknownChannel,
}

impl RejectReason {
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::OutOfOrder { .. } => "out_of_order",
            RejectReason::InvalidValue { .. } => "invalid_value",
            RejectReason::InvalidTimestamp { .. } => "invalid_timestamp",
            RejectReason::UnknownChannel => "unknown_channel",
        }
    }
}

impl From<RejectReason> for IngestError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::OutOfOrder { timestamp, tail } => {
                IngestError::OutOfOrder { timestamp, tail }
            }
            RejectReason::InvalidValue { value } => IngestError::InvalidValue {
                raw: value.to_string(),
            },
            RejectReason::InvalidTimestamp { timestamp } => IngestError::InvalidTimestamp {
                raw: timestamp.to_string(),
            },
            RejectReason::UnknownChannel => IngestError::UnknownChannel {
                key: String::new(),
            },
        }
    }
}
