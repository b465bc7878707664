//! Historical record parsing
//!
//! Turns the text of a bulk dataset into `RawRecord`s, one per reading, in
//! the source representation (nothing is resolved or converted here).
//!
//! Two layouts are understood:
//! - wide: `time,<key>,<key>,...`, one column per channel, one row per
//!   instant. Empty cells mean "no reading".
//! - long: one reading per row with `channel`, `value` and `timestamp`
//!   columns in any order.
//!
//! Rows whose field count differs from the header, or that cannot be
//! decoded, are skipped and reported as `MalformedRow`; they never abort
//! the parse.

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use types::errors::IngestError;

const TIME_COLUMNS: &[&str] = &["timestamp", "time", "t", "ts", "fecha", "date", "datetime"];
const KEY_COLUMNS: &[&str] = &["channel", "topic", "key", "sensor", "canal"];
const VALUE_COLUMNS: &[&str] = &["value", "valor", "reading", "v"];

/// Column arrangement of a dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordLayout {
    /// Long if the header names a channel and a value column, wide
    /// otherwise.
    #[default]
    Auto,
    Wide,
    Long,
}

/// One reading as found in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// 1-based line number in the source text.
    pub line: u64,
    pub key: String,
    pub value: String,
    pub timestamp: String,
}

/// Parse result: the readings plus row accounting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRecords {
    pub records: Vec<RawRecord>,
    /// Data rows seen, malformed ones included.
    pub rows_read: u64,
    pub malformed_rows: u64,
    /// One `MalformedRow` per skipped row.
    pub skipped: Vec<IngestError>,
}

impl ParsedRecords {
    fn skip(&mut self, err: IngestError) {
        warn!(error = %err, "Skipping malformed row");
        self.malformed_rows += 1;
        self.skipped.push(err);
    }
}

/// Resolved column positions.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Shape {
    Wide {
        time: usize,
        keys: Vec<(usize, String)>,
    },
    Long {
        time: usize,
        key: usize,
        value: usize,
    },
}

fn find_column(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
}

fn unusable(reason: impl Into<String>) -> IngestError {
    IngestError::SourceUnavailable {
        reason: reason.into(),
    }
}

fn resolve_shape(headers: &StringRecord, layout: RecordLayout) -> Result<Shape, IngestError> {
    let time = find_column(headers, TIME_COLUMNS);
    let key = find_column(headers, KEY_COLUMNS);
    let value = find_column(headers, VALUE_COLUMNS);

    let long = match layout {
        RecordLayout::Long => true,
        RecordLayout::Wide => false,
        RecordLayout::Auto => key.is_some() && value.is_some(),
    };

    if long {
        match (time, key, value) {
            (Some(time), Some(key), Some(value)) => Ok(Shape::Long { time, key, value }),
            _ => Err(unusable(
                "long layout needs channel, value and timestamp columns",
            )),
        }
    } else {
        // The plant recorder writes the epoch in the first column
        // without a recognizable name.
        let time = time.unwrap_or(0);
        let keys: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(i, h)| *i != time && !h.is_empty())
            .map(|(i, h)| (i, h.to_string()))
            .collect();
        if keys.is_empty() {
            return Err(unusable("wide layout has no channel columns"));
        }
        Ok(Shape::Wide { time, keys })
    }
}

/// Parse dataset text into raw readings.
///
/// Fails only when the text has no usable header; row-level problems are
/// counted in `malformed_rows`.
pub fn parse_records(text: &str, layout: RecordLayout) -> Result<ParsedRecords, IngestError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| unusable(format!("unreadable header: {e}")))?
        .clone();
    if headers.iter().all(str::is_empty) {
        return Err(unusable("dataset has no header row"));
    }

    let shape = resolve_shape(&headers, layout)?;
    debug!(columns = headers.len(), shape = ?shape, "Dataset header parsed");

    let mut parsed = ParsedRecords::default();

    for result in reader.records() {
        parsed.rows_read += 1;

        let row = match result {
            Ok(row) => row,
            Err(e) => {
                parsed.skip(IngestError::MalformedRow {
                    line: e.position().map_or(0, |p| p.line()),
                    reason: e.to_string(),
                });
                continue;
            }
        };
        let line = row.position().map_or(0, |p| p.line());

        if row.len() != headers.len() {
            parsed.skip(IngestError::MalformedRow {
                line,
                reason: format!("expected {} fields, found {}", headers.len(), row.len()),
            });
            continue;
        }

        match &shape {
            Shape::Wide { time, keys } => {
                let timestamp = &row[*time];
                for (idx, key) in keys {
                    let cell = &row[*idx];
                    if cell.is_empty() {
                        continue;
                    }
                    parsed.records.push(RawRecord {
                        line,
                        key: key.clone(),
                        value: cell.to_string(),
                        timestamp: timestamp.to_string(),
                    });
                }
            }
            Shape::Long { time, key, value } => {
                parsed.records.push(RawRecord {
                    line,
                    key: row[*key].to_string(),
                    value: row[*value].to_string(),
                    timestamp: row[*time].to_string(),
                });
            }
        }
    }

    Ok(parsed)
}
