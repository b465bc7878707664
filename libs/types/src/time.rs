//! Canonical timestamp handling
//!
//! Every sample is stored in seconds since epoch shifted by one fixed
//! reference offset, so that charts show wall-clock time of the plant
//! rather than UTC. The offset is applied exactly once per sample:
//!
//! - live arrival times are UTC and get the offset added;
//! - historical integer epochs were recorded in the display frame and are
//!   taken as-is;
//! - historical date-times with an explicit zone are converted to UTC and
//!   get the offset added, naive date-times are already wall-clock time.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::IngestError;

/// UTC-5, the reference frame of the plant dashboards.
pub const DEFAULT_OFFSET_SECONDS: i32 = -5 * 3600;

/// Naive layouts accepted for historical date-time strings.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Converts source timestamps into the canonical frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeCanon {
    /// Fixed offset from UTC in seconds (east positive).
    pub offset_seconds: i32,
}

impl Default for TimeCanon {
    fn default() -> Self {
        Self {
            offset_seconds: DEFAULT_OFFSET_SECONDS,
        }
    }
}

impl TimeCanon {
    pub fn new(offset_seconds: i32) -> Self {
        Self { offset_seconds }
    }

    /// Canonicalize a UTC receipt time (epoch seconds).
    pub fn shift_utc(&self, utc_seconds: i64) -> Result<i64, IngestError> {
        utc_seconds
            .checked_add(i64::from(self.offset_seconds))
            .filter(|t| *t >= 0)
            .ok_or_else(|| IngestError::InvalidTimestamp {
                raw: utc_seconds.to_string(),
            })
    }

    /// Canonicalize a historical timestamp in its source representation.
    pub fn parse_historical(&self, raw: &str) -> Result<i64, IngestError> {
        let invalid = || IngestError::InvalidTimestamp {
            raw: raw.to_string(),
        };
        let s = raw.trim();
        if s.is_empty() {
            return Err(invalid());
        }

        let canonical = if let Ok(epoch) = s.parse::<i64>() {
            epoch
        } else if let Ok(epoch) = s.parse::<f64>() {
            if !epoch.is_finite() || epoch.abs() >= i64::MAX as f64 {
                return Err(invalid());
            }
            epoch.floor() as i64
        } else if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            dt.timestamp()
                .checked_add(i64::from(self.offset_seconds))
                .ok_or_else(invalid)?
        } else if let Some(naive) = parse_naive(s) {
            naive.and_utc().timestamp()
        } else {
            return Err(invalid());
        };

        if canonical < 0 {
            return Err(invalid());
        }
        Ok(canonical)
    }
}

/// Current UTC epoch seconds, the receipt time of a live message.
pub fn utc_now() -> i64 {
    Utc::now().timestamp()
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
