//! Timestamped observations
//!
//! A `Sample` is the only unit the series store holds. Construction through
//! `Sample::new` enforces the value/timestamp invariants; the raw struct
//! literal is left public for consumers that deserialize already-validated
//! series.

use serde::{Deserialize, Serialize};

use crate::errors::IngestError;

/// A single observation: canonical epoch seconds and a finite value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since epoch in the fixed reference offset.
    #[serde(rename = "time")]
    pub timestamp: i64,
    pub value: f64,
}

impl Sample {
    /// Create a validated sample.
    pub fn new(timestamp: i64, value: f64) -> Result<Self, IngestError> {
        if !value.is_finite() {
            return Err(IngestError::InvalidValue {
                raw: value.to_string(),
            });
        }
        if timestamp < 0 {
            return Err(IngestError::InvalidTimestamp {
                raw: timestamp.to_string(),
            });
        }
        Ok(Self { timestamp, value })
    }

    /// Whether this sample satisfies the series invariants.
    pub fn is_valid(&self) -> bool {
        self.value.is_finite() && self.timestamp >= 0
    }
}

/// Whether a slice of samples is non-decreasing by timestamp.
pub fn is_time_ordered(points: &[Sample]) -> bool {
    points.windows(2).all(|w| w[0].timestamp <= w[1].timestamp)
}

/// Parse a numeric reading, tolerating decorative brackets and quotes
/// around a bare number (`"[23.5]"`, `"\"23.5\""`).
pub fn parse_reading(raw: &str) -> Result<f64, IngestError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '"'))
        .collect();
    let trimmed = cleaned.trim();

    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(IngestError::InvalidValue {
            raw: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_creation() {
        let s = Sample::new(1_700_000_000, 23.5).unwrap();
        assert_eq!(s.timestamp, 1_700_000_000);
        assert_eq!(s.value, 23.5);
        assert!(s.is_valid());
    }

    #[test]
    fn test_sample_rejects_non_finite() {
        assert!(matches!(
            Sample::new(0, f64::NAN),
            Err(IngestError::InvalidValue { .. })
        ));
        assert!(matches!(
            Sample::new(0, f64::INFINITY),
            Err(IngestError::InvalidValue { .. })
        ));
        assert!(matches!(
            Sample::new(0, f64::NEG_INFINITY),
            Err(IngestError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_sample_rejects_negative_timestamp() {
        assert!(matches!(
            Sample::new(-1, 1.0),
            Err(IngestError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_sample_serializes_as_chart_point() {
        let s = Sample::new(650, 15.0).unwrap();
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"{"time":650,"value":15.0}"#);
    }

    #[test]
    fn test_is_time_ordered() {
        let ordered = [
            Sample::new(0, 1.0).unwrap(),
            Sample::new(0, 2.0).unwrap(),
            Sample::new(5, 3.0).unwrap(),
        ];
        assert!(is_time_ordered(&ordered));
        assert!(is_time_ordered(&[]));

        let unordered = [Sample::new(5, 1.0).unwrap(), Sample::new(4, 1.0).unwrap()];
        assert!(!is_time_ordered(&unordered));
    }

    #[test]
    fn test_parse_reading_decorated() {
        assert_eq!(parse_reading("[23.5]").unwrap(), 23.5);
        assert_eq!(parse_reading("\"42\"").unwrap(), 42.0);
        assert_eq!(parse_reading("[\"-1.25\"]").unwrap(), -1.25);
        assert_eq!(parse_reading("  7 ").unwrap(), 7.0);
    }

    #[test]
    fn test_parse_reading_rejects_garbage() {
        assert!(matches!(
            parse_reading("abc"),
            Err(IngestError::InvalidValue { .. })
        ));
        assert!(parse_reading("").is_err());
        assert!(parse_reading("[]").is_err());
        assert!(parse_reading("NaN").is_err());
        assert!(parse_reading("inf").is_err());
    }
}
