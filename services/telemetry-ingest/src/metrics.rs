//! Ingestion counters
//!
//! Every dropped unit of data is counted by reason so that a quiet chart
//! can be told apart from a feed full of rejected messages. Counters are
//! relaxed atomics shared by the loader, the gate and the dispatcher.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use types::errors::IngestError;

/// Outcome of the one-shot historical load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    NotRun = 0,
    Succeeded = 1,
    Failed = 2,
    Skipped = 3,
}

/// Core counters for the ingestion engine.
#[derive(Debug, Default)]
pub struct IngestMetrics {
    // Live path
    pub live_received: AtomicU64,
    pub live_accepted: AtomicU64,
    pub live_queued: AtomicU64,
    pub live_replayed: AtomicU64,

    // Rejections, live and historical
    pub unknown_channel: AtomicU64,
    pub invalid_value: AtomicU64,
    pub invalid_timestamp: AtomicU64,
    pub out_of_order: AtomicU64,
    pub queue_full: AtomicU64,
    pub malformed_rows: AtomicU64,

    // Historical path
    pub historical_rows: AtomicU64,
    pub historical_points: AtomicU64,
    pub seeded_points: AtomicU64,
    pub clipped_points: AtomicU64,
    pub load_outcome: AtomicU64,
    pub load_duration_ms: AtomicU64,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.live_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.live_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queued(&self) {
        self.live_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replayed(&self, count: u64) {
        self.live_replayed.fetch_add(count, Ordering::Relaxed);
    }

    /// Count a dropped unit of data under its taxonomy reason.
    pub fn record_rejection(&self, err: &IngestError) {
        let counter = match err {
            IngestError::UnknownChannel { .. } => &self.unknown_channel,
            IngestError::InvalidValue { .. } => &self.invalid_value,
            IngestError::InvalidTimestamp { .. } => &self.invalid_timestamp,
            IngestError::OutOfOrder { .. } => &self.out_of_order,
            IngestError::QueueFull { .. } => &self.queue_full,
            IngestError::MalformedRow { .. } => &self.malformed_rows,
            IngestError::SourceUnavailable { .. } => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_historical(&self, rows: u64, points: u64) {
        self.historical_rows.fetch_add(rows, Ordering::Relaxed);
        self.historical_points.fetch_add(points, Ordering::Relaxed);
    }

    pub fn record_seeded(&self, accepted: u64, clipped: u64) {
        self.seeded_points.fetch_add(accepted, Ordering::Relaxed);
        self.clipped_points.fetch_add(clipped, Ordering::Relaxed);
    }

    pub fn record_load(&self, outcome: LoadOutcome, duration_ms: u64) {
        self.load_outcome.store(outcome as u64, Ordering::Relaxed);
        self.load_duration_ms.store(duration_ms, Ordering::Relaxed);
    }

    pub fn load_outcome(&self) -> LoadOutcome {
        match self.load_outcome.load(Ordering::Relaxed) {
            1 => LoadOutcome::Succeeded,
            2 => LoadOutcome::Failed,
            3 => LoadOutcome::Skipped,
            _ => LoadOutcome::NotRun,
        }
    }

    /// Total rejections across all reasons.
    pub fn total_rejected(&self) -> u64 {
        [
            &self.unknown_channel,
            &self.invalid_value,
            &self.invalid_timestamp,
            &self.out_of_order,
            &self.queue_full,
        ]
        .iter()
        .map(|c| c.load(Ordering::Relaxed))
        .sum()
    }

    /// Export counters keyed by name, in a stable order.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert("live_received".to_string(), self.live_received.load(Ordering::Relaxed));
        m.insert("live_accepted".to_string(), self.live_accepted.load(Ordering::Relaxed));
        m.insert("live_queued".to_string(), self.live_queued.load(Ordering::Relaxed));
        m.insert("live_replayed".to_string(), self.live_replayed.load(Ordering::Relaxed));
        m.insert("unknown_channel".to_string(), self.unknown_channel.load(Ordering::Relaxed));
        m.insert("invalid_value".to_string(), self.invalid_value.load(Ordering::Relaxed));
        m.insert("invalid_timestamp".to_string(), self.invalid_timestamp.load(Ordering::Relaxed));
        m.insert("out_of_order".to_string(), self.out_of_order.load(Ordering::Relaxed));
        m.insert("queue_full".to_string(), self.queue_full.load(Ordering::Relaxed));
        m.insert("malformed_rows".to_string(), self.malformed_rows.load(Ordering::Relaxed));
        m.insert("historical_rows".to_string(), self.historical_rows.load(Ordering::Relaxed));
        m.insert("historical_points".to_string(), self.historical_points.load(Ordering::Relaxed));
        m.insert("seeded_points".to_string(), self.seeded_points.load(Ordering::Relaxed));
        m.insert("clipped_points".to_string(), self.clipped_points.load(Ordering::Relaxed));
        m.insert("load_outcome".to_string(), self.load_outcome.load(Ordering::Relaxed));
        m.insert("load_duration_ms".to_string(), self.load_duration_ms.load(Ordering::Relaxed));
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_counted_by_reason() {
        let metrics = IngestMetrics::new();
        metrics.record_rejection(&IngestError::UnknownChannel {
            key: "x".to_string(),
        });
        metrics.record_rejection(&IngestError::OutOfOrder {
            timestamp: 1,
            tail: 2,
        });
        metrics.record_rejection(&IngestError::OutOfOrder {
            timestamp: 1,
            tail: 2,
        });

        let exported = metrics.export();
        assert_eq!(exported["unknown_channel"], 1);
        assert_eq!(exported["out_of_order"], 2);
        assert_eq!(metrics.total_rejected(), 3);
    }

    #[test]
    fn test_source_unavailable_not_a_rejection() {
        let metrics = IngestMetrics::new();
        metrics.record_rejection(&IngestError::SourceUnavailable {
            reason: "timeout".to_string(),
        });
        assert_eq!(metrics.total_rejected(), 0);
    }

    #[test]
    fn test_load_outcome_roundtrip() {
        let metrics = IngestMetrics::new();
        assert_eq!(metrics.load_outcome(), LoadOutcome::NotRun);

        metrics.record_load(LoadOutcome::Failed, 1500);
        assert_eq!(metrics.load_outcome(), LoadOutcome::Failed);
        assert_eq!(metrics.export()["load_duration_ms"], 1500);
    }

    #[test]
    fn test_export_contains_all_counters() {
        let metrics = IngestMetrics::new();
        metrics.record_received();
        metrics.record_accepted();
        metrics.record_queued();
        metrics.record_replayed(4);
        metrics.record_historical(10, 90);
        metrics.record_seeded(7, 2);
        metrics.record_rejection(&IngestError::MalformedRow {
            line: 7,
            reason: "expected 3 fields, found 2".to_string(),
        });

        let exported = metrics.export();
        assert_eq!(exported.len(), 16);
        assert_eq!(exported["live_replayed"], 4);
        assert_eq!(exported["historical_points"], 90);
        assert_eq!(exported["seeded_points"], 7);
        assert_eq!(exported["clipped_points"], 2);
        assert_eq!(exported["malformed_rows"], 1);
    }
}
