//! Historical loader
//!
//! One-shot bulk seed of every channel at startup:
//! fetch (bounded by a timeout) → parse → resolve → canonicalize →
//! group per channel → sort → downsample → seed.
//!
//! Bad records are dropped and counted; only a failure to obtain a usable
//! dataset at all aborts the load, and even then the engine carries on
//! live-only.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};
use types::errors::IngestError;
use types::ids::ChannelId;
use types::sample::{parse_reading, Sample};
use types::time::TimeCanon;

use crate::config::{EngineConfig, HistoryConfig};
use crate::downsample::downsample;
use crate::metrics::{IngestMetrics, LoadOutcome};
use crate::records::{parse_records, RecordLayout};
use crate::registry::ChannelRegistry;
use crate::series::SeriesStore;
use crate::source::RecordSource;

/// Loader settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    pub bucket_width: NonZeroU64,
    pub fetch_timeout: Duration,
    pub layout: RecordLayout,
    pub canon: TimeCanon,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::from_history(&HistoryConfig::default(), TimeCanon::default())
    }
}

impl LoaderConfig {
    pub fn from_history(history: &HistoryConfig, canon: TimeCanon) -> Self {
        Self {
            bucket_width: history.bucket_width_secs,
            fetch_timeout: history.fetch_timeout(),
            layout: history.layout,
            canon,
        }
    }

    pub fn from_engine(config: &EngineConfig) -> Self {
        Self::from_history(&config.history, config.time)
    }
}

/// What a load did, record by record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub rows_read: u64,
    pub malformed_rows: u64,
    pub unknown_channel: u64,
    pub invalid_value: u64,
    pub invalid_timestamp: u64,
    /// Valid points per channel before downsampling.
    pub raw_points: BTreeMap<ChannelId, usize>,
    /// Points that landed in each channel's series.
    pub seeded_points: BTreeMap<ChannelId, usize>,
    /// Points dropped by a late seed.
    pub clipped_points: usize,
    pub elapsed_ms: u64,
}

impl LoadReport {
    /// Records dropped before grouping.
    pub fn dropped_records(&self) -> u64 {
        self.unknown_channel + self.invalid_value + self.invalid_timestamp
    }

    pub fn total_raw_points(&self) -> usize {
        self.raw_points.values().sum()
    }

    pub fn total_seeded(&self) -> usize {
        self.seeded_points.values().sum()
    }
}

/// Fetches, prepares and seeds the historical dataset.
pub struct HistoricalLoader {
    registry: Arc<ChannelRegistry>,
    config: LoaderConfig,
    metrics: Arc<IngestMetrics>,
}

impl HistoricalLoader {
    pub fn new(
        registry: Arc<ChannelRegistry>,
        config: LoaderConfig,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        info!(
            bucket_width_secs = config.bucket_width.get(),
            fetch_timeout_secs = config.fetch_timeout.as_secs(),
            layout = ?config.layout,
            "HistoricalLoader initialized"
        );
        Self {
            registry,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Fetch the dataset text within the configured timeout.
    pub async fn fetch(&self, source: &dyn RecordSource) -> Result<String, IngestError> {
        let origin = source.describe();
        debug!(source = %origin, "Fetching historical dataset");

        match timeout(self.config.fetch_timeout, source.fetch_text()).await {
            Ok(Ok(text)) => {
                debug!(source = %origin, bytes = text.len(), "Historical dataset fetched");
                Ok(text)
            }
            Ok(Err(e)) => Err(IngestError::SourceUnavailable {
                reason: format!("{origin}: {e}"),
            }),
            Err(_) => Err(IngestError::SourceUnavailable {
                reason: format!(
                    "{origin}: timed out after {}s",
                    self.config.fetch_timeout.as_secs()
                ),
            }),
        }
    }

    /// Turn dataset text into one sorted, downsampled batch per channel.
    ///
    /// Per-record drops are tallied in `report`. Channels without a single
    /// valid point are absent from the result.
    pub fn prepare(
        &self,
        text: &str,
        report: &mut LoadReport,
    ) -> Result<BTreeMap<ChannelId, Vec<Sample>>, IngestError> {
        let parsed = parse_records(text, self.config.layout)?;
        report.rows_read += parsed.rows_read;
        report.malformed_rows += parsed.malformed_rows;
        for err in &parsed.skipped {
            self.metrics.record_rejection(err);
        }

        let mut groups: BTreeMap<ChannelId, Vec<Sample>> = BTreeMap::new();
        let mut unknown_keys: BTreeSet<String> = BTreeSet::new();

        for record in parsed.records {
            let channel = match self.registry.resolve(&record.key) {
                Ok(id) => id,
                Err(e) => {
                    report.unknown_channel += 1;
                    self.metrics.record_rejection(&e);
                    if unknown_keys.insert(record.key.clone()) {
                        warn!(key = %record.key, line = record.line, "Dropping records for unknown dataset key");
                    }
                    continue;
                }
            };

            let timestamp = match self.config.canon.parse_historical(&record.timestamp) {
                Ok(t) => t,
                Err(e) => {
                    report.invalid_timestamp += 1;
                    self.metrics.record_rejection(&e);
                    debug!(line = record.line, raw = %record.timestamp, "Dropping record with invalid timestamp");
                    continue;
                }
            };

            let value = match parse_reading(&record.value) {
                Ok(v) => v,
                Err(e) => {
                    report.invalid_value += 1;
                    self.metrics.record_rejection(&e);
                    debug!(line = record.line, raw = %record.value, "Dropping record with invalid value");
                    continue;
                }
            };

            groups
                .entry(channel.clone())
                .or_default()
                .push(Sample { timestamp, value });
        }

        if report.invalid_timestamp > 0 || report.invalid_value > 0 {
            warn!(
                invalid_timestamp = report.invalid_timestamp,
                invalid_value = report.invalid_value,
                "Dropped historical records with unusable fields"
            );
        }

        let mut batches = BTreeMap::new();
        for (channel, mut points) in groups {
            // stable: equal timestamps keep source order
            points.sort_by_key(|s| s.timestamp);
            report.raw_points.insert(channel.clone(), points.len());
            let reduced = downsample(&points, self.config.bucket_width);
            debug!(
                channel = %channel,
                raw = points.len(),
                downsampled = reduced.len(),
                "Channel history prepared"
            );
            batches.insert(channel, reduced);
        }

        Ok(batches)
    }

    /// Run the full load against `store`.
    ///
    /// On `Err` nothing was seeded; the caller continues live-only.
    pub async fn load(
        &self,
        source: &dyn RecordSource,
        store: &SeriesStore,
    ) -> Result<LoadReport, IngestError> {
        let started = Instant::now();

        let result = match self.fetch(source).await {
            Ok(text) => {
                let mut report = LoadReport::default();
                self.prepare(&text, &mut report).map(|batches| (report, batches))
            }
            Err(e) => Err(e),
        };

        let (mut report, batches) = match result {
            Ok(prepared) => prepared,
            Err(e) => {
                let elapsed_ms = elapsed_ms(started);
                self.metrics.record_load(LoadOutcome::Failed, elapsed_ms);
                error!(error = %e, elapsed_ms, "Historical load abandoned; continuing live-only");
                return Err(e);
            }
        };

        for (channel, points) in batches {
            match store.seed(&channel, points) {
                Ok(seed) => {
                    report.seeded_points.insert(channel, seed.accepted);
                    report.clipped_points += seed.clipped;
                }
                Err(reason) => {
                    warn!(channel = %channel, reason = reason.label(), "Seed rejected");
                }
            }
        }

        report.elapsed_ms = elapsed_ms(started);
        self.metrics
            .record_historical(report.rows_read, report.total_raw_points() as u64);
        self.metrics
            .record_seeded(report.total_seeded() as u64, report.clipped_points as u64);
        self.metrics
            .record_load(LoadOutcome::Succeeded, report.elapsed_ms);

        info!(
            rows = report.rows_read,
            malformed = report.malformed_rows,
            dropped = report.dropped_records(),
            channels = report.seeded_points.len(),
            seeded = report.total_seeded(),
            clipped = report.clipped_points,
            elapsed_ms = report.elapsed_ms,
            "Historical load complete"
        );

        Ok(report)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
