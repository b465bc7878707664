//! Live ingestion dispatcher
//!
//! Turns one feed delivery into at most one appended sample. Each message
//! is independent: a bad payload, an unknown topic or a stale timestamp
//! drops that message only, with a warning and a counter bump.

use std::sync::Arc;

use tracing::{debug, warn};
use types::errors::IngestError;
use types::sample::{parse_reading, Sample};
use types::time::{utc_now, TimeCanon};

use crate::events::LiveMessage;
use crate::metrics::IngestMetrics;
use crate::registry::ChannelRegistry;
use crate::series::SeriesStore;

pub struct LiveDispatcher {
    registry: Arc<ChannelRegistry>,
    store: Arc<SeriesStore>,
    canon: TimeCanon,
    metrics: Arc<IngestMetrics>,
}

impl LiveDispatcher {
    pub fn new(
        registry: Arc<ChannelRegistry>,
        store: Arc<SeriesStore>,
        canon: TimeCanon,
        metrics: Arc<IngestMetrics>,
    ) -> Self {
        Self {
            registry,
            store,
            canon,
            metrics,
        }
    }

    /// Handle one delivery.
    ///
    /// `arrival_utc` is the receipt time in UTC epoch seconds; the current
    /// time is used when absent. Returns the appended sample.
    pub fn on_message(
        &self,
        channel_key: &str,
        payload: &str,
        arrival_utc: Option<i64>,
    ) -> Result<Sample, IngestError> {
        self.metrics.record_received();
        self.handle(channel_key, payload, arrival_utc)
    }

    /// Handle a queued or forwarded message using its recorded receipt time.
    ///
    /// The message was counted as received when the gate admitted it.
    pub fn dispatch(&self, message: &LiveMessage) -> Result<Sample, IngestError> {
        self.handle(
            &message.channel_key,
            &message.payload,
            Some(message.received_at),
        )
    }

    fn handle(
        &self,
        channel_key: &str,
        payload: &str,
        arrival_utc: Option<i64>,
    ) -> Result<Sample, IngestError> {
        let result = self.try_append(channel_key, payload, arrival_utc);
        match &result {
            Ok(sample) => {
                self.metrics.record_accepted();
                debug!(
                    key = channel_key,
                    time = sample.timestamp,
                    value = sample.value,
                    "Live sample appended"
                );
            }
            Err(e) => {
                self.metrics.record_rejection(e);
                warn!(
                    key = channel_key,
                    reason = e.label(),
                    error = %e,
                    "Dropping live message"
                );
            }
        }
        result
    }

    fn try_append(
        &self,
        channel_key: &str,
        payload: &str,
        arrival_utc: Option<i64>,
    ) -> Result<Sample, IngestError> {
        let value = parse_reading(payload)?;
        let channel = self.registry.resolve(channel_key)?;
        let timestamp = self
            .canon
            .shift_utc(arrival_utc.unwrap_or_else(utc_now))?;

        let sample = Sample { timestamp, value };
        self.store.append(channel, sample)?;
        Ok(sample)
    }
}
