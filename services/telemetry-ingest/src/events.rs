//! Event definitions for the ingestion engine
//!
//! `SeriesUpdate` is what observers receive from the series store: the
//! full batch after a seed, a single sample after an append, never the
//! whole series again. `LiveMessage` is one delivery from the live feed.

use serde::{Deserialize, Serialize};
use types::ids::ChannelId;
use types::sample::Sample;
use types::time::utc_now;

/// Delta published to series observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SeriesUpdate {
    /// A historical batch was seeded (or appended after a late seed).
    Seeded {
        channel: ChannelId,
        points: Vec<Sample>,
    },
    /// One live sample became the new tail.
    Appended { channel: ChannelId, sample: Sample },
}

impl SeriesUpdate {
    pub fn channel(&self) -> &ChannelId {
        match self {
            SeriesUpdate::Seeded { channel, .. } => channel,
            SeriesUpdate::Appended { channel, .. } => channel,
        }
    }

    /// Number of samples carried by this delta.
    pub fn len(&self) -> usize {
        match self {
            SeriesUpdate::Seeded { points, .. } => points.len(),
            SeriesUpdate::Appended { .. } => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Label for logging.
    pub fn kind_label(&self) -> &'static str {
        match self {
            SeriesUpdate::Seeded { .. } => "Seeded",
            SeriesUpdate::Appended { .. } => "Appended",
        }
    }
}

/// A `(channel key, payload)` delivery from the publish/subscribe feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveMessage {
    /// Topic name as delivered by the feed.
    pub channel_key: String,
    /// Raw payload text.
    pub payload: String,
    /// UTC epoch seconds when the message was received.
    pub received_at: i64,
}

impl LiveMessage {
    /// Stamp a delivery with the current receipt time.
    pub fn new(channel_key: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::received_at(channel_key, payload, utc_now())
    }

    pub fn received_at(
        channel_key: impl Into<String>,
        payload: impl Into<String>,
        received_at: i64,
    ) -> Self {
        Self {
            channel_key: channel_key.into(),
            payload: payload.into(),
            received_at,
        }
    }
}
