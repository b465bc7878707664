//! Engine and channel configuration
//!
//! Loaded once at process start from a TOML file and read-only afterwards.
//! Every section is defaulted so a file only needs its `[[channels]]`
//! table; which collaborators are wired (historical loader, live
//! dispatcher) is decided here rather than by separate entry points.

use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use types::ids::ChannelId;
use types::time::TimeCanon;

use crate::downsample::DEFAULT_BUCKET_WIDTH_SECS;
use crate::records::RecordLayout;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no channels configured")]
    NoChannels,

    #[error("duplicate channel id: {0}")]
    DuplicateChannel(ChannelId),

    #[error("key {key:?} claimed by both {first} and {second}")]
    ConflictingKey {
        key: String,
        first: ChannelId,
        second: ChannelId,
    },

    #[error("history source must be either a url or a path, not both")]
    AmbiguousSource,

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Display metadata handed through to the visualization consumer.
///
/// Opaque to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayMeta {
    pub label: Option<String>,
    pub color: Option<String>,
}

/// One entry of the static channel table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: ChannelId,
    /// Live feed naming (publish/subscribe topic).
    #[serde(default)]
    pub topic: Option<String>,
    /// Historical dataset naming (CSV column or key).
    #[serde(default)]
    pub dataset_key: Option<String>,
    /// Any further keys that resolve to this channel.
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub display: DisplayMeta,
}

impl ChannelConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: ChannelId::new(id),
            topic: None,
            dataset_key: None,
            aliases: Vec::new(),
            display: DisplayMeta::default(),
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_dataset_key(mut self, key: impl Into<String>) -> Self {
        self.dataset_key = Some(key.into());
        self
    }

    /// Every key that resolves to this channel, the id included.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.id.as_str())
            .chain(self.topic.as_deref())
            .chain(self.dataset_key.as_deref())
            .chain(self.aliases.iter().map(String::as_str))
    }
}

/// Historical loader settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub url: Option<String>,
    pub path: Option<PathBuf>,
    pub bucket_width_secs: NonZeroU64,
    pub fetch_timeout_secs: u64,
    pub layout: RecordLayout,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: None,
            path: None,
            bucket_width_secs: NonZeroU64::new(DEFAULT_BUCKET_WIDTH_SECS)
                .unwrap_or(NonZeroU64::MIN),
            fetch_timeout_secs: 30,
            layout: RecordLayout::Auto,
        }
    }
}

impl HistoryConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Live dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub enabled: bool,
    /// Max live messages held while the historical load is pending.
    pub queue_capacity: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: 100_000,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub history: HistoryConfig,
    pub live: LiveConfig,
    pub time: TimeCanon,
    pub channels: Vec<ChannelConfig>,
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Structural checks. Key uniqueness is checked when the registry is
    /// built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }
        if self.history.url.is_some() && self.history.path.is_some() {
            return Err(ConfigError::AmbiguousSource);
        }
        if self.history.enabled && self.history.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "history.fetch_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.live.enabled && self.live.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "live.queue_capacity",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
