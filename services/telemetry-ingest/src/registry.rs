//! Channel registry
//!
//! Read-only lookup from any configured key (id, live topic, dataset
//! column, alias) to the canonical channel. Built once from the static
//! channel table; the live feed and the historical dataset use different
//! naming schemes and both resolve here in O(1).

use std::collections::{BTreeMap, HashMap};

use tracing::info;
use types::errors::IngestError;
use types::ids::ChannelId;

use crate::config::{ChannelConfig, ConfigError, DisplayMeta};

/// Registered channel with its naming and display metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub topic: Option<String>,
    pub dataset_key: Option<String>,
    pub display: DisplayMeta,
}

/// Immutable key → channel table.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    /// BTreeMap for deterministic iteration.
    channels: BTreeMap<ChannelId, ChannelInfo>,
    keys: HashMap<String, ChannelId>,
}

impl ChannelRegistry {
    /// Build the registry, rejecting duplicate ids and keys that would
    /// resolve to two different channels.
    pub fn from_config(entries: &[ChannelConfig]) -> Result<Self, ConfigError> {
        let mut channels = BTreeMap::new();
        let mut keys: HashMap<String, ChannelId> = HashMap::new();

        for entry in entries {
            if channels.contains_key(&entry.id) {
                return Err(ConfigError::DuplicateChannel(entry.id.clone()));
            }

            for key in entry.keys() {
                match keys.get(key) {
                    Some(owner) if owner != &entry.id => {
                        return Err(ConfigError::ConflictingKey {
                            key: key.to_string(),
                            first: owner.clone(),
                            second: entry.id.clone(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        keys.insert(key.to_string(), entry.id.clone());
                    }
                }
            }

            channels.insert(
                entry.id.clone(),
                ChannelInfo {
                    id: entry.id.clone(),
                    topic: entry.topic.clone(),
                    dataset_key: entry.dataset_key.clone(),
                    display: entry.display.clone(),
                },
            );
        }

        info!(
            channels = channels.len(),
            keys = keys.len(),
            "ChannelRegistry initialized"
        );

        Ok(Self { channels, keys })
    }

    /// Resolve a raw key from either naming scheme.
    pub fn resolve(&self, key: &str) -> Result<&ChannelId, IngestError> {
        self.keys.get(key).ok_or_else(|| IngestError::UnknownChannel {
            key: key.to_string(),
        })
    }

    pub fn display(&self, id: &ChannelId) -> Option<&DisplayMeta> {
        self.channels.get(id).map(|c| &c.display)
    }

    /// Channel ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &ChannelId> {
        self.channels.keys()
    }

    /// Topics to subscribe to on the live feed.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.channels.values().filter_map(|c| c.topic.as_deref())
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entries() -> Vec<ChannelConfig> {
        vec![
            ChannelConfig::new("temperatura_tablero")
                .with_topic("sensor/temperatura/tablero")
                .with_dataset_key("temp_tablero"),
            ChannelConfig::new("torque").with_topic("inomax/torque"),
        ]
    }

    #[test]
    fn test_resolve_both_naming_schemes() {
        let registry = ChannelRegistry::from_config(&sample_entries()).unwrap();

        let by_topic = registry.resolve("sensor/temperatura/tablero").unwrap();
        let by_column = registry.resolve("temp_tablero").unwrap();
        let by_id = registry.resolve("temperatura_tablero").unwrap();

        assert_eq!(by_topic, by_column);
        assert_eq!(by_topic, by_id);
        assert_eq!(by_topic.as_str(), "temperatura_tablero");
    }

    #[test]
    fn test_unknown_key() {
        let registry = ChannelRegistry::from_config(&sample_entries()).unwrap();
        let err = registry.resolve("sensor/unknown").unwrap_err();
        assert_eq!(
            err,
            IngestError::UnknownChannel {
                key: "sensor/unknown".to_string()
            }
        );
    }

    #[test]
    fn test_resolution_is_exact() {
        let registry = ChannelRegistry::from_config(&sample_entries()).unwrap();
        assert!(registry.resolve("INOMAX/TORQUE").is_err());
        assert!(registry.resolve(" inomax/torque").is_err());
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let entries = vec![ChannelConfig::new("torque"), ChannelConfig::new("torque")];
        let result = ChannelRegistry::from_config(&entries);
        assert!(matches!(result, Err(ConfigError::DuplicateChannel(_))));
    }

    #[test]
    fn test_conflicting_key_rejected() {
        let entries = vec![
            ChannelConfig::new("a").with_topic("shared"),
            ChannelConfig::new("b").with_dataset_key("shared"),
        ];
        match ChannelRegistry::from_config(&entries) {
            Err(ConfigError::ConflictingKey { key, first, second }) => {
                assert_eq!(key, "shared");
                assert_eq!(first.as_str(), "a");
                assert_eq!(second.as_str(), "b");
            }
            other => panic!("Expected ConflictingKey, got {:?}", other),
        }
    }

    #[test]
    fn test_same_key_twice_on_one_channel_is_fine() {
        let entries = vec![ChannelConfig::new("torque")
            .with_topic("torque")
            .with_dataset_key("torque")];
        let registry = ChannelRegistry::from_config(&entries).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.resolve("torque").is_ok());
    }

    #[test]
    fn test_ids_sorted_and_topics_listed() {
        let registry = ChannelRegistry::from_config(&sample_entries()).unwrap();
        let ids: Vec<&str> = registry.ids().map(ChannelId::as_str).collect();
        assert_eq!(ids, vec!["temperatura_tablero", "torque"]);

        let topics: Vec<&str> = registry.topics().collect();
        assert_eq!(topics, vec!["sensor/temperatura/tablero", "inomax/torque"]);
    }

    #[test]
    fn test_display_metadata_carried() {
        let mut entry = ChannelConfig::new("control");
        entry.display.color = Some("#FFA500".to_string());
        let registry = ChannelRegistry::from_config(&[entry]).unwrap();

        let display = registry.display(&ChannelId::new("control")).unwrap();
        assert_eq!(display.color.as_deref(), Some("#FFA500"));
        assert!(registry.display(&ChannelId::new("missing")).is_none());
    }
}
