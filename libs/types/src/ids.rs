//! Identifier types for telemetry entities
//!
//! Channels are defined once at process start and never renamed, so the
//! identifier is a plain interned-by-convention string.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of one logical measurement stream.
///
/// Ordered so per-channel maps iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Create a new ChannelId.
    ///
    /// # Panics
    /// Panics if the identifier is empty or only whitespace
    pub fn new(id: impl Into<String>) -> Self {
        let s = id.into();
        assert!(!s.trim().is_empty(), "ChannelId must not be empty");
        Self(s)
    }

    /// Try to create a ChannelId, returning None if empty
    pub fn try_new(id: impl Into<String>) -> Option<Self> {
        let s = id.into();
        if s.trim().is_empty() {
            None
        } else {
            Some(Self(s))
        }
    }

    /// Get the identifier string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_id_creation() {
        let id = ChannelId::new("torque");
        assert_eq!(id.as_str(), "torque");
        assert_eq!(id.to_string(), "torque");
    }

    #[test]
    fn test_channel_id_try_new_rejects_blank() {
        assert!(ChannelId::try_new("").is_none());
        assert!(ChannelId::try_new("   ").is_none());
        assert!(ChannelId::try_new("frecuencia").is_some());
    }

    #[test]
    #[should_panic(expected = "ChannelId must not be empty")]
    fn test_channel_id_new_panics_on_empty() {
        let _ = ChannelId::new("");
    }

    #[test]
    fn test_channel_id_serialization() {
        let id = ChannelId::new("busdevoltaje");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"busdevoltaje\"");
        let back: ChannelId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_channel_id_ordering() {
        let mut ids = vec![ChannelId::new("b"), ChannelId::new("a"), ChannelId::new("c")];
        ids.sort();
        assert_eq!(ids[0].as_str(), "a");
        assert_eq!(ids[2].as_str(), "c");
    }
}
