//! Channel configuration.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use tabsync_core::InstanceId;

use crate::error::{Result, SyncError};

/// Channel name used when none is configured.
pub const DEFAULT_CHANNEL_NAME: &str = "state_channel";

/// Configuration for one channel manager.
///
/// Deserializes from the camelCase JSON shape used by host pages, with
/// durations in milliseconds:
///
/// ```json
/// { "channelName": "todos", "syncTimeout": 3000, "retryAttempts": 5, "retryDelay": 1000 }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChannelConfig {
    /// Routing namespace; only peers on the same name see each other.
    pub channel_name: String,
    /// How long to wait for a RESPONSE before retrying.
    #[serde(deserialize_with = "duration_ms")]
    pub sync_timeout: Duration,
    /// Number of state REQUESTs issued before falling back to local state.
    pub retry_attempts: u32,
    /// Pause between a timed-out REQUEST and the next one.
    #[serde(deserialize_with = "duration_ms")]
    pub retry_delay: Duration,
    /// Fixed identity, for deterministic tests. Random when `None`.
    ///
    /// In JSON this is 32 hex digits; UUID text with hyphens is accepted.
    /// Other strings are rejected since identities are sixteen bytes.
    pub instance_id: Option<InstanceId>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            channel_name: DEFAULT_CHANNEL_NAME.to_string(),
            sync_timeout: Duration::from_millis(5000),
            retry_attempts: 3,
            retry_delay: Duration::from_millis(1000),
            instance_id: None,
        }
    }
}

impl ChannelConfig {
    /// Default config bound to a channel name.
    pub fn new(channel_name: impl Into<String>) -> Self {
        Self {
            channel_name: channel_name.into(),
            ..Default::default()
        }
    }

    pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = name.into();
        self
    }

    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_instance_id(mut self, id: InstanceId) -> Self {
        self.instance_id = Some(id);
        self
    }

    /// Parse from JSON, defaulting missing fields.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reject configurations a manager cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.channel_name.trim().is_empty() {
            return Err(SyncError::InvalidConfig("channel name is empty".into()));
        }
        if self.sync_timeout.is_zero() {
            return Err(SyncError::InvalidConfig("sync timeout must be non-zero".into()));
        }
        Ok(())
    }
}

fn duration_ms<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.channel_name, "state_channel");
        assert_eq!(config.sync_timeout, Duration::from_secs(5));
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert!(config.instance_id.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = ChannelConfig::from_json(r#"{ "channelName": "todos", "syncTimeout": 250 }"#)
            .unwrap();
        assert_eq!(config.channel_name, "todos");
        assert_eq!(config.sync_timeout, Duration::from_millis(250));
        assert_eq!(config.retry_attempts, 3);
    }

    #[test]
    fn test_from_json_instance_id() {
        let hex = "ab".repeat(16);
        let config = ChannelConfig::from_json(&format!(r#"{{ "instanceId": "{hex}" }}"#)).unwrap();
        assert_eq!(config.instance_id, Some(InstanceId::from_bytes([0xab; 16])));
    }

    #[test]
    fn test_from_json_uuid_instance_id() {
        let config = ChannelConfig::from_json(
            r#"{ "instanceId": "6f1c2b3a-0d4e-4f5a-9b6c-7d8e9f0a1b2c" }"#,
        )
        .unwrap();
        assert_eq!(
            config.instance_id.map(|id| id.to_hex()).as_deref(),
            Some("6f1c2b3a0d4e4f5a9b6c7d8e9f0a1b2c")
        );
        assert!(ChannelConfig::from_json(r#"{ "instanceId": "tab-1" }"#).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let config = ChannelConfig::new("  ");
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = ChannelConfig::default().with_sync_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
    }
}
