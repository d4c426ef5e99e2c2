//! Configuration for the offline sync engine.
//!
//! # Example
//!
//! ```
//! use offline_sync::OfflineSyncConfig;
//!
//! // Minimal config (uses defaults)
//! let config = OfflineSyncConfig::default();
//! assert_eq!(config.request_timeout_ms, 15_000);
//! assert_eq!(config.id_field, "_id");
//!
//! // Durable store on disk
//! let config = OfflineSyncConfig {
//!     store_path: Some("./offline_sync.db".into()),
//!     request_timeout_ms: 5_000,
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;
use serde::Deserialize;

/// Configuration for the offline sync engine.
///
/// All fields have defaults. Set `store_path` in production: without it the
/// engine falls back to an in-memory store and queued work does not survive a
/// restart.
#[derive(Debug, Clone, Deserialize)]
pub struct OfflineSyncConfig {
    /// SQLite file holding the cache and the pending action log
    #[serde(default)]
    pub store_path: Option<String>,

    /// Namespace for every key written to the store
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Bound on each remote API call; expiry counts as a network failure
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Field carrying the server-assigned id in records and `add` responses
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Pending log capacity. Appends beyond it fail visibly.
    #[serde(default = "default_max_pending_actions")]
    pub max_pending_actions: usize,

    /// Drain once at start when online and work is queued
    #[serde(default = "default_drain_on_start")]
    pub drain_on_start: bool,
}

fn default_key_prefix() -> String { "offline_sync".to_string() }
fn default_request_timeout_ms() -> u64 { 15_000 }
fn default_id_field() -> String { "_id".to_string() }
fn default_max_pending_actions() -> usize { 10_000 }
fn default_drain_on_start() -> bool { true }

impl Default for OfflineSyncConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            key_prefix: default_key_prefix(),
            request_timeout_ms: default_request_timeout_ms(),
            id_field: default_id_field(),
            max_pending_actions: default_max_pending_actions(),
            drain_on_start: default_drain_on_start(),
        }
    }
}

impl OfflineSyncConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: OfflineSyncConfig = serde_json::from_str("{}").unwrap();
        assert!(config.store_path.is_none());
        assert_eq!(config.key_prefix, "offline_sync");
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.max_pending_actions, 10_000);
        assert!(config.drain_on_start);
    }

    #[test]
    fn test_deserialize_overrides() {
        let config: OfflineSyncConfig = serde_json::from_str(
            r#"{"store_path": "/tmp/x.db", "id_field": "id", "request_timeout_ms": 500}"#,
        )
        .unwrap();
        assert_eq!(config.store_path.as_deref(), Some("/tmp/x.db"));
        assert_eq!(config.id_field, "id");
        assert_eq!(config.request_timeout(), Duration::from_millis(500));
    }
}
