//! Config schema types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Default number of relay operations the bridge remembers.
pub const DEFAULT_HISTORY: usize = 500;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bridge: BridgeConfig,
    pub channels: ChannelsConfig,
    pub http: HttpConfig,
    pub metrics: MetricsConfig,
}

impl RelayConfig {
    /// Number of configured backend accounts across all services.
    #[must_use]
    pub fn account_count(&self) -> usize {
        self.channels.telegram.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Name the bridge reports for itself.
    pub name: String,
    /// Correlation log capacity.
    pub history: usize,
    /// Sent through the bridge once it starts, if set.
    pub greeting: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            name: "bridge".into(),
            history: DEFAULT_HISTORY,
            greeting: None,
        }
    }
}

/// Backend accounts, keyed by account id.
///
/// Account values stay untyped here and are deserialized by the backend
/// crate that owns them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub telegram: HashMap<String, serde_json::Value>,
}

/// HTTP server for relayed media (Telegram files, stickers and profile
/// photos). Each Telegram account is served under
/// `/telegram/<account>/media/`, which its `media_base_url` should point at.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// `host:port` to bind; no server when unset.
    pub listen: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// `host:port` for the Prometheus endpoint.
    pub listen: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let cfg: RelayConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.bridge.name, "bridge");
        assert_eq!(cfg.bridge.history, DEFAULT_HISTORY);
        assert!(cfg.bridge.greeting.is_none());
        assert_eq!(cfg.account_count(), 0);
        assert!(!cfg.metrics.enabled);
        assert!(cfg.http.listen.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg: RelayConfig = toml::from_str(
            r#"
            [bridge]
            greeting = "hello"

            [channels.telegram.main]
            token = "123:abc"
            chats = ["-100"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.bridge.name, "bridge");
        assert_eq!(cfg.bridge.greeting.as_deref(), Some("hello"));
        assert_eq!(cfg.channels.telegram["main"]["token"], "123:abc");
    }
}
