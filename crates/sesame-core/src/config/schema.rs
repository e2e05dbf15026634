//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Service endpoint address. Discovered from the environment when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Deadline applied to every operation, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_timeout_ms: Option<u64>,

    /// Transport session settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Alias of the collection new items are stored in.
    #[serde(default = "default_collection")]
    pub default_collection: String,

    /// Window identifier passed to the service when a prompt is shown.
    #[serde(default)]
    pub window_id: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: None,
            call_timeout_ms: None,
            session: SessionConfig::default(),
            default_collection: default_collection(),
            window_id: String::new(),
        }
    }
}

impl ClientConfig {
    /// Per-operation deadline, if configured.
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}

fn default_collection() -> String {
    "default".to_string()
}

/// Transport session configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Preferred session algorithm.
    #[serde(default)]
    pub algorithm: SessionAlgorithmPreference,

    /// Fall back to a plain session when the service refuses to key one.
    #[serde(default)]
    pub allow_plain_fallback: bool,
}

/// Which session algorithm to negotiate first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionAlgorithmPreference {
    /// Diffie-Hellman key agreement with AES-128-CBC transport encryption.
    #[default]
    Aes,
    /// Secrets travel unencrypted over the transport.
    Plain,
}
