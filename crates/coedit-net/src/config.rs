//! Configuration for the networked transport backends

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use coedit_core::errors::{CoeditError, Result};

/// Connection settings shared by both networked backends: the endpoint, how
/// long a connect attempt may take before the fallback chain moves on, and
/// the reconnection timer an established session runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// WebSocket endpoint URL (`ws://` or `wss://`)
    pub url: String,
    /// Bound on the whole connect attempt, handshake included
    pub connect_timeout: Duration,
    /// Tick interval of the auto-reconnect timer
    pub reconnect_interval: Duration,
    /// Whether a dropped connection is re-dialed in the background
    pub auto_reconnect: bool,
}

impl EndpointConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(3),
            reconnect_interval: Duration::from_secs(5),
            auto_reconnect: true,
        }
    }

    /// Create configuration optimized for testing (fast timeouts, no
    /// background re-dialing)
    pub fn testing(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_millis(100),
            reconnect_interval: Duration::from_millis(100),
            auto_reconnect: false,
        }
    }

    /// Validate the endpoint URL
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url)
            .map_err(|e| CoeditError::config_error(format!("invalid endpoint URL: {e}")))?;
        match url.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(CoeditError::config_error(format!(
                "unsupported endpoint scheme '{other}', expected ws or wss"
            ))),
        }
    }
}

/// Configuration for both networked backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetConfig {
    /// Direct socket-style channel endpoint
    pub socket: EndpointConfig,
    /// Topic-based pub/sub channel endpoint
    pub pubsub: EndpointConfig,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            socket: EndpointConfig::new("ws://127.0.0.1:9880/sync"),
            pubsub: EndpointConfig::new("ws://127.0.0.1:9881/topics"),
        }
    }
}

impl NetConfig {
    pub fn validate(&self) -> Result<()> {
        self.socket.validate()?;
        self.pubsub.validate()
    }
}
