//! Centralized configuration management
//!
//! Consolidates the tunables of every component into one [`CoeditConfig`]
//! so sessions, transports and tests share a single consistent interface.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Transport Configuration
// ----------------------------------------------------------------------------

/// Configuration for transport selection and fallback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// How long to wait for a "connected" acknowledgment before discarding
    /// the attempt and falling back to the next backend
    pub connect_timeout: Duration,
    /// Retry interval for the reconnection timer a backend may register
    pub reconnect_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            reconnect_interval: Duration::from_secs(5),
        }
    }
}

impl TransportConfig {
    /// Create configuration optimized for testing (fast fallback)
    pub fn testing() -> Self {
        Self {
            connect_timeout: Duration::from_millis(50),
            reconnect_interval: Duration::from_millis(100),
        }
    }
}

// ----------------------------------------------------------------------------
// Engine Configuration
// ----------------------------------------------------------------------------

/// Configuration for the code convergence engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum spacing between two outbound code broadcasts for one room.
    /// Updates arriving inside the window are dropped, not queued.
    pub broadcast_min_interval: Duration,
    /// How long locally-originated change notifications are ignored after a
    /// remote value is applied to the widget
    pub suppression_window: Duration,
    /// How long to wait for a sync-response before treating the room as empty
    pub sync_wait: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            broadcast_min_interval: Duration::from_millis(300),
            suppression_window: Duration::from_millis(50),
            sync_wait: Duration::from_secs(2),
        }
    }
}

impl EngineConfig {
    /// Create configuration optimized for testing (short windows)
    pub fn testing() -> Self {
        Self {
            broadcast_min_interval: Duration::from_millis(40),
            suppression_window: Duration::from_millis(10),
            sync_wait: Duration::from_millis(80),
        }
    }
}

// ----------------------------------------------------------------------------
// Presence Configuration
// ----------------------------------------------------------------------------

/// Configuration for presence tracking and reconciliation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Interval of the periodic reconciliation sweep that re-announces this
    /// participant and lets an authoritative roster overwrite local drift
    pub reconcile_interval: Duration,
    /// Age past which an entry is reported stale by `is_stale` (informational
    /// only; nothing evicts on it)
    pub stale_after: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(5),
            stale_after: Duration::from_secs(30),
        }
    }
}

impl PresenceConfig {
    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            reconcile_interval: Duration::from_millis(60),
            stale_after: Duration::from_millis(200),
        }
    }
}

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the CSP channels wiring a session together
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Buffer size for command channels (caller -> session loop)
    pub command_buffer_size: usize,
    /// Buffer size for the transport inbox (transport -> session loop)
    pub inbox_buffer_size: usize,
    /// Buffer size for outward session events (session loop -> caller)
    pub session_event_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,       // local edits are keystroke-paced
            inbox_buffer_size: 128,        // network traffic can be bursty
            session_event_buffer_size: 64, // UI updates need responsiveness
        }
    }
}

// ----------------------------------------------------------------------------
// Master Configuration
// ----------------------------------------------------------------------------

/// Master configuration consolidating every coedit component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoeditConfig {
    pub transport: TransportConfig,
    pub engine: EngineConfig,
    pub presence: PresenceConfig,
    pub channels: ChannelConfig,
}

impl CoeditConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration optimized for testing: millisecond-scale
    /// timeouts and throttle windows so scenarios finish quickly.
    pub fn testing() -> Self {
        Self {
            transport: TransportConfig::testing(),
            engine: EngineConfig::testing(),
            presence: PresenceConfig::testing(),
            channels: ChannelConfig::default(),
        }
    }

    /// Validate the configuration for consistency and feasibility
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.channels.command_buffer_size == 0 {
            return Err("Command buffer size cannot be zero".into());
        }
        if self.channels.inbox_buffer_size == 0 {
            return Err("Inbox buffer size cannot be zero".into());
        }
        if self.channels.session_event_buffer_size == 0 {
            return Err("Session event buffer size cannot be zero".into());
        }
        if self.transport.connect_timeout.is_zero() {
            return Err("Connect timeout cannot be zero".into());
        }
        if self.engine.broadcast_min_interval.is_zero() {
            return Err("Broadcast throttle interval cannot be zero".into());
        }
        if self.engine.suppression_window >= self.engine.sync_wait {
            return Err("Suppression window should be shorter than the sync wait".into());
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(CoeditConfig::default().validate().is_ok());
    }

    #[test]
    fn test_testing_config_validates_and_is_fast() {
        let config = CoeditConfig::testing();
        assert!(config.validate().is_ok());
        assert!(config.transport.connect_timeout < TransportConfig::default().connect_timeout);
        assert!(
            config.engine.broadcast_min_interval
                < EngineConfig::default().broadcast_min_interval
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = CoeditConfig::default();
        config.channels.inbox_buffer_size = 0;
        assert!(config.validate().is_err());

        let mut config = CoeditConfig::default();
        config.engine.suppression_window = Duration::from_secs(10);
        assert!(config.validate().is_err());
    }
}
