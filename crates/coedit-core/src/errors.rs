//! Error types for the coedit engine
//!
//! Transport errors and engine errors are kept as separate enums and unified
//! under [`CoeditError`]. Connection failures are recovered locally by
//! falling back to the simulated transport and never surface as fatal;
//! nothing in this taxonomy should terminate a session or lose local edits.

use crate::types::{BackendKind, RoomId};

// ----------------------------------------------------------------------------
// Transport Errors
// ----------------------------------------------------------------------------

/// Errors raised by transport backends
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection to {backend} failed: {reason}")]
    ConnectionFailed { backend: BackendKind, reason: String },

    #[error("Connection to {backend} timed out after {duration_ms}ms")]
    Timeout { backend: BackendKind, duration_ms: u64 },

    #[error("Transport {backend} is not available")]
    Unavailable { backend: BackendKind },

    #[error("Subscribe to room {room} failed: {reason}")]
    SubscriptionFailed { room: RoomId, reason: String },

    #[error("Send failed: {reason}")]
    SendFailed { reason: String },

    #[error("Not connected to any backend")]
    NotConnected,

    #[error("Network I/O error: {0}")]
    NetworkIo(#[from] std::io::Error),

    #[error("Transport shut down: {reason}")]
    Shutdown { reason: String },
}

// ----------------------------------------------------------------------------
// Engine Errors
// ----------------------------------------------------------------------------

/// Errors raised by the convergence engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Applying a remote snapshot to the widget failed. The suppression
    /// window still runs its course, so the engine is never stuck Suppressed.
    #[error("Applying remote snapshot to room {room} failed: {reason}")]
    ApplyFailed { room: RoomId, reason: String },
}

// ----------------------------------------------------------------------------
// Unified Error
// ----------------------------------------------------------------------------

/// Core error type for the coedit protocol
#[derive(Debug, thiserror::Error)]
pub enum CoeditError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Channel communication error (internal to the CSP architecture)
    #[error("Channel error: {message}")]
    Channel { message: String },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl CoeditError {
    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        CoeditError::Channel {
            message: message.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        CoeditError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a transport connection failed error
    pub fn connection_failed<R: Into<String>>(backend: BackendKind, reason: R) -> Self {
        CoeditError::Transport(TransportError::ConnectionFailed {
            backend,
            reason: reason.into(),
        })
    }

    /// Create a send failed error
    pub fn send_failed<R: Into<String>>(reason: R) -> Self {
        CoeditError::Transport(TransportError::SendFailed {
            reason: reason.into(),
        })
    }

    /// Create an apply-failed engine error
    pub fn apply_failed<R: Into<String>>(room: RoomId, reason: R) -> Self {
        CoeditError::Engine(EngineError::ApplyFailed {
            room,
            reason: reason.into(),
        })
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = std::result::Result<T, CoeditError>;
