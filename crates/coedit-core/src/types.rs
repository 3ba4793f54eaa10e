//! Core types for the coedit protocol
//!
//! This module defines the fundamental types used throughout the protocol,
//! using newtype patterns for semantic validation and type safety.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Room Identifier
// ----------------------------------------------------------------------------

/// Opaque identifier for one collaboration session; all state partitions by it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Deref for RoomId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ----------------------------------------------------------------------------
// Participant Identifier
// ----------------------------------------------------------------------------

/// Display name of a participant. Not guaranteed globally unique; within a
/// room's presence set there is at most one live entry per name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ----------------------------------------------------------------------------
// Connection Identifier
// ----------------------------------------------------------------------------

/// Transport-assigned identifier for one live connection. A participant that
/// reconnects gets a new one; the presence tracker overwrites the old value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh connection identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a new timestamp
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Get current wall-clock timestamp
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    /// Get the raw milliseconds
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Get duration since another timestamp (saturating)
    pub fn duration_since(&self, other: Self) -> std::time::Duration {
        std::time::Duration::from_millis(self.0.saturating_sub(other.0))
    }
}

// ----------------------------------------------------------------------------
// Backend Kind
// ----------------------------------------------------------------------------

/// Identifies which transport backend a session is riding on.
///
/// Exactly one backend is active at a time per process; switching is a hard
/// cutover, never concurrent arbitration between kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Direct socket-style channel
    Socket,
    /// Topic-based publish/subscribe channel
    PubSub,
    /// Fully local simulated channel (always reachable)
    Local,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Socket => write!(f, "socket"),
            BackendKind::PubSub => write!(f, "pubsub"),
            BackendKind::Local => write!(f, "local"),
        }
    }
}

// ----------------------------------------------------------------------------
// Connection State
// ----------------------------------------------------------------------------

/// Lifecycle state of a transport session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

// ----------------------------------------------------------------------------
// Transport Session
// ----------------------------------------------------------------------------

/// Snapshot of one live transport session.
///
/// Owned by the transport; replaced wholesale (never mutated in place) on
/// reconnect or fallback so readers cannot observe a half-updated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSession {
    /// Which backend this session rides on
    pub backend: BackendKind,
    /// Current lifecycle state
    pub state: ConnectionState,
    /// Rooms this session is subscribed to
    pub rooms: BTreeSet<RoomId>,
}

impl TransportSession {
    /// Create a fresh, disconnected session for a backend.
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            state: ConnectionState::Disconnected,
            rooms: BTreeSet::new(),
        }
    }

    /// Copy of this session with the given state (wholesale replacement).
    pub fn with_state(&self, state: ConnectionState) -> Self {
        Self {
            backend: self.backend,
            state,
            rooms: self.rooms.clone(),
        }
    }

    /// Copy of this session with a room added.
    pub fn with_room(&self, room: RoomId) -> Self {
        let mut rooms = self.rooms.clone();
        rooms.insert(room);
        Self {
            backend: self.backend,
            state: self.state,
            rooms,
        }
    }

    /// Copy of this session with a room removed.
    pub fn without_room(&self, room: &RoomId) -> Self {
        let mut rooms = self.rooms.clone();
        rooms.remove(room);
        Self {
            backend: self.backend,
            state: self.state,
            rooms,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
