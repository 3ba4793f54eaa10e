//! Wire messages exchanged between participants
//!
//! All traffic between peers is one closed enum, tagged by `kind` on the
//! wire, so adding a message kind is a compile-time-checked change rather
//! than a stringly-typed lookup. The wire format is JSON on every backend.

use serde::{Deserialize, Serialize};

use crate::types::{ConnectionId, ParticipantId, RoomId, Timestamp};

// ----------------------------------------------------------------------------
// Member Info
// ----------------------------------------------------------------------------

/// One entry in a full membership snapshot (`members-update`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub participant: ParticipantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionId>,
}

impl MemberInfo {
    pub fn new(participant: ParticipantId, connection: Option<ConnectionId>) -> Self {
        Self {
            participant,
            connection,
        }
    }
}

// ----------------------------------------------------------------------------
// Presence Action
// ----------------------------------------------------------------------------

/// Liveness signal carried by a `presence-update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresenceAction {
    Connected,
    Disconnected,
}

// ----------------------------------------------------------------------------
// Wire Message
// ----------------------------------------------------------------------------

/// Every message kind that crosses a transport.
///
/// The payload shapes mirror the protocol table: join, departed,
/// code-change, sync-request, sync-response, presence-update and
/// members-update. Every variant carries its room so any backend can route
/// it without out-of-band context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum WireMessage {
    /// Announce arrival; triggers membership fan-out.
    Join {
        room: RoomId,
        participant: ParticipantId,
    },
    /// Announce departure of a participant/connection.
    Departed {
        room: RoomId,
        participant: ParticipantId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        connection: Option<ConnectionId>,
    },
    /// Broadcast of an edited buffer (last-writer-wins).
    CodeChange {
        room: RoomId,
        text: String,
        author: ParticipantId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        revision: Option<Timestamp>,
    },
    /// Ask existing members for the current buffer.
    SyncRequest {
        room: RoomId,
        requestor: ParticipantId,
    },
    /// Answer to a sync-request carrying the authoritative current text.
    SyncResponse {
        room: RoomId,
        text: String,
        author: ParticipantId,
    },
    /// Lightweight liveness signal.
    PresenceUpdate {
        room: RoomId,
        participant: ParticipantId,
        action: PresenceAction,
    },
    /// Full membership snapshot, as a fan-out server would deliver it.
    MembersUpdate {
        room: RoomId,
        members: Vec<MemberInfo>,
    },
}

impl WireMessage {
    /// The room this message belongs to.
    pub fn room(&self) -> &RoomId {
        match self {
            WireMessage::Join { room, .. }
            | WireMessage::Departed { room, .. }
            | WireMessage::CodeChange { room, .. }
            | WireMessage::SyncRequest { room, .. }
            | WireMessage::SyncResponse { room, .. }
            | WireMessage::PresenceUpdate { room, .. }
            | WireMessage::MembersUpdate { room, .. } => room,
        }
    }

    /// Discriminant for handler routing.
    pub fn kind(&self) -> MessageKind {
        match self {
            WireMessage::Join { .. } => MessageKind::Join,
            WireMessage::Departed { .. } => MessageKind::Departed,
            WireMessage::CodeChange { .. } => MessageKind::CodeChange,
            WireMessage::SyncRequest { .. } => MessageKind::SyncRequest,
            WireMessage::SyncResponse { .. } => MessageKind::SyncResponse,
            WireMessage::PresenceUpdate { .. } => MessageKind::PresenceUpdate,
            WireMessage::MembersUpdate { .. } => MessageKind::MembersUpdate,
        }
    }
}

// ----------------------------------------------------------------------------
// Message Kind
// ----------------------------------------------------------------------------

/// Discriminant of [`WireMessage`], used when a handler cares only about the
/// kind of traffic, not its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    Join,
    Departed,
    CodeChange,
    SyncRequest,
    SyncResponse,
    PresenceUpdate,
    MembersUpdate,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
