//! Transport abstraction for the coedit protocol
//!
//! A uniform send/subscribe interface over the interchangeable backends
//! (socket, pub/sub, simulated local), so the engine and coordinator stay
//! backend-agnostic. Inbound traffic is pushed into a tokio mpsc inbox the
//! session loop owns; transports never invoke handlers directly.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::Result;
use crate::message::WireMessage;
use crate::types::{BackendKind, RoomId, TransportSession};

/// Inbox end handed to a transport; the session loop holds the receiver.
pub type MessageInbox = mpsc::Sender<WireMessage>;

/// Receiver side of a transport inbox.
pub type MessageOutlet = mpsc::Receiver<WireMessage>;

/// Sender side for out-of-band [`TransportEvent`]s.
pub type TransportEvents = mpsc::Sender<TransportEvent>;

/// Receiver side for out-of-band [`TransportEvent`]s.
pub type TransportEventOutlet = mpsc::Receiver<TransportEvent>;

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

/// Unified transport interface.
///
/// Exactly one transport is active per process. `connect` on a real backend
/// may fail or time out — the caller (see `coedit-session`) then discards
/// the attempt and cuts over to the next backend; the simulated backend
/// always succeeds. A transport must deliver everything it receives into the
/// inbox attached via [`Transport::attach_inbox`] before `connect`.
#[async_trait]
pub trait Transport: Send {
    /// Which backend kind this transport implements.
    fn backend(&self) -> BackendKind;

    /// Snapshot of the current session. Replaced wholesale on reconnect.
    fn session(&self) -> TransportSession;

    /// Attach the inbox inbound messages are delivered into.
    fn attach_inbox(&mut self, inbox: MessageInbox);

    /// Attach the channel out-of-band events (drops, re-dials) are
    /// delivered into. Must be called before `connect`. Backends with no
    /// runtime events, like the simulated one, may ignore it.
    fn attach_events(&mut self, _events: TransportEvents) {}

    /// Establish the connection. May register a process-wide reconnection
    /// timer; [`Transport::disconnect`] must cancel it.
    async fn connect(&mut self) -> Result<()>;

    /// Subscribe to a room's traffic.
    async fn subscribe(&mut self, room: &RoomId) -> Result<()>;

    /// Send one message; the backend fans it out to the room's members.
    async fn send(&mut self, message: WireMessage) -> Result<()>;

    /// Drop a room subscription.
    async fn unsubscribe(&mut self, room: &RoomId) -> Result<()>;

    /// Tear the connection down and cancel any reconnection timers.
    async fn disconnect(&mut self) -> Result<()>;
}

// ----------------------------------------------------------------------------
// Transport Events
// ----------------------------------------------------------------------------

/// Out-of-band notifications a transport may emit alongside wire traffic.
///
/// Surfaced to the user as transient notices ("using local mode",
/// "reconnecting"); never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A backend accepted the connection.
    Connected { backend: BackendKind },
    /// The active backend dropped; a reconnect attempt may follow.
    Disconnected { backend: BackendKind },
    /// A dropped connection was re-dialed successfully. Server-side session
    /// state is gone; the session must replay its join and sync.
    Reconnected { backend: BackendKind },
    /// A connect attempt was abandoned and the next backend takes over.
    FellBack {
        from: BackendKind,
        to: BackendKind,
    },
    /// A backend-level subscribe failed; the session continues degraded.
    SubscribeFailed { room: RoomId, reason: String },
}

/// Create a transport inbox pair with the configured buffer size.
pub fn message_inbox(buffer: usize) -> (MessageInbox, MessageOutlet) {
    mpsc::channel(buffer)
}

/// Create a transport event channel pair.
pub fn transport_events(buffer: usize) -> (TransportEvents, TransportEventOutlet) {
    mpsc::channel(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParticipantId;

    #[tokio::test]
    async fn test_inbox_delivers_in_order() {
        let (tx, mut rx) = message_inbox(8);
        for i in 0..3 {
            tx.send(WireMessage::SyncRequest {
                room: RoomId::from("r1"),
                requestor: ParticipantId::new(format!("p{i}")),
            })
            .await
            .unwrap();
        }
        for i in 0..3 {
            match rx.recv().await.unwrap() {
                WireMessage::SyncRequest { requestor, .. } => {
                    assert_eq!(requestor.as_str(), format!("p{i}"));
                }
                other => panic!("unexpected message {other:?}"),
            }
        }
    }
}
