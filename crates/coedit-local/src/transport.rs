//! Simulated transport backend
//!
//! [`LocalTransport`] is the terminal fallback: it rides a [`LocalHub`]
//! instead of a network, so `connect` always succeeds and a session keeps
//! its full semantics (join fan-out, presence, sync) with zero
//! infrastructure. Production sessions land here when every real backend is
//! unreachable; tests start here on purpose.

use async_trait::async_trait;
use tracing::{debug, info};

use coedit_core::errors::{CoeditError, Result};
use coedit_core::message::WireMessage;
use coedit_core::transport::{MessageInbox, Transport};
use coedit_core::types::{BackendKind, ConnectionId, ConnectionState, RoomId, TransportSession};

use crate::hub::LocalHub;

pub struct LocalTransport {
    hub: LocalHub,
    inbox: Option<MessageInbox>,
    connection: Option<ConnectionId>,
    session: TransportSession,
}

impl LocalTransport {
    pub fn new(hub: LocalHub) -> Self {
        Self {
            hub,
            inbox: None,
            connection: None,
            session: TransportSession::new(BackendKind::Local),
        }
    }

    /// The hub-assigned connection identifier, once connected.
    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn backend(&self) -> BackendKind {
        BackendKind::Local
    }

    fn session(&self) -> TransportSession {
        self.session.clone()
    }

    fn attach_inbox(&mut self, inbox: MessageInbox) {
        self.inbox = Some(inbox);
    }

    /// Register with the hub. Infallible apart from caller misuse (no inbox
    /// attached); there is no network to fail.
    async fn connect(&mut self) -> Result<()> {
        let inbox = self
            .inbox
            .clone()
            .ok_or_else(|| CoeditError::channel_error("no inbox attached before connect"))?;
        let connection = self.hub.register(inbox);
        self.connection = Some(connection);
        self.session = TransportSession::new(BackendKind::Local).with_state(ConnectionState::Connected);
        info!(%connection, "local transport connected");
        Ok(())
    }

    /// Room membership in the hub is established by the join message itself;
    /// subscribing only records the room on the session.
    async fn subscribe(&mut self, room: &RoomId) -> Result<()> {
        self.session = self.session.with_room(room.clone());
        Ok(())
    }

    async fn send(&mut self, message: WireMessage) -> Result<()> {
        let connection = self
            .connection
            .ok_or(coedit_core::errors::TransportError::NotConnected)?;
        self.hub.deliver(connection, message);
        Ok(())
    }

    async fn unsubscribe(&mut self, room: &RoomId) -> Result<()> {
        self.session = self.session.without_room(room);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(connection) = self.connection.take() {
            self.hub.detach(connection);
            debug!(%connection, "local transport disconnected");
        }
        self.session = TransportSession::new(BackendKind::Local);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coedit_core::transport::message_inbox;
    use coedit_core::types::ParticipantId;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_connect_always_succeeds() {
        let hub = LocalHub::with_delay(Duration::from_millis(1));
        let mut transport = LocalTransport::new(hub);
        let (tx, _rx) = message_inbox(8);
        transport.attach_inbox(tx);

        transport.connect().await.unwrap();
        assert!(transport.session().is_connected());
        assert_eq!(transport.backend(), BackendKind::Local);
    }

    #[tokio::test]
    async fn test_connect_without_inbox_is_misuse() {
        let mut transport = LocalTransport::new(LocalHub::new());
        assert!(transport.connect().await.is_err());
    }

    #[tokio::test]
    async fn test_two_transports_share_one_hub() {
        let hub = LocalHub::with_delay(Duration::from_millis(1));
        let mut ada = LocalTransport::new(hub.clone());
        let mut bob = LocalTransport::new(hub);
        let (ada_tx, mut ada_rx) = message_inbox(8);
        let (bob_tx, _bob_rx) = message_inbox(8);
        ada.attach_inbox(ada_tx);
        bob.attach_inbox(bob_tx);
        ada.connect().await.unwrap();
        bob.connect().await.unwrap();

        let room = RoomId::from("r1");
        ada.subscribe(&room).await.unwrap();
        bob.subscribe(&room).await.unwrap();
        ada.send(WireMessage::Join {
            room: room.clone(),
            participant: ParticipantId::from("ada"),
        })
        .await
        .unwrap();
        bob.send(WireMessage::Join {
            room: room.clone(),
            participant: ParticipantId::from("bob"),
        })
        .await
        .unwrap();

        // ada's own roster, then the one triggered by bob's join.
        let mut last = None;
        for _ in 0..2 {
            let msg = timeout(Duration::from_millis(200), ada_rx.recv())
                .await
                .unwrap()
                .unwrap();
            last = Some(msg);
        }
        match last {
            Some(WireMessage::MembersUpdate { members, .. }) => {
                assert_eq!(members.len(), 2);
            }
            other => panic!("expected members-update, got {other:?}"),
        }

        ada.disconnect().await.unwrap();
        assert!(!ada.session().is_connected());
    }
}
