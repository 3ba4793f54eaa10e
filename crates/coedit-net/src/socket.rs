//! Direct socket-style backend
//!
//! Frames are bare JSON wire messages; the server on the far side routes
//! each one by its room, so subscribing is purely local bookkeeping and the
//! join message itself establishes room membership server-side.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use coedit_core::errors::{CoeditError, Result};
use coedit_core::message::WireMessage;
use coedit_core::transport::{MessageInbox, Transport, TransportEvents};
use coedit_core::types::{BackendKind, ConnectionState, RoomId, TransportSession};

use crate::config::EndpointConfig;
use crate::link::WsLink;

pub struct SocketTransport {
    config: EndpointConfig,
    inbox: Option<MessageInbox>,
    events: Option<TransportEvents>,
    link: Option<WsLink>,
    forward_task: Option<JoinHandle<()>>,
    session: TransportSession,
}

impl SocketTransport {
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            config,
            inbox: None,
            events: None,
            link: None,
            forward_task: None,
            session: TransportSession::new(BackendKind::Socket),
        }
    }
}

/// Parse inbound frames and forward them to the session inbox. Malformed
/// frames are logged and dropped, never fatal.
fn spawn_forwarder(mut frames: mpsc::Receiver<String>, inbox: MessageInbox) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(text) = frames.recv().await {
            match serde_json::from_str::<WireMessage>(&text) {
                Ok(message) => {
                    if inbox.send(message).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("dropping malformed socket frame: {e}"),
            }
        }
    })
}

#[async_trait]
impl Transport for SocketTransport {
    fn backend(&self) -> BackendKind {
        BackendKind::Socket
    }

    fn session(&self) -> TransportSession {
        self.session.clone()
    }

    fn attach_inbox(&mut self, inbox: MessageInbox) {
        self.inbox = Some(inbox);
    }

    fn attach_events(&mut self, events: TransportEvents) {
        self.events = Some(events);
    }

    async fn connect(&mut self) -> Result<()> {
        let inbox = self
            .inbox
            .clone()
            .ok_or_else(|| CoeditError::channel_error("no inbox attached before connect"))?;
        let (frames_tx, frames_rx) = mpsc::channel(64);
        // Nothing connection-scoped lives server-side here; the session
        // replays its own join when the link reports a reconnect.
        let link = WsLink::open(
            BackendKind::Socket,
            &self.config,
            frames_tx,
            Arc::new(Vec::new),
            self.events.clone(),
        )
        .await?;
        self.forward_task = Some(spawn_forwarder(frames_rx, inbox));
        self.link = Some(link);
        self.session =
            TransportSession::new(BackendKind::Socket).with_state(ConnectionState::Connected);
        Ok(())
    }

    async fn subscribe(&mut self, room: &RoomId) -> Result<()> {
        // The server routes by the room carried in each message.
        self.session = self.session.with_room(room.clone());
        Ok(())
    }

    async fn send(&mut self, message: WireMessage) -> Result<()> {
        let link = self
            .link
            .as_ref()
            .ok_or(coedit_core::errors::TransportError::NotConnected)?;
        link.send(serde_json::to_string(&message)?).await
    }

    async fn unsubscribe(&mut self, room: &RoomId) -> Result<()> {
        self.session = self.session.without_room(room);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(link) = self.link.take() {
            link.close();
        }
        if let Some(task) = self.forward_task.take() {
            task.abort();
        }
        self.session = TransportSession::new(BackendKind::Socket);
        debug!("socket transport disconnected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coedit_core::transport::message_inbox;
    use coedit_core::types::ParticipantId;
    use futures::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;

    /// One-shot server: accept one client, answer its first frame with a
    /// members-update for the same room.
    async fn spawn_reply_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let inbound: WireMessage = serde_json::from_str(&text).unwrap();
                let reply = WireMessage::MembersUpdate {
                    room: inbound.room().clone(),
                    members: vec![],
                };
                ws.send(Message::Text(serde_json::to_string(&reply).unwrap()))
                    .await
                    .unwrap();
            }
        });
        format!("ws://{addr}/sync")
    }

    #[tokio::test]
    async fn test_send_and_receive_round_trip() {
        let url = spawn_reply_server().await;
        let mut transport = SocketTransport::new(EndpointConfig::testing(url));
        let (tx, mut rx) = message_inbox(8);
        transport.attach_inbox(tx);
        transport.connect().await.unwrap();
        assert!(transport.session().is_connected());

        let room = RoomId::from("r1");
        transport.subscribe(&room).await.unwrap();
        transport
            .send(WireMessage::Join {
                room: room.clone(),
                participant: ParticipantId::from("ada"),
            })
            .await
            .unwrap();

        let reply = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.room(), &room);
        transport.disconnect().await.unwrap();
        assert!(!transport.session().is_connected());
    }

    #[tokio::test]
    async fn test_connect_times_out_on_silent_endpoint() {
        // A listener that never completes the websocket handshake.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/sync", listener.local_addr().unwrap());

        let mut transport = SocketTransport::new(EndpointConfig::testing(url));
        let (tx, _rx) = message_inbox(8);
        transport.attach_inbox(tx);
        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, CoeditError::Transport(_)), "got {err}");
        assert!(!transport.session().is_connected());
        drop(listener);
    }
}
