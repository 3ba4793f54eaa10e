//! Topic-based pub/sub backend
//!
//! Unlike the socket backend, the broker knows nothing about rooms: the
//! client wraps every wire message in an envelope frame and drives explicit
//! subscribe/unsubscribe on `room:<id>` topics. Inbound traffic arrives as
//! `message` envelopes whose payload is the wire message.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use coedit_core::errors::{CoeditError, Result};
use coedit_core::message::WireMessage;
use coedit_core::transport::{MessageInbox, Transport, TransportEvents};
use coedit_core::types::{BackendKind, ConnectionState, RoomId, TransportSession};

use crate::config::EndpointConfig;
use crate::link::WsLink;

/// Broker envelope frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
enum Envelope {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Publish { topic: String, payload: WireMessage },
    /// Broker -> client delivery on a subscribed topic.
    Message { topic: String, payload: WireMessage },
}

fn room_topic(room: &RoomId) -> String {
    format!("room:{room}")
}

pub struct PubSubTransport {
    config: EndpointConfig,
    inbox: Option<MessageInbox>,
    events: Option<TransportEvents>,
    link: Option<WsLink>,
    forward_task: Option<JoinHandle<()>>,
    session: TransportSession,
    /// Topics subscribed on the broker; replayed after a reconnect because
    /// the broker forgets subscriptions with the connection.
    topics: Arc<Mutex<BTreeSet<RoomId>>>,
}

impl PubSubTransport {
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            config,
            inbox: None,
            events: None,
            link: None,
            forward_task: None,
            session: TransportSession::new(BackendKind::PubSub),
            topics: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    async fn send_envelope(&self, envelope: &Envelope) -> Result<()> {
        let link = self
            .link
            .as_ref()
            .ok_or(coedit_core::errors::TransportError::NotConnected)?;
        link.send(serde_json::to_string(envelope)?).await
    }
}

/// Unwrap inbound envelopes and forward their payloads to the session inbox.
fn spawn_forwarder(mut frames: mpsc::Receiver<String>, inbox: MessageInbox) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(text) = frames.recv().await {
            match serde_json::from_str::<Envelope>(&text) {
                Ok(Envelope::Message { payload, .. }) => {
                    if inbox.send(payload).await.is_err() {
                        break;
                    }
                }
                Ok(other) => warn!("unexpected envelope from broker: {other:?}"),
                Err(e) => warn!("dropping malformed pubsub frame: {e}"),
            }
        }
    })
}

#[async_trait]
impl Transport for PubSubTransport {
    fn backend(&self) -> BackendKind {
        BackendKind::PubSub
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
        let topics = Arc::clone(&self.topics);
        let replay = Arc::new(move || {
            let topics = topics.lock().unwrap_or_else(|e| e.into_inner());
            topics
                .iter()
                .filter_map(|room| {
                    serde_json::to_string(&Envelope::Subscribe {
                        topic: room_topic(room),
                    })
                    .ok()
                })
                .collect()
        });
        let link = WsLink::open(
            BackendKind::PubSub,
            &self.config,
            frames_tx,
            replay,
            self.events.clone(),
        )
        .await?;
        self.forward_task = Some(spawn_forwarder(frames_rx, inbox));
        self.link = Some(link);
        self.session =
            TransportSession::new(BackendKind::PubSub).with_state(ConnectionState::Connected);
        Ok(())
    }

    async fn subscribe(&mut self, room: &RoomId) -> Result<()> {
        self.send_envelope(&Envelope::Subscribe {
            topic: room_topic(room),
        })
        .await?;
        self.topics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(room.clone());
        self.session = self.session.with_room(room.clone());
        Ok(())
    }

    async fn send(&mut self, message: WireMessage) -> Result<()> {
        let envelope = Envelope::Publish {
            topic: room_topic(message.room()),
            payload: message,
        };
        self.send_envelope(&envelope).await
    }

    async fn unsubscribe(&mut self, room: &RoomId) -> Result<()> {
        self.send_envelope(&Envelope::Unsubscribe {
            topic: room_topic(room),
        })
        .await?;
        self.topics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(room);
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
        self.topics.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.session = TransportSession::new(BackendKind::PubSub);
        debug!("pubsub transport disconnected");
        Ok(())
    }
}
