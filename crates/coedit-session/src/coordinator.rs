//! Room session coordinator
//!
//! [`RoomSession`] owns everything one joined room needs: the connected
//! transport, the convergence engine, the presence tracker and the widget
//! buffer, driven by a single command loop. Inbound wire traffic, caller
//! commands and scheduler ticks are multiplexed through that loop, so no
//! state is ever touched from two tasks. Teardown is guaranteed: a failed
//! departure announce never skips unsubscribe and disconnect.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use coedit_core::config::CoeditConfig;
use coedit_core::convergence::{ConvergenceEngine, LocalOutcome, RemoteOutcome};
use coedit_core::editor::{ChangeOrigin, EditorBuffer};
use coedit_core::errors::{CoeditError, Result};
use coedit_core::message::{PresenceAction, WireMessage};
use coedit_core::persist::RoomStore;
use coedit_core::presence::{Departure, PresenceEntry, PresenceTracker};
use coedit_core::transport::{MessageOutlet, Transport, TransportEvent, TransportEventOutlet};
use coedit_core::types::{ParticipantId, RoomId};

use crate::scheduler::{Scheduler, Tick};

// ----------------------------------------------------------------------------
// Commands & Events
// ----------------------------------------------------------------------------

/// Caller-facing commands into the session loop.
#[derive(Debug)]
pub enum SessionCommand {
    /// A widget change notification, tagged with its origin.
    LocalEdit { origin: ChangeOrigin, text: String },
    /// Leave the room and tear the session down.
    Leave,
}

/// Outward notifications for the UI layer.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The buffer converged on new text (remote edit or sync).
    CodeChanged {
        text: String,
        author: Option<ParticipantId>,
    },
    /// The room's membership snapshot changed.
    MembersChanged { members: Vec<PresenceEntry> },
    /// Transient, user-visible status ("using local mode", "reconnecting").
    Notice(String),
}

// ----------------------------------------------------------------------------
// Session Handle
// ----------------------------------------------------------------------------

/// Caller's handle to a running session.
pub struct RoomSessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    events: mpsc::Receiver<SessionEvent>,
    task: JoinHandle<()>,
}

impl RoomSessionHandle {
    /// Feed one widget change notification into the session.
    pub async fn edit(&self, origin: ChangeOrigin, text: impl Into<String>) -> Result<()> {
        self.commands
            .send(SessionCommand::LocalEdit {
                origin,
                text: text.into(),
            })
            .await
            .map_err(|_| CoeditError::channel_error("session loop has stopped"))
    }

    /// Next outward event, or `None` once the session has torn down.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Leave the room. Waits for teardown to complete.
    pub async fn leave(self) -> Result<()> {
        let _ = self.commands.send(SessionCommand::Leave).await;
        self.task
            .await
            .map_err(|e| CoeditError::channel_error(format!("session task failed: {e}")))
    }
}

// ----------------------------------------------------------------------------
// Room Session
// ----------------------------------------------------------------------------

/// The per-room coordinator state. Lives on its own task; see
/// [`RoomSession::spawn`].
pub struct RoomSession {
    room: RoomId,
    participant: ParticipantId,
    transport: Box<dyn Transport>,
    engine: ConvergenceEngine,
    tracker: PresenceTracker,
    editor: Box<dyn EditorBuffer>,
    store: Option<Arc<dyn RoomStore>>,
    events: mpsc::Sender<SessionEvent>,
}

impl RoomSession {
    /// Start a session over an already-connected transport.
    ///
    /// The transport's inbox must have been attached before it connected;
    /// `outlet` is the receiving end. `connect_events` are whatever the
    /// fallback chain reported, surfaced as notices; `transport_events` is
    /// the live end runtime events (drops, re-dials) keep arriving on.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        room: RoomId,
        participant: ParticipantId,
        transport: Box<dyn Transport>,
        outlet: MessageOutlet,
        connect_events: Vec<TransportEvent>,
        transport_events: TransportEventOutlet,
        editor: Box<dyn EditorBuffer>,
        store: Option<Arc<dyn RoomStore>>,
        config: CoeditConfig,
    ) -> RoomSessionHandle {
        let (command_tx, command_rx) = mpsc::channel(config.channels.command_buffer_size);
        let (event_tx, event_rx) = mpsc::channel(config.channels.session_event_buffer_size);
        let (tick_tx, tick_rx) = mpsc::channel(8);
        let scheduler = Scheduler::start(&config, tick_tx);

        let session = RoomSession {
            room: room.clone(),
            participant: participant.clone(),
            engine: ConvergenceEngine::new(room, participant.clone(), config.engine),
            tracker: PresenceTracker::new(participant),
            transport,
            editor,
            store,
            events: event_tx,
        };
        let task = tokio::spawn(session.run(
            command_rx,
            outlet,
            transport_events,
            tick_rx,
            scheduler,
            connect_events,
        ));

        RoomSessionHandle {
            commands: command_tx,
            events: event_rx,
            task,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut inbox: MessageOutlet,
        mut transport_events: TransportEventOutlet,
        mut ticks: mpsc::Receiver<Tick>,
        scheduler: Scheduler,
        connect_events: Vec<TransportEvent>,
    ) {
        self.startup(connect_events).await;

        // The local backend never emits runtime events and drops its sender;
        // park the branch once the channel closes.
        let mut events_open = true;
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::LocalEdit { origin, text }) => {
                        self.on_local_edit(origin, text).await;
                    }
                    Some(SessionCommand::Leave) | None => break,
                },
                message = inbox.recv() => match message {
                    Some(message) => self.on_wire(message).await,
                    None => {
                        warn!(room = %self.room, "transport inbox closed");
                        break;
                    }
                },
                event = transport_events.recv(), if events_open => match event {
                    Some(event) => self.on_transport_event(event).await,
                    None => events_open = false,
                },
                tick = ticks.recv() => match tick {
                    Some(Tick::PresenceReconcile) => self.on_reconcile_tick().await,
                    Some(Tick::SyncDeadline) => self.on_sync_deadline().await,
                    None => break,
                },
            }
        }

        scheduler.stop();
        self.teardown().await;
    }

    // ------------------------------------------------------------------
    // Startup: subscribe, announce, request sync
    // ------------------------------------------------------------------

    async fn startup(&mut self, connect_events: Vec<TransportEvent>) {
        for event in connect_events {
            self.notify(notice_text(&event)).await;
        }

        if let Err(e) = self.transport.subscribe(&self.room).await {
            warn!(room = %self.room, "subscribe failed: {e}");
            self.notify(notice_text(&TransportEvent::SubscribeFailed {
                room: self.room.clone(),
                reason: e.to_string(),
            }))
            .await;
        }
        self.send_or_notice(WireMessage::Join {
            room: self.room.clone(),
            participant: self.participant.clone(),
        })
        .await;

        // Everyone sees at least themselves from the first frame.
        self.emit_members().await;

        let request = self.engine.begin_sync();
        self.send_or_notice(request).await;
        info!(room = %self.room, participant = %self.participant, "session started");
    }

    // ------------------------------------------------------------------
    // Local edits
    // ------------------------------------------------------------------

    async fn on_local_edit(&mut self, origin: ChangeOrigin, text: String) {
        match self.engine.on_local_change(origin, &text) {
            LocalOutcome::Broadcast(message) => {
                self.send_or_notice(message).await;
                self.persist();
            }
            LocalOutcome::Dropped(reason) => {
                trace!(room = %self.room, ?reason, "local change produced no broadcast");
            }
        }
    }

    // ------------------------------------------------------------------
    // Inbound wire traffic
    // ------------------------------------------------------------------

    async fn on_wire(&mut self, message: WireMessage) {
        match message {
            WireMessage::Join { participant, .. } => {
                self.tracker.record_sighting(&self.room, participant, None);
                self.emit_members().await;
            }
            WireMessage::Departed {
                participant,
                connection,
                ..
            } => {
                let departure = match connection {
                    Some(connection) => Departure::Connection {
                        participant,
                        connection,
                    },
                    None => Departure::ByName(participant),
                };
                self.tracker.record_departure(&self.room, departure);
                self.emit_members().await;
            }
            WireMessage::CodeChange { text, author, .. } => {
                self.tracker
                    .record_sighting(&self.room, author.clone(), None);
                self.apply_remote(&text, &author).await;
            }
            WireMessage::SyncRequest { requestor, .. } => {
                self.tracker
                    .record_sighting(&self.room, requestor.clone(), None);
                self.emit_members().await;
                if let Some(response) = self.engine.on_sync_request(&requestor) {
                    debug!(room = %self.room, %requestor, "answering sync-request");
                    self.send_or_notice(response).await;
                }
            }
            WireMessage::SyncResponse { text, author, .. } => {
                // The responder may be the first peer we hear from at all.
                self.tracker
                    .record_sighting(&self.room, author.clone(), None);
                self.emit_members().await;
                match self.engine.on_sync_response(self.editor.as_mut(), &text, &author) {
                    Ok(RemoteOutcome::Applied) => {
                        debug!(room = %self.room, %author, "synced from peer");
                        self.emit_code(text, Some(author)).await;
                        self.persist();
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(room = %self.room, "sync-response apply failed: {e}");
                        self.notify("could not apply the room's code".to_string())
                            .await;
                    }
                }
            }
            WireMessage::PresenceUpdate {
                participant,
                action,
                ..
            } => {
                match action {
                    PresenceAction::Connected => {
                        self.tracker.record_sighting(&self.room, participant, None);
                    }
                    PresenceAction::Disconnected => {
                        self.tracker
                            .record_departure(&self.room, Departure::ByName(participant));
                    }
                }
                self.emit_members().await;
            }
            WireMessage::MembersUpdate { members, .. } => {
                self.tracker.reconcile(&self.room, &members);
                self.emit_members().await;
            }
        }
    }

    async fn apply_remote(&mut self, text: &str, author: &ParticipantId) {
        match self.engine.apply_remote(self.editor.as_mut(), text, author) {
            Ok(RemoteOutcome::Applied) => {
                self.emit_code(text.to_string(), Some(author.clone())).await;
                self.persist();
            }
            Ok(outcome) => trace!(room = %self.room, ?outcome, "remote change ignored"),
            Err(e) => {
                warn!(room = %self.room, %author, "remote apply failed: {e}");
                self.notify("an incoming update could not be applied".to_string())
                    .await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Transport runtime events
    // ------------------------------------------------------------------

    async fn on_transport_event(&mut self, event: TransportEvent) {
        self.notify(notice_text(&event)).await;
        if let TransportEvent::Reconnected { backend } = event {
            // The fresh connection has no memory of this session. The
            // transport already replayed its topic subscriptions; the
            // room-level state is ours to restore.
            info!(room = %self.room, %backend, "replaying join and sync after reconnect");
            self.send_or_notice(WireMessage::Join {
                room: self.room.clone(),
                participant: self.participant.clone(),
            })
            .await;
            let request = self.engine.begin_sync();
            self.send_or_notice(request).await;
        }
    }

    // ------------------------------------------------------------------
    // Scheduler ticks
    // ------------------------------------------------------------------

    async fn on_reconcile_tick(&mut self) {
        self.send_or_notice(WireMessage::PresenceUpdate {
            room: self.room.clone(),
            participant: self.participant.clone(),
            action: PresenceAction::Connected,
        })
        .await;
    }

    async fn on_sync_deadline(&mut self) {
        if self.engine.sync_deadline_passed() {
            // First one in: fall back to the last persisted snapshot, or an
            // empty buffer when there is none. Self-only presence either way.
            if self.seed_from_store().await {
                debug!(room = %self.room, "no sync-response, restored persisted snapshot");
            } else {
                debug!(room = %self.room, "no sync-response, starting from an empty room");
            }
            self.emit_members().await;
        }
    }

    /// Restore the room's buffer from the store, if a snapshot exists and no
    /// edit has landed yet. Returns whether the buffer changed.
    async fn seed_from_store(&mut self) -> bool {
        let Some(store) = self.store.clone() else {
            return false;
        };
        if !self.engine.last_known().is_empty() {
            return false;
        }
        let snapshot = match store.load(&self.room).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return false,
            Err(e) => {
                warn!(room = %self.room, "snapshot load failed: {e}");
                return false;
            }
        };
        match self.engine.restore_snapshot(self.editor.as_mut(), &snapshot) {
            Ok(RemoteOutcome::Applied) => {
                self.emit_code(snapshot.text, snapshot.author).await;
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(room = %self.room, "snapshot restore failed: {e}");
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Teardown (guaranteed cleanup)
    // ------------------------------------------------------------------

    async fn teardown(&mut self) {
        // The announce is best-effort; unbind and release run regardless.
        if let Err(e) = self
            .transport
            .send(WireMessage::Departed {
                room: self.room.clone(),
                participant: self.participant.clone(),
                connection: None,
            })
            .await
        {
            warn!(room = %self.room, "departure announce failed: {e}");
        }
        if let Err(e) = self.transport.unsubscribe(&self.room).await {
            warn!(room = %self.room, "unsubscribe failed: {e}");
        }
        if let Err(e) = self.transport.disconnect().await {
            warn!(room = %self.room, "disconnect failed: {e}");
        }
        self.tracker.forget_room(&self.room);
        info!(room = %self.room, participant = %self.participant, "session torn down");
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn send_or_notice(&mut self, message: WireMessage) {
        let kind = message.kind();
        if let Err(e) = self.transport.send(message).await {
            warn!(room = %self.room, ?kind, "send failed: {e}");
            self.notify("connection trouble, retrying in the background".to_string())
                .await;
        }
    }

    async fn emit_members(&mut self) {
        let members = self.tracker.snapshot(&self.room).into_vec();
        let _ = self
            .events
            .send(SessionEvent::MembersChanged { members })
            .await;
    }

    async fn emit_code(&mut self, text: String, author: Option<ParticipantId>) {
        let _ = self
            .events
            .send(SessionEvent::CodeChanged { text, author })
            .await;
    }

    async fn notify(&mut self, text: String) {
        let _ = self.events.send(SessionEvent::Notice(text)).await;
    }

    /// Mirror the current snapshot to the store, off the session loop.
    /// Failures are logged and ignored; persistence never gates convergence.
    fn persist(&self) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let snapshot = self.engine.snapshot();
        tokio::spawn(async move {
            if let Err(e) = store.save(&snapshot).await {
                warn!(room = %snapshot.room, "snapshot save failed: {e}");
            }
        });
    }
}

fn notice_text(event: &TransportEvent) -> String {
    match event {
        TransportEvent::Connected { backend } => format!("connected via {backend}"),
        TransportEvent::Disconnected { backend } => {
            format!("{backend} connection lost, reconnecting")
        }
        TransportEvent::Reconnected { backend } => format!("reconnected to {backend}"),
        TransportEvent::FellBack { from, to } => {
            format!("{from} unreachable, trying {to}")
        }
        TransportEvent::SubscribeFailed { room, reason } => {
            format!("could not subscribe to {room}: {reason}")
        }
    }
}
