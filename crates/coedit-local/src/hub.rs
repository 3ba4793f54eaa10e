//! In-memory fan-out hub
//!
//! [`LocalHub`] plays the role of the network for the simulated backend: an
//! explicit, instantiable store of rooms, virtual connections and their
//! inboxes. Two transports sharing one hub see each other; separate hubs are
//! fully isolated, which is what multi-participant tests build on. Nothing
//! here lives in a global.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, trace};

use coedit_core::message::{MemberInfo, WireMessage};
use coedit_core::transport::MessageInbox;
use coedit_core::types::{ConnectionId, ParticipantId, RoomId};

/// Delivery delay applied to every fan-out, simulating network latency so
/// ordering bugs that only show up with in-flight messages stay reproducible.
const DEFAULT_DELIVERY_DELAY: Duration = Duration::from_millis(30);

#[derive(Debug, Default)]
struct HubState {
    /// Room membership by virtual connection.
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
    /// Display name learned from each connection's join.
    names: HashMap<ConnectionId, ParticipantId>,
    /// Where each connection's inbound traffic goes.
    inboxes: HashMap<ConnectionId, MessageInbox>,
}

impl HubState {
    fn roster(&self, room: &RoomId) -> Vec<MemberInfo> {
        let mut members: Vec<MemberInfo> = self
            .rooms
            .get(room)
            .into_iter()
            .flatten()
            .filter_map(|conn| {
                self.names
                    .get(conn)
                    .map(|name| MemberInfo::new(name.clone(), Some(*conn)))
            })
            .collect();
        members.sort_by(|a, b| a.participant.cmp(&b.participant));
        members
    }

    fn inboxes_for(&self, room: &RoomId, exclude: Option<ConnectionId>) -> Vec<MessageInbox> {
        self.rooms
            .get(room)
            .into_iter()
            .flatten()
            .filter(|conn| Some(**conn) != exclude)
            .filter_map(|conn| self.inboxes.get(conn).cloned())
            .collect()
    }
}

/// Shared in-memory message hub. Cheap to clone; clones address the same
/// rooms and connections.
#[derive(Debug, Clone)]
pub struct LocalHub {
    state: Arc<Mutex<HubState>>,
    delay: Duration,
}

impl LocalHub {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState::default())),
            delay: DEFAULT_DELIVERY_DELAY,
        }
    }

    /// Hub with a custom simulated delivery delay.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState::default())),
            delay,
        }
    }

    /// Register a virtual connection and its inbox. The display name is
    /// learned later, from the connection's join message.
    pub fn register(&self, inbox: MessageInbox) -> ConnectionId {
        let conn = ConnectionId::generate();
        self.state.lock().unwrap().inboxes.insert(conn, inbox);
        debug!(connection = %conn, "hub: connection registered");
        conn
    }

    /// Accept one message from a connection and fan it out.
    ///
    /// A join registers the sender in the room (idempotently) and fans a
    /// full members-update out to every member, the joiner included, so the
    /// joiner learns the roster the same way everyone else does. Every other
    /// kind goes to all members except the sender; a send into a room the
    /// sender never joined is silently dropped.
    pub fn deliver(&self, sender: ConnectionId, message: WireMessage) {
        let (targets, extra) = {
            let mut state = self.state.lock().unwrap();
            match &message {
                WireMessage::Join { room, participant } => {
                    state.names.insert(sender, participant.clone());
                    state.rooms.entry(room.clone()).or_default().insert(sender);
                    let update = WireMessage::MembersUpdate {
                        room: room.clone(),
                        members: state.roster(room),
                    };
                    debug!(%room, %participant, "hub: join, fanning out roster");
                    (state.inboxes_for(room, None), Some(update))
                }
                WireMessage::Departed { room, .. } => {
                    if let Some(members) = state.rooms.get_mut(room) {
                        members.remove(&sender);
                        if members.is_empty() {
                            state.rooms.remove(room);
                        }
                    }
                    (state.inboxes_for(message.room(), Some(sender)), None)
                }
                other => {
                    let joined = state
                        .rooms
                        .get(other.room())
                        .map(|members| members.contains(&sender))
                        .unwrap_or(false);
                    if !joined {
                        trace!(room = %other.room(), "hub: dropping pre-join send");
                        return;
                    }
                    (state.inboxes_for(other.room(), Some(sender)), None)
                }
            }
        };

        let payload = extra.unwrap_or(message);
        self.fan_out(targets, payload);
    }

    /// Drop a connection: departure notices for every room it was in, then
    /// purge it entirely. Rooms left empty disappear with it.
    pub fn detach(&self, connection: ConnectionId) {
        let notices = {
            let mut state = self.state.lock().unwrap();
            let HubState {
                rooms,
                names,
                inboxes,
            } = &mut *state;
            inboxes.remove(&connection);
            let name = names.remove(&connection);

            let mut notices = Vec::new();
            rooms.retain(|room, members| {
                if members.remove(&connection) {
                    if let Some(name) = &name {
                        notices.push((
                            inboxes
                                .iter()
                                .filter(|(conn, _)| members.contains(conn))
                                .map(|(_, inbox)| inbox.clone())
                                .collect::<Vec<_>>(),
                            WireMessage::Departed {
                                room: room.clone(),
                                participant: name.clone(),
                                connection: Some(connection),
                            },
                        ));
                    }
                }
                !members.is_empty()
            });
            notices
        };

        debug!(%connection, rooms = notices.len(), "hub: connection detached");
        for (targets, notice) in notices {
            self.fan_out(targets, notice);
        }
    }

    /// Number of live connections in a room. Test observability.
    pub fn room_size(&self, room: &RoomId) -> usize {
        self.state
            .lock()
            .unwrap()
            .rooms
            .get(room)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    fn fan_out(&self, targets: Vec<MessageInbox>, message: WireMessage) {
        let delay = self.delay;
        for inbox in targets {
            let payload = message.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                // A closed inbox means the receiver is gone; nothing to do.
                let _ = inbox.send(payload).await;
            });
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
