//! Room presence tracking
//!
//! Maintains the set of known participants per room from heterogeneous,
//! duplicate and out-of-order presence signals: joins, lightweight
//! presence-updates, full membership snapshots and periodic reconciliation.
//! The tracker exclusively owns its entries; everything it hands out is a
//! read-only snapshot.

use std::collections::HashMap;

use smallvec::SmallVec;
use tracing::debug;

use crate::config::PresenceConfig;
use crate::message::MemberInfo;
use crate::types::{ConnectionId, ParticipantId, RoomId, Timestamp};

// ----------------------------------------------------------------------------
// Presence Entry
// ----------------------------------------------------------------------------

/// One live participant in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub participant: ParticipantId,
    /// Transport-assigned connection, when one is known. Overwritten when
    /// the same display name reappears with a new connection.
    pub connection: Option<ConnectionId>,
    /// Refreshed on every sighting.
    pub last_seen: Timestamp,
}

impl PresenceEntry {
    /// Whether this entry has gone quiet longer than the configured horizon.
    /// Informational only; the tracker never evicts on staleness.
    pub fn is_stale(&self, config: &PresenceConfig) -> bool {
        Timestamp::now().duration_since(self.last_seen) > config.stale_after
    }
}

/// Selector for an explicit departure signal.
#[derive(Debug, Clone)]
pub enum Departure {
    /// Explicit leave for a display name; removes the entry outright.
    ByName(ParticipantId),
    /// A connection went away. Evicts the named entry unless it has since
    /// been seen on a different connection (a stale departure arriving
    /// after a reconnect must not evict the reconnected participant).
    Connection {
        participant: ParticipantId,
        connection: ConnectionId,
    },
}

// ----------------------------------------------------------------------------
// Presence Tracker
// ----------------------------------------------------------------------------

/// Tracks membership for every room this process participates in.
///
/// Sightings are idempotent upserts keyed by display name: at most one live
/// entry per name, latest connection identifier wins. The local participant
/// is always present in its own room's snapshot, even with zero external
/// confirmation.
#[derive(Debug)]
pub struct PresenceTracker {
    local: ParticipantId,
    rooms: HashMap<RoomId, HashMap<ParticipantId, PresenceEntry>>,
}

impl PresenceTracker {
    pub fn new(local: ParticipantId) -> Self {
        Self {
            local,
            rooms: HashMap::new(),
        }
    }

    pub fn local_participant(&self) -> &ParticipantId {
        &self.local
    }

    /// Record that a participant was seen in a room. Upserts by display
    /// name: a repeated sighting refreshes `last_seen` and overwrites the
    /// connection identifier (a reconnect under the same name).
    pub fn record_sighting(
        &mut self,
        room: &RoomId,
        participant: ParticipantId,
        connection: Option<ConnectionId>,
    ) {
        let entries = self.rooms.entry(room.clone()).or_default();
        let now = Timestamp::now();
        entries
            .entry(participant.clone())
            .and_modify(|entry| {
                entry.last_seen = now;
                if connection.is_some() {
                    entry.connection = connection;
                }
            })
            .or_insert_with(|| {
                debug!(%room, %participant, "presence: first sighting");
                PresenceEntry {
                    participant,
                    connection,
                    last_seen: now,
                }
            });
    }

    /// Remove a participant on an explicit departure signal. Unknown
    /// participants are ignored (duplicate or out-of-order departures).
    pub fn record_departure(&mut self, room: &RoomId, departure: Departure) {
        let Some(entries) = self.rooms.get_mut(room) else {
            return;
        };
        match departure {
            Departure::ByName(name) => {
                if entries.remove(&name).is_some() {
                    debug!(%room, participant = %name, "presence: departed");
                }
            }
            Departure::Connection {
                participant,
                connection,
            } => {
                // Sweep any entry still bound to the dead connection, then
                // fall back to the name for entries whose connection was
                // never learned. An entry rebound to a newer connection
                // stays put.
                let before = entries.len();
                entries.retain(|_, entry| entry.connection != Some(connection));
                if entries.len() == before {
                    if let Some(entry) = entries.get(&participant) {
                        if entry.connection.is_none() {
                            entries.remove(&participant);
                            debug!(%room, %participant, "presence: departed (name fallback)");
                        }
                    }
                }
            }
        }
        if entries.is_empty() {
            self.rooms.remove(room);
        }
    }

    /// Overwrite a room's membership with an authoritative roster, keeping
    /// the self-inclusion invariant. Used by the reconciliation sweep when a
    /// connected backend supplies a full members-update.
    pub fn reconcile(&mut self, room: &RoomId, roster: &[MemberInfo]) {
        let entries = self.rooms.entry(room.clone()).or_default();
        let now = Timestamp::now();

        let mut next: HashMap<ParticipantId, PresenceEntry> = HashMap::with_capacity(roster.len());
        for member in roster {
            // Preserve the older last_seen when we already knew the member;
            // the roster is authoritative about membership, not liveness.
            let last_seen = entries
                .get(&member.participant)
                .map(|e| e.last_seen)
                .unwrap_or(now);
            next.insert(
                member.participant.clone(),
                PresenceEntry {
                    participant: member.participant.clone(),
                    connection: member.connection,
                    last_seen,
                },
            );
        }
        *entries = next;
        debug!(%room, members = entries.len(), "presence: reconciled with authoritative roster");
    }

    /// Ordered read-only snapshot of a room's membership, sorted
    /// lexicographically by display name for stable rendering. The local
    /// participant is always included.
    pub fn snapshot(&self, room: &RoomId) -> SmallVec<[PresenceEntry; 8]> {
        let mut out: SmallVec<[PresenceEntry; 8]> = SmallVec::new();
        if let Some(entries) = self.rooms.get(room) {
            out.extend(entries.values().cloned());
        }
        if !out.iter().any(|e| e.participant == self.local) {
            out.push(PresenceEntry {
                participant: self.local.clone(),
                connection: None,
                last_seen: Timestamp::now(),
            });
        }
        out.sort_by(|a, b| a.participant.cmp(&b.participant));
        out
    }

    /// Number of known participants in a room (self included).
    pub fn member_count(&self, room: &RoomId) -> usize {
        self.snapshot(room).len()
    }

    /// Drop all state for a room (teardown).
    pub fn forget_room(&mut self, room: &RoomId) {
        self.rooms.remove(room);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> PresenceTracker {
        PresenceTracker::new(ParticipantId::from("ada"))
    }

    #[test]
    fn test_self_inclusion_with_zero_sightings() {
        let tracker = tracker();
        let snapshot = tracker.snapshot(&RoomId::from("r1"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].participant.as_str(), "ada");
    }

    #[test]
    fn test_sighting_upsert_by_name() {
        let mut tracker = tracker();
        let room = RoomId::from("r1");
        let first = ConnectionId::generate();
        let second = ConnectionId::generate();

        tracker.record_sighting(&room, ParticipantId::from("bob"), Some(first));
        tracker.record_sighting(&room, ParticipantId::from("bob"), Some(second));

        let snapshot = tracker.snapshot(&room);
        let bobs: Vec<_> = snapshot
            .iter()
            .filter(|e| e.participant.as_str() == "bob")
            .collect();
        assert_eq!(bobs.len(), 1, "duplicate sighting must not duplicate");
        assert_eq!(bobs[0].connection, Some(second), "latest connection wins");
    }

    #[test]
    fn test_snapshot_sorted_lexicographically() {
        let mut tracker = tracker();
        let room = RoomId::from("r1");
        tracker.record_sighting(&room, ParticipantId::from("zoe"), None);
        tracker.record_sighting(&room, ParticipantId::from("bob"), None);

        let names: Vec<_> = tracker
            .snapshot(&room)
            .iter()
            .map(|e| e.participant.as_str().to_string())
            .collect();
        assert_eq!(names, vec!["ada", "bob", "zoe"]);
    }

    #[test]
    fn test_departure_by_name_and_connection() {
        let mut tracker = tracker();
        let room = RoomId::from("r1");
        let conn = ConnectionId::generate();
        tracker.record_sighting(&room, ParticipantId::from("bob"), Some(conn));
        tracker.record_sighting(&room, ParticipantId::from("zoe"), None);

        tracker.record_departure(
            &room,
            Departure::Connection {
                participant: ParticipantId::from("bob"),
                connection: conn,
            },
        );
        assert_eq!(tracker.member_count(&room), 2); // ada + zoe

        tracker.record_departure(&room, Departure::ByName(ParticipantId::from("zoe")));
        assert_eq!(tracker.member_count(&room), 1); // self-inclusion survives

        // Departing an unknown participant is a no-op.
        tracker.record_departure(&room, Departure::ByName(ParticipantId::from("ghost")));
        assert_eq!(tracker.member_count(&room), 1);
    }

    #[test]
    fn test_connection_departure_evicts_name_only_entry() {
        let mut tracker = tracker();
        let room = RoomId::from("r1");
        // bob was only ever sighted without a connection id (join,
        // code-change); the departure still carries one.
        tracker.record_sighting(&room, ParticipantId::from("bob"), None);

        tracker.record_departure(
            &room,
            Departure::Connection {
                participant: ParticipantId::from("bob"),
                connection: ConnectionId::generate(),
            },
        );

        let names: Vec<_> = tracker
            .snapshot(&room)
            .iter()
            .map(|e| e.participant.as_str().to_string())
            .collect();
        assert_eq!(names, vec!["ada"], "explicit departure must evict outright");
    }

    #[test]
    fn test_stale_departure_spares_reconnected_entry() {
        let mut tracker = tracker();
        let room = RoomId::from("r1");
        let old = ConnectionId::generate();
        let new = ConnectionId::generate();
        tracker.record_sighting(&room, ParticipantId::from("bob"), Some(old));
        tracker.record_sighting(&room, ParticipantId::from("bob"), Some(new));

        // The departure for the old connection arrives after the reconnect.
        tracker.record_departure(
            &room,
            Departure::Connection {
                participant: ParticipantId::from("bob"),
                connection: old,
            },
        );
        assert_eq!(tracker.member_count(&room), 2, "reconnected bob survives");
    }

    #[test]
    fn test_reconcile_overwrites_stale_state() {
        let mut tracker = tracker();
        let room = RoomId::from("r1");
        tracker.record_sighting(&room, ParticipantId::from("ghost"), None);

        let roster = vec![
            MemberInfo::new(ParticipantId::from("ada"), None),
            MemberInfo::new(ParticipantId::from("bob"), Some(ConnectionId::generate())),
        ];
        tracker.reconcile(&room, &roster);

        let names: Vec<_> = tracker
            .snapshot(&room)
            .iter()
            .map(|e| e.participant.as_str().to_string())
            .collect();
        assert_eq!(names, vec!["ada", "bob"], "ghost overwritten by roster");
    }

    #[test]
    fn test_reconcile_empty_roster_preserves_self() {
        let mut tracker = tracker();
        let room = RoomId::from("r1");
        tracker.record_sighting(&room, ParticipantId::from("bob"), None);
        tracker.reconcile(&room, &[]);
        let snapshot = tracker.snapshot(&room);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].participant.as_str(), "ada");
    }
}
