//! Code convergence engine
//!
//! Reconciles divergent views of a room's buffer into one value:
//! local-change detection, feedback-loop suppression, throttled broadcast,
//! remote-change application and the initial-sync handshake. Convergence is
//! last-writer-wins at buffer granularity — the last delivered broadcast
//! overwrites prior text for all receivers. This is a deliberate
//! simplification, not operational transforms.
//!
//! Per room the engine is a two-state machine: **Idle**, or **Suppressed**
//! while a remote value is being applied to the widget. The suppression
//! window is time-bounded (a short deterministic delay after the value is
//! set), so a failing widget apply can never leave the engine stuck in it.

use std::time::Instant;

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::editor::{ChangeOrigin, EditorBuffer};
use crate::errors::{CoeditError, Result};
use crate::message::WireMessage;
use crate::types::{ParticipantId, RoomId, Timestamp};

// ----------------------------------------------------------------------------
// Code Snapshot
// ----------------------------------------------------------------------------

/// The current agreed text value for a room's buffer. One logical snapshot
/// is "current" per room at any instant; mutated only by the engine, never
/// partially applied.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeSnapshot {
    pub room: RoomId,
    pub text: String,
    pub author: Option<ParticipantId>,
    pub revision: Timestamp,
}

// ----------------------------------------------------------------------------
// Outcomes
// ----------------------------------------------------------------------------

/// Why a local change notification produced no broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// A remote apply is in flight; this notification is its echo.
    Suppressed,
    /// The change origin was a programmatic set, not user input.
    NotUserInput,
    /// The text matches what was already broadcast; no traffic needed.
    Identical,
    /// A broadcast went out too recently. The update is dropped, not
    /// queued; the next keystroke's broadcast carries the latest text.
    Throttled,
}

/// Result of feeding a local widget change into the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalOutcome {
    /// Hand this message to the transport for fan-out.
    Broadcast(WireMessage),
    Dropped(DropReason),
}

/// Result of applying an inbound code message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// The widget now shows the received text.
    Applied,
    /// Author equals the local participant: our own broadcast came back
    /// around a transport. Ignored without mutating state.
    IgnoredEcho,
    /// Text already matches the last-known value; applying again is a no-op.
    IgnoredIdentical,
}

/// State of the initial-sync handshake for a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    /// Request sent, waiting for a response or the deadline.
    Pending { since: Instant },
    /// First response applied, or the room was declared empty.
    Converged,
}

// ----------------------------------------------------------------------------
// Convergence Engine
// ----------------------------------------------------------------------------

/// Edit-propagation state machine for one room.
#[derive(Debug)]
pub struct ConvergenceEngine {
    room: RoomId,
    local: ParticipantId,
    config: EngineConfig,
    /// Last text this engine considers current (last broadcast or last
    /// accepted remote value). Updated before any network send so the UI
    /// reflects local typing with zero delay.
    last_known: String,
    last_author: Option<ParticipantId>,
    last_revision: Timestamp,
    last_broadcast_at: Option<Instant>,
    suppressed_until: Option<Instant>,
    sync: SyncState,
}

impl ConvergenceEngine {
    pub fn new(room: RoomId, local: ParticipantId, config: EngineConfig) -> Self {
        Self {
            room,
            local,
            config,
            last_known: String::new(),
            last_author: None,
            last_revision: Timestamp::now(),
            last_broadcast_at: None,
            suppressed_until: None,
            sync: SyncState::Converged,
        }
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// Last text the engine converged on.
    pub fn last_known(&self) -> &str {
        &self.last_known
    }

    /// Read-only snapshot of the current agreed value.
    pub fn snapshot(&self) -> CodeSnapshot {
        CodeSnapshot {
            room: self.room.clone(),
            text: self.last_known.clone(),
            author: self.last_author.clone(),
            revision: self.last_revision,
        }
    }

    /// Whether locally-originated change notifications are being ignored
    /// because a remote apply is (or just was) in flight.
    pub fn is_suppressed(&self) -> bool {
        self.suppressed_until
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Local-edit path
    // ------------------------------------------------------------------

    /// Feed one widget change notification into the engine.
    ///
    /// Returns a broadcast to hand to the transport, or the reason the
    /// change produced no traffic. The last-known text is updated before
    /// the throttle decision, so a throttled keystroke is still reflected
    /// locally and the next broadcast carries it.
    pub fn on_local_change(&mut self, origin: ChangeOrigin, text: &str) -> LocalOutcome {
        if self.is_suppressed() {
            return LocalOutcome::Dropped(DropReason::Suppressed);
        }
        if origin != ChangeOrigin::UserInput {
            return LocalOutcome::Dropped(DropReason::NotUserInput);
        }
        if text == self.last_known {
            return LocalOutcome::Dropped(DropReason::Identical);
        }

        self.last_known = text.to_string();
        self.last_author = Some(self.local.clone());
        self.last_revision = Timestamp::now();

        if let Some(sent_at) = self.last_broadcast_at {
            if sent_at.elapsed() < self.config.broadcast_min_interval {
                debug!(room = %self.room, "broadcast throttled, dropping update");
                return LocalOutcome::Dropped(DropReason::Throttled);
            }
        }
        self.last_broadcast_at = Some(Instant::now());

        LocalOutcome::Broadcast(WireMessage::CodeChange {
            room: self.room.clone(),
            text: self.last_known.clone(),
            author: self.local.clone(),
            revision: Some(self.last_revision),
        })
    }

    // ------------------------------------------------------------------
    // Remote-edit path
    // ------------------------------------------------------------------

    /// Apply an inbound code value to the widget.
    ///
    /// Captures cursor and scroll, enters Suppressed, sets the value,
    /// restores cursor/scroll and updates the last-known text. The
    /// suppression window opens before the widget is touched and expires on
    /// its own, so the change notification the set triggers is ignored even
    /// when the apply fails partway.
    pub fn apply_remote<E: EditorBuffer + ?Sized>(
        &mut self,
        editor: &mut E,
        text: &str,
        author: &ParticipantId,
    ) -> Result<RemoteOutcome> {
        if *author == self.local {
            return Ok(RemoteOutcome::IgnoredEcho);
        }
        if text == self.last_known {
            return Ok(RemoteOutcome::IgnoredIdentical);
        }

        let cursor = editor.cursor();
        let scroll = editor.scroll_info();
        self.suppressed_until = Some(Instant::now() + self.config.suppression_window);

        if let Err(err) = editor.set_value(text) {
            warn!(room = %self.room, %author, "applying remote snapshot failed: {err}");
            return Err(CoeditError::apply_failed(self.room.clone(), err.to_string()));
        }

        self.last_known = text.to_string();
        self.last_author = Some(author.clone());
        self.last_revision = Timestamp::now();

        editor.set_cursor(cursor);
        editor.scroll_to(scroll);
        Ok(RemoteOutcome::Applied)
    }

    /// Seed the widget from a persisted snapshot.
    ///
    /// Unlike [`ConvergenceEngine::apply_remote`] this skips the echo check:
    /// a restored snapshot usually carries this participant's own name as
    /// author (they saved it in a previous session). Suppression discipline
    /// is the same as for a remote apply.
    pub fn restore_snapshot<E: EditorBuffer + ?Sized>(
        &mut self,
        editor: &mut E,
        snapshot: &CodeSnapshot,
    ) -> Result<RemoteOutcome> {
        if snapshot.text == self.last_known {
            return Ok(RemoteOutcome::IgnoredIdentical);
        }

        let cursor = editor.cursor();
        let scroll = editor.scroll_info();
        self.suppressed_until = Some(Instant::now() + self.config.suppression_window);

        if let Err(err) = editor.set_value(&snapshot.text) {
            warn!(room = %self.room, "restoring persisted snapshot failed: {err}");
            return Err(CoeditError::apply_failed(self.room.clone(), err.to_string()));
        }

        self.last_known = snapshot.text.clone();
        self.last_author = snapshot.author.clone();
        self.last_revision = snapshot.revision;

        editor.set_cursor(cursor);
        editor.scroll_to(scroll);
        Ok(RemoteOutcome::Applied)
    }

    // ------------------------------------------------------------------
    // Initial-sync handshake
    // ------------------------------------------------------------------

    /// Start the initial-sync handshake for this room. Returns the
    /// sync-request to broadcast.
    pub fn begin_sync(&mut self) -> WireMessage {
        self.sync = SyncState::Pending {
            since: Instant::now(),
        };
        WireMessage::SyncRequest {
            room: self.room.clone(),
            requestor: self.local.clone(),
        }
    }

    /// Answer a peer's sync-request: any member holding non-empty code
    /// responds with the authoritative current text.
    pub fn on_sync_request(&self, requestor: &ParticipantId) -> Option<WireMessage> {
        if *requestor == self.local || self.last_known.is_empty() {
            return None;
        }
        Some(WireMessage::SyncResponse {
            room: self.room.clone(),
            text: self.last_known.clone(),
            author: self.local.clone(),
        })
    }

    /// Apply a sync-response. The first response wins; later ones carrying
    /// the same text are ignored by the identical-text check, and differing
    /// ones are indistinguishable from a concurrent edit under
    /// last-writer-wins, so they apply normally.
    pub fn on_sync_response<E: EditorBuffer + ?Sized>(
        &mut self,
        editor: &mut E,
        text: &str,
        author: &ParticipantId,
    ) -> Result<RemoteOutcome> {
        let outcome = self.apply_remote(editor, text, author)?;
        self.sync = SyncState::Converged;
        Ok(outcome)
    }

    /// Whether the handshake deadline has passed with no response. When it
    /// has, the room is treated as empty (this participant is first in) —
    /// not an error.
    pub fn sync_deadline_passed(&mut self) -> bool {
        match self.sync {
            SyncState::Pending { since } if since.elapsed() >= self.config.sync_wait => {
                debug!(room = %self.room, "sync-request timed out, treating room as empty");
                self.sync = SyncState::Converged;
                true
            }
            _ => false,
        }
    }

    /// Whether the handshake is still waiting for a response.
    pub fn sync_pending(&self) -> bool {
        matches!(self.sync, SyncState::Pending { .. })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
