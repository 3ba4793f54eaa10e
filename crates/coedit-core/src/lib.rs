//! Coedit Core
//!
//! Foundational types and state machines for real-time collaborative code
//! editing: the wire message model, the transport abstraction, room presence
//! tracking and the code convergence engine. Backends and the session
//! coordinator live in the companion crates (`coedit-local`, `coedit-net`,
//! `coedit-session`); this crate stays free of any concrete network stack.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod convergence;
pub mod editor;
pub mod errors;
pub mod exec;
pub mod message;
pub mod persist;
pub mod presence;
pub mod transport;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{ChannelConfig, CoeditConfig, EngineConfig, PresenceConfig, TransportConfig};
pub use convergence::{
    CodeSnapshot, ConvergenceEngine, DropReason, LocalOutcome, RemoteOutcome,
};
pub use editor::{ChangeOrigin, CursorPos, EditorBuffer, MemoryBuffer, ScrollInfo};
pub use errors::{CoeditError, EngineError, Result, TransportError};
pub use exec::{EchoBackend, ExecutionBackend, JobId, JobOutput, JobRequest, JobStatus};
pub use message::{MemberInfo, MessageKind, PresenceAction, WireMessage};
pub use persist::{MemoryStore, RoomStore};
pub use presence::{Departure, PresenceEntry, PresenceTracker};
pub use transport::{
    message_inbox, transport_events, MessageInbox, MessageOutlet, Transport, TransportEvent,
    TransportEventOutlet, TransportEvents,
};
pub use types::{
    BackendKind, ConnectionId, ConnectionState, ParticipantId, RoomId, Timestamp,
    TransportSession,
};
