//! Session coordination for the coedit protocol
//!
//! Wires a connected transport, the convergence engine and the presence
//! tracker into one per-room session task: backend selection with fallback,
//! join/announce, the initial-sync handshake, a single scheduler for all
//! periodic work and guaranteed-cleanup teardown.

pub mod connect;
pub mod coordinator;
pub mod scheduler;

pub use connect::BackendChain;
pub use coordinator::{RoomSession, RoomSessionHandle, SessionCommand, SessionEvent};
pub use scheduler::{Scheduler, Tick};
