//! Simulated local backend for the coedit protocol
//!
//! An in-memory hub plus a [`Transport`](coedit_core::transport::Transport)
//! implementation riding it. This is both the terminal fallback when no real
//! backend is reachable and the substrate for multi-participant tests.

pub mod hub;
pub mod transport;

pub use hub::LocalHub;
pub use transport::LocalTransport;
