//! Networked transport backends for the coedit protocol
//!
//! Two WebSocket-based implementations of the core
//! [`Transport`](coedit_core::transport::Transport) trait: a direct
//! socket-style channel whose server routes by room, and a topic-based
//! pub/sub channel with explicit subscribe/publish envelopes. Both share one
//! connection pump with bounded initial dial and timer-driven re-dial.

pub mod config;
mod link;
pub mod pubsub;
pub mod socket;

pub use config::{EndpointConfig, NetConfig};
pub use pubsub::PubSubTransport;
pub use socket::SocketTransport;
