//! Backend selection with fallback
//!
//! Tries the configured backends in order under a bounded timeout and ends
//! at the simulated local transport, which cannot fail. Selection is a hard
//! cutover: a losing candidate is discarded entirely, never kept warm for
//! later arbitration. Past this boundary a session always has a working
//! transport; degraded connectivity surfaces as notices, not errors.

use tokio::time::timeout;
use tracing::{info, warn};

use coedit_core::config::TransportConfig;
use coedit_core::transport::{MessageInbox, Transport, TransportEvent, TransportEvents};
use coedit_core::types::BackendKind;
use coedit_local::{LocalHub, LocalTransport};

/// Ordered connect candidates, terminated by a [`LocalTransport`] on the
/// given hub.
pub struct BackendChain {
    candidates: Vec<Box<dyn Transport>>,
    hub: LocalHub,
}

impl BackendChain {
    pub fn new(hub: LocalHub) -> Self {
        Self {
            candidates: Vec::new(),
            hub,
        }
    }

    /// Append a candidate; earlier candidates are preferred.
    pub fn with_candidate(mut self, transport: Box<dyn Transport>) -> Self {
        self.candidates.push(transport);
        self
    }

    /// Connect the first candidate that accepts within the timeout, or the
    /// local transport when none does. Never fails; the returned events
    /// describe what happened along the way for user-visible notices.
    /// Runtime events (drops, re-dials) flow through `runtime_events` after
    /// the cutover.
    pub async fn establish(
        self,
        inbox: MessageInbox,
        runtime_events: TransportEvents,
        config: &TransportConfig,
    ) -> (Box<dyn Transport>, Vec<TransportEvent>) {
        let mut events = Vec::new();
        let mut remaining = self.candidates.into_iter().peekable();

        while let Some(mut candidate) = remaining.next() {
            let backend = candidate.backend();
            candidate.attach_inbox(inbox.clone());
            candidate.attach_events(runtime_events.clone());
            match timeout(config.connect_timeout, candidate.connect()).await {
                Ok(Ok(())) => {
                    info!(%backend, "backend accepted connection");
                    events.push(TransportEvent::Connected { backend });
                    return (candidate, events);
                }
                Ok(Err(e)) => warn!(%backend, "backend refused connection: {e}"),
                Err(_) => warn!(%backend, "backend connect timed out"),
            }
            let next = remaining
                .peek()
                .map(|t| t.backend())
                .unwrap_or(BackendKind::Local);
            events.push(TransportEvent::FellBack {
                from: backend,
                to: next,
            });
        }

        let mut local = LocalTransport::new(self.hub);
        local.attach_inbox(inbox);
        if let Err(e) = local.connect().await {
            // Registration is in-memory and an inbox is attached; nothing
            // is left for connect to fail on.
            warn!("local transport refused to connect: {e}");
        }
        events.push(TransportEvent::Connected {
            backend: BackendKind::Local,
        });
        (Box::new(local), events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coedit_core::config::TransportConfig;
    use coedit_core::transport::message_inbox;
    use std::time::Duration;

    #[tokio::test]
    async fn test_empty_chain_lands_on_local() {
        let hub = LocalHub::with_delay(Duration::from_millis(1));
        let (tx, _rx) = message_inbox(8);
        let (events_tx, _events_rx) = coedit_core::transport::transport_events(8);
        let (transport, events) = BackendChain::new(hub)
            .establish(tx, events_tx, &TransportConfig::testing())
            .await;

        assert_eq!(transport.backend(), BackendKind::Local);
        assert!(transport.session().is_connected());
        assert_eq!(
            events,
            vec![TransportEvent::Connected {
                backend: BackendKind::Local
            }]
        );
    }
}
