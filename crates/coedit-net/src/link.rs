//! WebSocket link shared by the networked backends
//!
//! Owns one connection's whole lifecycle on a spawned task: the initial dial
//! happens inline (so a failed or slow endpoint surfaces to the fallback
//! chain), after which the task pumps text frames both ways and, when
//! enabled, re-dials on a timer after a drop. A fresh dial carries no
//! server-side session state, so the link first writes the backend's replay
//! frames (topic subscriptions) and then reports the reconnect upstream so
//! the session can replay its join and sync. Closing the link cancels the
//! re-dial timer with it.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use coedit_core::errors::{CoeditError, Result, TransportError};
use coedit_core::transport::{TransportEvent, TransportEvents};
use coedit_core::types::BackendKind;

use crate::config::EndpointConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Frames to write first on a fresh connection, restoring whatever
/// connection-scoped state the backend keeps server-side.
pub(crate) type ReplayFrames = Arc<dyn Fn() -> Vec<String> + Send + Sync>;

const OUTBOUND_BUFFER: usize = 64;

/// Handle to a live (or re-dialing) WebSocket connection.
pub(crate) struct WsLink {
    outbound: mpsc::Sender<String>,
    shutdown: watch::Sender<bool>,
}

impl WsLink {
    /// Dial the endpoint and start the pump task. The first dial is bounded
    /// by the configured connect timeout; only later re-dials happen in the
    /// background.
    pub(crate) async fn open(
        backend: BackendKind,
        config: &EndpointConfig,
        frames: mpsc::Sender<String>,
        replay: ReplayFrames,
        events: Option<TransportEvents>,
    ) -> Result<Self> {
        config.validate()?;
        let stream = match timeout(config.connect_timeout, connect_async(config.url.as_str())).await
        {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                return Err(TransportError::ConnectionFailed {
                    backend,
                    reason: e.to_string(),
                }
                .into())
            }
            Err(_) => {
                return Err(TransportError::Timeout {
                    backend,
                    duration_ms: config.connect_timeout.as_millis() as u64,
                }
                .into())
            }
        };
        info!(%backend, url = %config.url, "websocket connected");

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(pump(
            backend,
            config.clone(),
            stream,
            outbound_rx,
            frames,
            replay,
            events,
            shutdown_rx,
        ));

        Ok(Self {
            outbound: outbound_tx,
            shutdown: shutdown_tx,
        })
    }

    pub(crate) async fn send(&self, frame: String) -> Result<()> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| CoeditError::send_failed("connection pump has stopped"))
    }

    /// Stop the pump task, which also cancels any pending re-dial.
    pub(crate) fn close(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for WsLink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connection pump: frames out of `outbound`, frames into `frames`, re-dial
/// on drop while `auto_reconnect` holds, exit on shutdown.
#[allow(clippy::too_many_arguments)]
async fn pump(
    backend: BackendKind,
    config: EndpointConfig,
    initial: WsStream,
    mut outbound: mpsc::Receiver<String>,
    frames: mpsc::Sender<String>,
    replay: ReplayFrames,
    events: Option<TransportEvents>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut stream = Some(initial);
    let mut redialed = false;
    loop {
        let ws = match stream.take() {
            Some(ws) => ws,
            None => match connect_async(config.url.as_str()).await {
                Ok((ws, _)) => {
                    info!(%backend, "websocket reconnected");
                    redialed = true;
                    ws
                }
                Err(e) => {
                    warn!(%backend, "reconnect failed: {e}");
                    if !wait_for_retry(&config.reconnect_interval, &mut shutdown).await {
                        return;
                    }
                    continue;
                }
            },
        };

        let (mut write, mut read) = ws.split();
        if redialed {
            redialed = false;
            // The fresh connection knows nothing about us; restore the
            // backend's connection-scoped state before resuming traffic.
            for frame in replay() {
                if let Err(e) = write.send(Message::Text(frame)).await {
                    warn!(%backend, "replay after reconnect failed: {e}");
                    break;
                }
            }
            if let Some(events) = &events {
                let _ = events.send(TransportEvent::Reconnected { backend }).await;
            }
        }

        loop {
            tokio::select! {
                frame = outbound.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = write.send(Message::Text(frame)).await {
                            warn!(%backend, "send failed: {e}");
                            break;
                        }
                    }
                    // Every sender gone: the transport was dropped.
                    None => return,
                },
                inbound = read.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if frames.send(text).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(%backend, "peer closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(%backend, "read failed: {e}");
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    return;
                }
            }
        }

        if let Some(events) = &events {
            let _ = events.send(TransportEvent::Disconnected { backend }).await;
        }
        if !config.auto_reconnect {
            debug!(%backend, "connection dropped, auto-reconnect disabled");
            return;
        }
        if !wait_for_retry(&config.reconnect_interval, &mut shutdown).await {
            return;
        }
    }
}

/// Sleep out the reconnect interval, or return false if shutdown arrives
/// first.
async fn wait_for_retry(interval: &Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = sleep(*interval) => true,
        _ = shutdown.changed() => false,
    }
}
