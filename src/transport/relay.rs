//! WebSocket document bridge.
//!
//! Lets the extension transport drive a page that lives in another
//! process. A small shim inside the page connects to [`RelayServer`] and
//! mirrors the page's state over JSON frames.
//!
//! # Connection Flow
//!
//! 1. Rust binds the relay to `localhost:0` (random port)
//! 2. The page shim connects to [`RelayServer::ws_url`]
//! 3. The shim reports marker elements and forwards subscribed events
//! 4. The resulting [`RelayBridge`] is handed to the extension transport
//!
//! # Frames
//!
//! ```json
//! { "type": "markers", "ids": ["..."] }              // shim → relay
//! { "type": "event", "name": "...", "detail": {} }   // shim → relay
//! { "type": "dispatch", "name": "...", "detail": {} } // relay → shim
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};

use super::DocumentBridge;

// ============================================================================
// Constants
// ============================================================================

/// Timeout for waiting for the page shim to connect.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Frame
// ============================================================================

/// A message exchanged with the page shim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Frame {
    /// Snapshot of the marker element IDs present in the page.
    Markers {
        /// Element IDs.
        ids: Vec<String>,
    },
    /// An event raised in the page.
    Event {
        /// Event name.
        name: String,
        /// Event detail.
        detail: Value,
    },
    /// An event the page must raise.
    Dispatch {
        /// Event name.
        name: String,
        /// Event detail.
        detail: Value,
    },
}

// ============================================================================
// RelayServer
// ============================================================================

/// A relay that is bound but not yet connected.
pub struct RelayServer {
    /// TCP listener for incoming connections.
    listener: TcpListener,
    /// Port the server is bound to.
    port: u16,
}

impl RelayServer {
    /// Binds the relay to the specified address and port.
    ///
    /// Use port 0 to let the OS assign a random available port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(ip: IpAddr, port: u16) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
        let actual_port = listener.local_addr()?.port();

        debug!(port = actual_port, "Relay bound");

        Ok(Self {
            listener,
            port: actual_port,
        })
    }

    /// Returns the port the relay is bound to.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the WebSocket URL the shim connects to.
    ///
    /// Format: `ws://127.0.0.1:{port}`
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    /// Returns the local socket address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.port)
    }

    /// Accepts the page shim's connection.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if nothing connects within 30s
    /// - [`Error::Connection`] if the WebSocket upgrade fails
    pub async fn accept(self) -> Result<RelayBridge> {
        let (stream, addr) = timeout(CONNECTION_TIMEOUT, self.listener.accept())
            .await
            .map_err(|_| Error::connection_timeout(CONNECTION_TIMEOUT.as_millis() as u64))??;

        debug!(?addr, "TCP connection accepted");

        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        info!(port = self.port, "Relay connection established");

        Ok(RelayBridge::new(ws_stream))
    }
}

// ============================================================================
// RelayBridge
// ============================================================================

/// Internal commands for the relay loop.
enum RelayCommand {
    /// Forward a frame to the shim.
    Send(Frame),
    /// Close the connection.
    Shutdown,
}

/// State shared between the bridge handles and the relay loop.
#[derive(Default)]
struct RelayState {
    markers: RwLock<FxHashSet<String>>,
    listeners: Mutex<FxHashMap<String, mpsc::UnboundedSender<Value>>>,
    closed: AtomicBool,
}

/// A page document reached through the relay.
///
/// Cloning is cheap; clones share the connection.
#[derive(Clone)]
pub struct RelayBridge {
    command_tx: mpsc::UnboundedSender<RelayCommand>,
    state: Arc<RelayState>,
}

impl RelayBridge {
    /// Wraps an established WebSocket and spawns the relay loop.
    pub(crate) fn new(ws_stream: WebSocketStream<TcpStream>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let state = Arc::new(RelayState::default());

        tokio::spawn(Self::run_relay_loop(
            ws_stream,
            command_rx,
            Arc::clone(&state),
        ));

        Self { command_tx, state }
    }

    /// Returns the marker IDs last reported by the shim.
    #[must_use]
    pub fn markers(&self) -> Vec<String> {
        self.state.markers.read().iter().cloned().collect()
    }

    /// Returns `true` once the connection is gone.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Closes the connection.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(RelayCommand::Shutdown);
    }

    /// Relay loop that handles WebSocket I/O.
    async fn run_relay_loop(
        ws_stream: WebSocketStream<TcpStream>,
        mut command_rx: mpsc::UnboundedReceiver<RelayCommand>,
        state: Arc<RelayState>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_frame(&text, &state);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("Relay closed by page");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "Relay WebSocket error");
                            break;
                        }

                        None => {
                            debug!("Relay stream ended");
                            break;
                        }

                        _ => {}
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(RelayCommand::Send(frame)) => {
                            let json = match serde_json::to_string(&frame) {
                                Ok(json) => json,
                                Err(e) => {
                                    warn!(error = %e, "Failed to serialize frame");
                                    continue;
                                }
                            };

                            if let Err(e) = ws_write.send(Message::Text(json.into())).await {
                                warn!(error = %e, "Failed to send frame");
                                break;
                            }
                        }

                        Some(RelayCommand::Shutdown) => {
                            debug!("Relay shutdown requested");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Relay command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        state.closed.store(true, Ordering::SeqCst);
        // Dropping the senders ends every subscription.
        state.listeners.lock().clear();

        debug!("Relay loop terminated");
    }

    /// Applies a frame received from the shim.
    fn handle_incoming_frame(text: &str, state: &RelayState) {
        match serde_json::from_str::<Frame>(text) {
            Ok(Frame::Markers { ids }) => {
                trace!(count = ids.len(), "Markers updated");
                *state.markers.write() = ids.into_iter().collect();
            }

            Ok(Frame::Event { name, detail }) => {
                let listeners = state.listeners.lock();
                match listeners.get(&name) {
                    Some(tx) => {
                        let _ = tx.send(detail);
                    }
                    None => trace!(%name, "Event without listener"),
                }
            }

            Ok(Frame::Dispatch { name, .. }) => {
                warn!(%name, "Unexpected dispatch frame from page");
            }

            Err(e) => {
                warn!(error = %e, "Failed to parse relay frame");
            }
        }
    }
}

impl DocumentBridge for RelayBridge {
    fn has_element(&self, id: &str) -> bool {
        self.state.markers.read().contains(id)
    }

    fn dispatch_event(&self, name: &str, detail: Value) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let frame = Frame::Dispatch {
            name: name.to_string(),
            detail,
        };
        self.command_tx
            .send(RelayCommand::Send(frame))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn listen(&self, name: &str) -> Result<mpsc::UnboundedReceiver<Value>> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.state.listeners.lock().insert(name.to_string(), tx);
        Ok(rx)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio_tungstenite::{MaybeTlsStream, connect_async};

    use crate::install::EXTENSION_MARKER_ID;
    use crate::protocol::{Command, Request};
    use crate::transport::{
        ExtensionTransport, REQUEST_EVENT, RESPONSE_EVENT, Timings, Transport,
    };

    type Shim = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn connect() -> (RelayBridge, Shim) {
        let server = RelayServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
            .await
            .expect("bind should succeed");
        let url = server.ws_url();

        let (bridge, shim) = tokio::join!(server.accept(), connect_async(url));
        let (shim, _) = shim.expect("shim connects");
        (bridge.expect("relay accepts"), shim)
    }

    async fn send_frame(shim: &mut Shim, frame: &Frame) {
        let json = serde_json::to_string(frame).expect("serialize");
        shim.send(Message::Text(json.into())).await.expect("send");
    }

    async fn next_frame(shim: &mut Shim) -> Frame {
        loop {
            match shim.next().await.expect("frame").expect("message") {
                Message::Text(text) => return serde_json::from_str(&text).expect("parse"),
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_server_bind_random_port() {
        let server = RelayServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
            .await
            .expect("bind should succeed");

        assert!(server.port() > 0);
        assert_eq!(server.ws_url(), format!("ws://127.0.0.1:{}", server.port()));
        assert_eq!(server.local_addr().port(), server.port());
    }

    #[test]
    fn test_frame_format() {
        let frame = Frame::Dispatch {
            name: "e".into(),
            detail: json!({ "a": 1 }),
        };
        assert_eq!(
            serde_json::to_value(&frame).expect("serialize"),
            json!({ "type": "dispatch", "name": "e", "detail": { "a": 1 } })
        );
    }

    #[tokio::test]
    async fn test_markers_and_events_reach_bridge() {
        let (bridge, mut shim) = connect().await;
        let mut events = bridge.listen("ping").expect("listen");

        send_frame(&mut shim, &Frame::Markers { ids: vec!["m".into()] }).await;
        send_frame(
            &mut shim,
            &Frame::Event {
                name: "ping".into(),
                detail: json!(42),
            },
        )
        .await;

        assert_eq!(events.recv().await, Some(json!(42)));
        assert!(bridge.has_element("m"));
        assert!(!bridge.has_element("other"));
    }

    #[tokio::test]
    async fn test_dispatch_reaches_shim() {
        let (bridge, mut shim) = connect().await;

        bridge
            .dispatch_event("pong", json!({ "x": true }))
            .expect("dispatch");

        assert_eq!(
            next_frame(&mut shim).await,
            Frame::Dispatch {
                name: "pong".into(),
                detail: json!({ "x": true }),
            }
        );
    }

    #[tokio::test]
    async fn test_page_close_ends_subscriptions() {
        let (bridge, mut shim) = connect().await;
        let mut events = bridge.listen("ping").expect("listen");

        shim.close(None).await.expect("close");

        assert_eq!(events.recv().await, None);
        assert!(bridge.is_closed());
        assert!(bridge.dispatch_event("x", Value::Null).is_err());
    }

    #[tokio::test]
    async fn test_extension_transport_over_relay() {
        let (bridge, mut shim) = connect().await;
        let transport =
            ExtensionTransport::new(Arc::new(bridge.clone()), Timings::default()).expect("transport");

        send_frame(
            &mut shim,
            &Frame::Markers {
                ids: vec![EXTENSION_MARKER_ID.into()],
            },
        )
        .await;

        let promise = transport.send(Request::new(Command::GetVersion, None), None);

        let Frame::Dispatch { name, detail } = next_frame(&mut shim).await else {
            panic!("expected dispatch frame");
        };
        assert_eq!(name, REQUEST_EVENT);
        assert_eq!(detail["command"], "getVersion");

        send_frame(
            &mut shim,
            &Frame::Event {
                name: RESPONSE_EVENT.into(),
                detail: json!({
                    "requestId": detail["requestId"],
                    "success": true,
                    "response": "2.3.0"
                }),
            },
        )
        .await;

        assert_eq!(promise.await.expect("version"), json!("2.3.0"));
        assert!(bridge.has_element(EXTENSION_MARKER_ID));
    }
}
