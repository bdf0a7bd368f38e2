//! Persistent WebSocket transport and event loop.
//!
//! The connection spawns a tokio task that owns the socket and handles:
//!
//! - Outgoing calls from any number of callers
//! - Incoming responses, correlated to callers by JSON-RPC id
//! - Close detection, which fails every pending call and fires `closed()`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{client_async_with_config, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::circuit::{CircuitStream, SharedCircuit};
use crate::connection::cooldown::Cooldown;
use crate::connection::endpoint::Endpoint;
use crate::connection::tls;
use crate::connection::ConnectionSettings;
use crate::error::{Error, Result};
use crate::rpc::types::{RpcRequest, RpcResponse};

/// Maximum pending requests before rejecting new ones.
const MAX_PENDING_REQUESTS: usize = 100;

/// Map of request ids to response channels.
type CorrelationMap = HashMap<u64, oneshot::Sender<RpcResponse>>;

/// Internal commands for the event loop.
enum Command {
    Send {
        id: u64,
        text: String,
        response_tx: oneshot::Sender<RpcResponse>,
    },
    /// Drop the correlation entry of a call that timed out.
    Forget(u64),
    Close,
}

/// WebSocket connection to one backend over one circuit.
///
/// Calls from concurrent callers are paced by the cooldown. Dropping the
/// connection closes the socket.
#[derive(Debug)]
pub struct WebSocketConnection {
    url: String,
    command_tx: mpsc::UnboundedSender<Command>,
    correlation: Arc<Mutex<CorrelationMap>>,
    cooldown: Cooldown,
    closed: CancellationToken,
}

impl WebSocketConnection {
    /// Opens a stream through the circuit, adds TLS for `wss`, and performs
    /// the WebSocket handshake, all bounded by `handshake_timeout`.
    pub async fn connect(circuit: &SharedCircuit, endpoint: &Endpoint, settings: &ConnectionSettings) -> Result<Self> {
        let handshake_timeout = settings.handshake_timeout;
        let limits = WebSocketConfig::default()
            .max_message_size(Some(settings.max_response_bytes))
            .max_frame_size(Some(settings.max_response_bytes));
        let handshake = async {
            let stream = circuit.open(&endpoint.host, endpoint.port).await?;
            let stream = if endpoint.secure {
                tls::connect(&endpoint.host, stream).await?
            } else {
                stream
            };
            let (socket, _response) = client_async_with_config(endpoint.as_str(), stream, Some(limits))
                .await
                .map_err(|e| Error::connection(format!("WebSocket handshake with {} failed: {e}", endpoint.as_str())))?;
            Ok::<_, Error>(socket)
        };

        let socket = tokio::time::timeout(handshake_timeout, handshake)
            .await
            .map_err(|_| Error::timeout(handshake_timeout))??;

        debug!(url = %endpoint.as_str(), circuit = %circuit.id(), "WebSocket connected");
        Ok(Self::spawn(endpoint.as_str().to_string(), socket, settings.cooldown))
    }

    fn spawn(url: String, socket: WebSocketStream<CircuitStream>, cooldown: Duration) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::new()));
        let closed = CancellationToken::new();

        tokio::spawn(run_event_loop(
            url.clone(),
            socket,
            command_rx,
            Arc::clone(&correlation),
            closed.clone(),
        ));

        Self {
            url,
            command_tx,
            correlation,
            cooldown: Cooldown::new(cooldown),
            closed,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends a request and waits for the correlated response.
    ///
    /// The cooldown slot is awaited first and counts against `timeout`.
    pub async fn call(&self, request: &RpcRequest, timeout: Duration) -> Result<RpcResponse> {
        if self.closed.is_cancelled() {
            return Err(Error::connection(format!("WebSocket {} is closed", self.url)));
        }

        let exchange = async {
            self.cooldown.wait().await;

            {
                let correlation = self.correlation.lock();
                if correlation.len() >= MAX_PENDING_REQUESTS {
                    warn!(pending = correlation.len(), max = MAX_PENDING_REQUESTS, "Too many pending requests");
                    return Err(Error::connection(format!(
                        "too many pending requests: {}/{}",
                        correlation.len(),
                        MAX_PENDING_REQUESTS
                    )));
                }
            }

            let (response_tx, response_rx) = oneshot::channel();
            let text = serde_json::to_string(request)?;
            self.command_tx
                .send(Command::Send {
                    id: request.id,
                    text,
                    response_tx,
                })
                .map_err(|_| Error::connection(format!("WebSocket {} is closed", self.url)))?;

            response_rx
                .await
                .map_err(|_| Error::connection(format!("WebSocket {} closed before responding", self.url)))
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                let _ = self.command_tx.send(Command::Forget(request.id));
                Err(Error::timeout(timeout))
            }
        }
    }

    /// Resolves once the socket has closed for any reason.
    pub fn closed(&self) -> BoxFuture<'static, ()> {
        self.closed.clone().cancelled_owned().boxed()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Closes the socket. Called automatically on drop.
    pub fn close(&self) {
        let _ = self.command_tx.send(Command::Close);
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_event_loop(
    url: String,
    socket: WebSocketStream<CircuitStream>,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
    correlation: Arc<Mutex<CorrelationMap>>,
    closed: CancellationToken,
) {
    let (mut ws_write, mut ws_read) = socket.split();

    loop {
        tokio::select! {
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        handle_incoming(text.as_str(), &correlation);
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        match std::str::from_utf8(&bytes) {
                            Ok(text) => handle_incoming(text, &correlation),
                            Err(_) => trace!(url = %url, "Ignoring non-UTF-8 binary frame"),
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(url = %url, "WebSocket closed by remote");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(url = %url, error = %e, "WebSocket error");
                        break;
                    }
                    None => {
                        debug!(url = %url, "WebSocket stream ended");
                        break;
                    }
                    // Ping/Pong are answered by tungstenite.
                    _ => {}
                }
            }

            command = command_rx.recv() => {
                match command {
                    Some(Command::Send { id, text, response_tx }) => {
                        correlation.lock().insert(id, response_tx);
                        if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                            warn!(url = %url, error = %e, "Failed to send request");
                            correlation.lock().remove(&id);
                            break;
                        }
                    }
                    Some(Command::Forget(id)) => {
                        correlation.lock().remove(&id);
                        trace!(url = %url, id, "Removed timed-out correlation");
                    }
                    Some(Command::Close) | None => {
                        let _ = ws_write.close().await;
                        break;
                    }
                }
            }
        }
    }

    closed.cancel();

    // Dropping the senders fails every waiting caller.
    let pending = std::mem::take(&mut *correlation.lock());
    if !pending.is_empty() {
        debug!(url = %url, pending = pending.len(), "Failing pending requests");
    }
    debug!(url = %url, "Event loop terminated");
}

fn handle_incoming(text: &str, correlation: &Mutex<CorrelationMap>) {
    let response: RpcResponse = match serde_json::from_str(text) {
        Ok(response) => response,
        Err(e) => {
            trace!(error = %e, "Ignoring non-response message");
            return;
        }
    };

    let Some(id) = response.numeric_id() else {
        trace!("Ignoring message without a request id");
        return;
    };

    match correlation.lock().remove(&id) {
        Some(tx) => {
            let _ = tx.send(response);
        }
        None => trace!(id, "Response for unknown request"),
    }
}
