//! Leaf connections to JSON-RPC backends.
//!
//! # Data Flow
//! ```text
//! backend URL ──► Endpoint::parse
//!                   │
//!        http(s) ───┴─── ws(s)
//!           │              │
//!     UrlConnection   WebSocketConnection ──► event loop task
//!    (POST per call)   (shared socket, paced by Cooldown)
//!           │              │
//!           └── circuit.open(host, port) [+ TLS] ──► backend
//! ```
//!
//! # Design Decisions
//! - TLS and WebSocket framing run on top of the circuit stream, so DNS and
//!   TCP both happen at the circuit's exit
//! - URL connections have no state to tear down; WebSocket connections
//!   close their socket on drop

pub mod cooldown;
pub mod endpoint;
pub mod http;
pub mod tls;
pub mod websocket;

use std::fmt;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::circuit::SharedCircuit;
use crate::error::Result;
use crate::rpc::types::{RpcRequest, RpcResponse};

pub use cooldown::Cooldown;
pub use endpoint::{Endpoint, Transport};
pub use http::UrlConnection;
pub use websocket::WebSocketConnection;

/// Settings shared by every connection of a chain.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Bound on opening a stream and completing transport handshakes.
    pub handshake_timeout: Duration,
    /// Spacing between calls on one WebSocket.
    pub cooldown: Duration,
    /// Largest response body or WebSocket message accepted from a backend.
    pub max_response_bytes: usize,
}

/// A connection to one backend over one circuit.
pub enum Connection {
    Url(UrlConnection),
    WebSocket(WebSocketConnection),
}

impl Connection {
    /// Builds the connection variant matching the URL scheme.
    ///
    /// URL connections are built without touching the network. WebSocket
    /// connections complete their handshake before returning.
    pub async fn open(circuit: SharedCircuit, url: &str, settings: &ConnectionSettings) -> Result<Self> {
        let endpoint = Endpoint::parse(url)?;
        match endpoint.transport {
            Transport::Http => Ok(Connection::Url(UrlConnection::new(
                circuit,
                endpoint,
                settings.max_response_bytes,
            ))),
            Transport::WebSocket => {
                let socket = WebSocketConnection::connect(&circuit, &endpoint, settings).await?;
                Ok(Connection::WebSocket(socket))
            }
        }
    }

    pub async fn call(&self, request: &RpcRequest, timeout: Duration) -> Result<RpcResponse> {
        match self {
            Connection::Url(connection) => connection.call(request, timeout).await,
            Connection::WebSocket(connection) => connection.call(request, timeout).await,
        }
    }

    /// Close signal, for variants that can close.
    pub fn closed(&self) -> Option<BoxFuture<'static, ()>> {
        match self {
            Connection::Url(_) => None,
            Connection::WebSocket(connection) => Some(connection.closed()),
        }
    }

    /// Calls awaiting a reply. Always zero for URL connections.
    pub fn in_flight(&self) -> usize {
        match self {
            Connection::Url(_) => 0,
            Connection::WebSocket(connection) => connection.pending_count(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Connection::Url(_) => "url",
            Connection::WebSocket(_) => "websocket",
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Connection::Url(connection) => connection.endpoint().as_str(),
            Connection::WebSocket(connection) => connection.url(),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("kind", &self.kind())
            .field("url", &self.url())
            .finish()
    }
}
