//! Shared utilities for integration testing: mock JSON-RPC backends,
//! circuits pinned to local addresses, and context builders.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use circuit_rpc::circuit::{Circuit, CircuitId, CircuitPool, CircuitStream, SharedCircuit};
use circuit_rpc::config::{ChainConfig, RetryConfig};
use circuit_rpc::consensus::RandomSource;
use circuit_rpc::ethereum::{ContextOptions, EthereumContext};
use circuit_rpc::pool::{ResourcePool, SlotContext};
use circuit_rpc::resilience::TimeoutPolicy;
use circuit_rpc::Error;

// ============================================================================
// Mock backends
// ============================================================================

/// What a mock backend does with one call.
#[derive(Debug, Clone)]
pub enum Answer {
    Result(Value),
    Error { code: i64, message: String },
    /// Never reply.
    Silence,
}

/// A running mock backend.
#[derive(Debug, Clone)]
pub struct Backend {
    pub addr: SocketAddr,
    calls: Arc<AtomicUsize>,
}

impl Backend {
    /// Calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Start an HTTP JSON-RPC backend that answers every call with `f(request)`.
pub async fn start_rpc_backend<F, Fut>(f: F) -> Backend
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Answer> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let f = Arc::new(f);

    let counter = Arc::clone(&calls);
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = Arc::clone(&f);
                    let counter = Arc::clone(&counter);
                    tokio::spawn(async move {
                        let Some(body) = read_http_body(&mut socket).await else {
                            return;
                        };
                        let Ok(request) = serde_json::from_slice::<Value>(&body) else {
                            return;
                        };
                        counter.fetch_add(1, Ordering::SeqCst);
                        let Some(reply) = envelope(&request, f(request.clone()).await) else {
                            std::future::pending::<()>().await;
                            return;
                        };

                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            reply.len(),
                            reply
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    Backend { addr, calls }
}

/// Start a backend that always returns `result`, after `delay`.
pub async fn fixed_backend(result: Value, delay: Duration) -> Backend {
    start_rpc_backend(move |_| {
        let result = result.clone();
        async move {
            tokio::time::sleep(delay).await;
            Answer::Result(result)
        }
    })
    .await
}

/// Start a backend that always returns a JSON-RPC error.
pub async fn failing_backend(code: i64, message: &str) -> Backend {
    let message = message.to_string();
    start_rpc_backend(move |_| {
        let message = message.clone();
        async move { Answer::Error { code, message } }
    })
    .await
}

fn envelope(request: &Value, answer: Answer) -> Option<String> {
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let body = match answer {
        Answer::Result(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Answer::Error { code, message } => {
            json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
        }
        Answer::Silence => return None,
    };
    Some(body.to_string())
}

async fn read_http_body(socket: &mut TcpStream) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Some(buf[header_end..header_end + length].to_vec())
}

/// A running WebSocket JSON-RPC backend.
#[derive(Debug, Clone)]
pub struct WsBackend {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    kick: broadcast::Sender<()>,
}

impl WsBackend {
    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Close every open socket from the server side.
    pub fn drop_connections(&self) {
        let _ = self.kick.send(());
    }
}

/// A local address with nothing listening on it.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Start a WebSocket backend. Calls are answered concurrently, so replies
/// may arrive out of request order.
pub async fn start_ws_backend<F, Fut>(f: F) -> WsBackend
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Answer> + Send + 'static,
{
    start_ws_backend_on("127.0.0.1:0".parse().unwrap(), f).await
}

/// Start a WebSocket backend bound to `addr`.
pub async fn start_ws_backend_on<F, Fut>(addr: SocketAddr, f: F) -> WsBackend
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Answer> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let (kick, _) = broadcast::channel(16);
    let f = Arc::new(f);

    let counter = Arc::clone(&connections);
    let kicker = kick.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let f = Arc::clone(&f);
            let mut kicked = kicker.subscribe();
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let Ok(ws) = tokio_tungstenite::accept_async(socket).await else {
                    return;
                };
                let (mut write, mut read) = ws.split();
                let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<String>();

                loop {
                    tokio::select! {
                        incoming = read.next() => match incoming {
                            Some(Ok(Message::Text(text))) => {
                                let Ok(request) = serde_json::from_str::<Value>(text.as_str()) else {
                                    continue;
                                };
                                let f = Arc::clone(&f);
                                let reply_tx = reply_tx.clone();
                                tokio::spawn(async move {
                                    if let Some(reply) = envelope(&request, f(request.clone()).await) {
                                        let _ = reply_tx.send(reply);
                                    }
                                });
                            }
                            Some(Ok(_)) => {}
                            _ => break,
                        },
                        Some(reply) = reply_rx.recv() => {
                            if write.send(Message::Text(reply.into())).await.is_err() {
                                break;
                            }
                        }
                        _ = kicked.recv() => {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    }
                }
            });
        }
    });

    WsBackend {
        addr,
        connections,
        kick,
    }
}

// ============================================================================
// Circuits
// ============================================================================

/// A circuit that ignores the requested host and connects to one local
/// address, so circuit `i` always reaches backend `i`.
#[derive(Debug)]
pub struct PinnedCircuit {
    id: CircuitId,
    target: SocketAddr,
    closed: CancellationToken,
}

impl PinnedCircuit {
    pub fn new(target: SocketAddr) -> Self {
        Self {
            id: CircuitId::new(),
            target,
            closed: CancellationToken::new(),
        }
    }

    pub fn close(&self) {
        self.closed.cancel();
    }
}

#[async_trait]
impl Circuit for PinnedCircuit {
    fn id(&self) -> CircuitId {
        self.id
    }

    async fn open(&self, _host: &str, _port: u16) -> circuit_rpc::Result<CircuitStream> {
        if self.closed.is_cancelled() {
            return Err(Error::connection("circuit closed"));
        }
        let stream = TcpStream::connect(self.target)
            .await
            .map_err(|e| Error::connection(format!("connect to {} failed: {e}", self.target)))?;
        Ok(Box::new(stream))
    }

    fn closed(&self) -> BoxFuture<'static, ()> {
        Box::pin(self.closed.clone().cancelled_owned())
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// A circuit pool whose slot `i` is pinned to `targets[i]`.
///
/// A `None` target makes that slot's construction fail.
pub struct PinnedCircuits {
    pub pool: CircuitPool,
    targets: Arc<Mutex<Vec<Option<SocketAddr>>>>,
    built: Arc<Mutex<Vec<Vec<Arc<PinnedCircuit>>>>>,
}

impl PinnedCircuits {
    pub fn new(targets: Vec<Option<SocketAddr>>) -> Self {
        let delays = vec![Duration::ZERO; targets.len()];
        Self::with_delays(targets, delays)
    }

    /// Like [`PinnedCircuits::new`], but slot `i` takes `delays[i]` to
    /// settle on every construction.
    pub fn with_delays(targets: Vec<Option<SocketAddr>>, delays: Vec<Duration>) -> Self {
        let built = Arc::new(Mutex::new(vec![Vec::new(); targets.len()]));
        let capacity = targets.len();
        let targets = Arc::new(Mutex::new(targets));

        let pool: CircuitPool = {
            let targets = Arc::clone(&targets);
            let built = Arc::clone(&built);
            ResourcePool::new("circuits", capacity, move |slot: SlotContext| {
                let target = targets.lock()[slot.index()];
                let delay = delays[slot.index()];
                let built = Arc::clone(&built);
                async move {
                    tokio::time::sleep(delay).await;
                    let target = target.ok_or_else(|| Error::connection("circuit refused"))?;
                    let circuit = Arc::new(PinnedCircuit::new(target));
                    built.lock()[slot.index()].push(Arc::clone(&circuit));
                    slot.restart_on(circuit.closed());
                    Ok(circuit as SharedCircuit)
                }
            })
        };

        Self {
            pool,
            targets,
            built,
        }
    }

    /// One circuit per backend, in order.
    pub fn to(backends: &[SocketAddr]) -> Self {
        Self::new(backends.iter().copied().map(Some).collect())
    }

    pub fn set_target(&self, index: usize, target: Option<SocketAddr>) {
        self.targets.lock()[index] = target;
    }

    /// Number of circuits successfully built for `index`.
    pub fn builds(&self, index: usize) -> usize {
        self.built.lock()[index].len()
    }

    /// The most recently built circuit for `index`.
    pub fn latest(&self, index: usize) -> Arc<PinnedCircuit> {
        Arc::clone(self.built.lock()[index].last().unwrap())
    }
}

// ============================================================================
// Contexts
// ============================================================================

/// Always picks the same side of a tie and the first candidate connection.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom {
    pub coin: bool,
}

impl RandomSource for FixedRandom {
    fn coin_flip(&self) -> bool {
        self.coin
    }

    fn pick(&self, _len: usize) -> usize {
        0
    }
}

pub fn chain(urls: &[&str]) -> ChainConfig {
    ChainConfig {
        name: "ethereum".into(),
        chain_id: 1,
        urls: urls.iter().map(|url| url.to_string()).collect(),
        fanout: None,
        max_response_bytes: 64 * 1024,
    }
}

/// Short timeouts for local backends: 600 ms per request.
pub fn options(random: Arc<dyn RandomSource>) -> ContextOptions {
    ContextOptions {
        timeouts: TimeoutPolicy {
            ping: Duration::from_millis(200),
            request_multiplier: 3,
            handshake_multiplier: 9,
        },
        cooldown: Duration::ZERO,
        retries: RetryConfig {
            base_delay_ms: 10,
            max_delay_ms: 50,
        },
        random,
    }
}

/// A context querying one backend per circuit over `http://`.
pub fn http_context(circuits: &PinnedCircuits, random: Arc<dyn RandomSource>) -> EthereumContext {
    http_context_with(circuits, options(random))
}

pub fn http_context_with(circuits: &PinnedCircuits, options: ContextOptions) -> EthereumContext {
    EthereumContext::new(chain(&["http://backend.test/"]), &circuits.pool, options)
}

/// Polls `condition` every 10 ms until it holds or `within` elapses.
pub async fn eventually<F>(within: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
