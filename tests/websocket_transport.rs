//! WebSocket connections: correlation, pacing, and reconnection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use circuit_rpc::circuit::SharedCircuit;
use circuit_rpc::connection::{Connection, ConnectionSettings};
use circuit_rpc::consensus::{fetch_or_fail, Agreement, FetchOptions};
use circuit_rpc::ethereum::EthereumContext;
use circuit_rpc::rpc::{RpcConnection, RpcRequestInit};
use circuit_rpc::Error;

mod common;
use common::{Answer, FixedRandom, PinnedCircuit, PinnedCircuits, WsBackend};

/// Replies with `params[0]` after `params[1]` milliseconds.
async fn echo_backend() -> WsBackend {
    common::start_ws_backend(|request| async move {
        let value = request["params"][0].clone();
        let delay = request["params"][1].as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Answer::Result(value)
    })
    .await
}

async fn open(backend: &WsBackend, cooldown: Duration) -> RpcConnection {
    let circuit: SharedCircuit = Arc::new(PinnedCircuit::new(backend.addr));
    let settings = ConnectionSettings {
        handshake_timeout: Duration::from_secs(2),
        cooldown,
        max_response_bytes: 64 * 1024,
    };
    let connection = Connection::open(circuit, "ws://backend.test/", &settings).await.unwrap();
    assert_eq!(connection.kind(), "websocket");
    RpcConnection::new(connection)
}

fn echo(value: &str, delay_ms: u64) -> RpcRequestInit {
    RpcRequestInit::new("echo", json!([value, delay_ms]))
}

#[tokio::test]
async fn test_out_of_order_replies_are_correlated() {
    let backend = echo_backend().await;
    let rpc = open(&backend, Duration::ZERO).await;

    let slow = echo("slow", 200);
    let fast = echo("fast", 0);
    let (slow, fast) = tokio::join!(
        rpc.request(&slow, Duration::from_secs(1)),
        rpc.request(&fast, Duration::from_secs(1)),
    );
    assert_eq!(slow.unwrap(), json!("slow"));
    assert_eq!(fast.unwrap(), json!("fast"));
    assert_eq!(rpc.connection().in_flight(), 0);
}

#[tokio::test]
async fn test_cooldown_spaces_calls() {
    let backend = echo_backend().await;
    let rpc = open(&backend, Duration::from_millis(100)).await;

    let (a, b, c) = (echo("a", 0), echo("b", 0), echo("c", 0));
    let start = Instant::now();
    let (ra, rb, rc) = tokio::join!(
        rpc.request(&a, Duration::from_secs(2)),
        rpc.request(&b, Duration::from_secs(2)),
        rpc.request(&c, Duration::from_secs(2)),
    );
    assert!(ra.is_ok() && rb.is_ok() && rc.is_ok());
    assert!(start.elapsed() >= Duration::from_millis(200), "took {:?}", start.elapsed());
}

#[tokio::test]
async fn test_close_fails_pending_calls() {
    let backend = common::start_ws_backend(|_| async { Answer::Silence }).await;
    let rpc = open(&backend, Duration::ZERO).await;

    let trigger = backend.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.drop_connections();
    });

    let start = Instant::now();
    let err = rpc.request(&echo("never", 0), Duration::from_secs(2)).await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)), "unexpected error: {err}");
    assert!(start.elapsed() < Duration::from_secs(1));

    let closed = rpc.connection().closed().unwrap();
    tokio::time::timeout(Duration::from_millis(100), closed).await.unwrap();
}

#[tokio::test]
async fn test_oversized_message_closes_socket() {
    let backend = common::start_ws_backend(|_| async { Answer::Result(json!("f".repeat(128 * 1024))) }).await;
    let rpc = open(&backend, Duration::ZERO).await;

    let err = rpc.request(&echo("big", 0), Duration::from_secs(2)).await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)), "unexpected error: {err}");

    let closed = rpc.connection().closed().unwrap();
    tokio::time::timeout(Duration::from_millis(100), closed).await.unwrap();
}

#[tokio::test]
async fn test_timed_out_call_is_forgotten() {
    let backend = echo_backend().await;
    let rpc = open(&backend, Duration::ZERO).await;

    let err = rpc.request(&echo("late", 300), Duration::from_millis(50)).await.unwrap_err();
    assert!(err.is_timeout());

    // The late reply is dropped and later calls still line up.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(rpc.request(&echo("next", 0), Duration::from_secs(1)).await.unwrap(), json!("next"));
}

#[tokio::test]
async fn test_fetch_over_websockets_reconnects() {
    let backend = common::start_ws_backend(|_| async { Answer::Result(json!("0x5")) }).await;
    let circuits = PinnedCircuits::to(&[backend.addr, backend.addr, backend.addr]);
    let ctx = EthereumContext::new(
        common::chain(&["ws://backend.test/"]),
        &circuits.pool,
        common::options(Arc::new(FixedRandom { coin: true })),
    );

    let init = RpcRequestInit::new("eth_blockNumber", json!([]));
    let fetched = fetch_or_fail(&ctx, &init, FetchOptions::default()).await.unwrap();
    assert_eq!(fetched.value, json!("0x5"));
    assert_eq!(fetched.provenance.agreement, Agreement::Unanimous);
    assert_eq!(backend.connections(), 3);

    backend.drop_connections();
    assert!(common::eventually(Duration::from_secs(2), || backend.connections() == 6).await);

    let fetched = fetch_or_fail(&ctx, &init, FetchOptions::default()).await.unwrap();
    assert_eq!(fetched.value, json!("0x5"));
    assert_eq!(fetched.provenance.successes, 3);
}
