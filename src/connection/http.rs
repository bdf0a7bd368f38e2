//! Stateless URL-backed transport.

use std::time::Duration;

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Bytes;
use hyper::client::conn::http1;
use hyper::header::{ACCEPT, CONNECTION, CONTENT_TYPE, HOST};
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use tracing::{debug, trace};

use crate::circuit::{CircuitStream, SharedCircuit};
use crate::connection::endpoint::Endpoint;
use crate::connection::tls;
use crate::error::{Error, Result};
use crate::rpc::types::{RpcRequest, RpcResponse};

/// Issues one HTTP/1.1 POST per call over a fresh circuit stream.
#[derive(Debug)]
pub struct UrlConnection {
    circuit: SharedCircuit,
    endpoint: Endpoint,
    max_response_bytes: usize,
}

impl UrlConnection {
    pub fn new(circuit: SharedCircuit, endpoint: Endpoint, max_response_bytes: usize) -> Self {
        Self {
            circuit,
            endpoint,
            max_response_bytes,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub async fn call(&self, request: &RpcRequest, timeout: Duration) -> Result<RpcResponse> {
        tokio::time::timeout(timeout, self.exchange(request))
            .await
            .map_err(|_| Error::timeout(timeout))?
    }

    async fn exchange(&self, request: &RpcRequest) -> Result<RpcResponse> {
        let stream = self.open_stream().await?;

        let (mut sender, conn) = http1::handshake::<_, Full<Bytes>>(TokioIo::new(stream))
            .await
            .map_err(|e| Error::connection(format!("HTTP handshake with {} failed: {e}", self.endpoint.host)))?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "HTTP connection ended with error");
            }
        });

        let body = serde_json::to_vec(request)?;
        let http_request = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.target())
            .header(HOST, self.endpoint.authority())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(CONNECTION, "close")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| Error::connection(format!("failed to build request: {e}")))?;

        let response = sender
            .send_request(http_request)
            .await
            .map_err(|e| Error::connection(format!("POST {} failed: {e}", self.endpoint.as_str())))?;
        let status = response.status();
        let bytes = Limited::new(response.into_body(), self.max_response_bytes)
            .collect()
            .await
            .map_err(|e| {
                if e.downcast_ref::<LengthLimitError>().is_some() {
                    Error::invalid_response(format!(
                        "response from {} exceeds {} bytes",
                        self.endpoint.as_str(),
                        self.max_response_bytes
                    ))
                } else {
                    Error::connection(format!("reading body from {} failed: {e}", self.endpoint.as_str()))
                }
            })?
            .to_bytes();

        trace!(status = %status, len = bytes.len(), method = %request.method, "HTTP response");

        match serde_json::from_slice::<RpcResponse>(&bytes) {
            Ok(response) => Ok(response),
            Err(_) if !status.is_success() => Err(Error::invalid_response(format!(
                "HTTP {status} from {}",
                self.endpoint.as_str()
            ))),
            Err(e) => Err(Error::invalid_response(format!(
                "malformed JSON-RPC body from {}: {e}",
                self.endpoint.as_str()
            ))),
        }
    }

    async fn open_stream(&self) -> Result<CircuitStream> {
        let stream = self.circuit.open(&self.endpoint.host, self.endpoint.port).await?;
        if self.endpoint.secure {
            tls::connect(&self.endpoint.host, stream).await
        } else {
            Ok(stream)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use crate::circuit::DirectCircuit;
    use crate::rpc::types::RpcRequestInit;

    /// Serves one HTTP response carrying `body`, then closes.
    async fn serve_once(body: String) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(body.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        port
    }

    fn connection(port: u16, max_response_bytes: usize) -> UrlConnection {
        let circuit: SharedCircuit = Arc::new(DirectCircuit::new(Duration::from_secs(1)));
        let endpoint = Endpoint::parse(&format!("http://127.0.0.1:{port}/")).unwrap();
        UrlConnection::new(circuit, endpoint, max_response_bytes)
    }

    fn request() -> RpcRequest {
        RpcRequest::new(1, &RpcRequestInit::new("eth_blockNumber", json!([])))
    }

    #[tokio::test]
    async fn test_response_within_limit() {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "result": "0x10" }).to_string();
        let port = serve_once(body).await;

        let response = connection(port, 1024).call(&request(), Duration::from_secs(2)).await.unwrap();
        assert_eq!(response.result, Some(json!("0x10")));
    }

    #[tokio::test]
    async fn test_oversized_response_is_rejected() {
        let padding = "f".repeat(64 * 1024);
        let body = json!({ "jsonrpc": "2.0", "id": 1, "result": format!("0x{padding}") }).to_string();
        let port = serve_once(body).await;

        let err = connection(port, 1024).call(&request(), Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)), "unexpected error: {err}");
    }
}
