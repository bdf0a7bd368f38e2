//! Connection wrapper that builds request envelopes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::rpc::types::{RpcRequest, RpcRequestInit};

/// A leaf connection plus its monotonic request-id counter.
#[derive(Debug)]
pub struct RpcConnection {
    connection: Connection,
    counter: AtomicU64,
}

impl RpcConnection {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            counter: AtomicU64::new(0),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Sends one call and returns its result. A JSON-RPC error object comes
    /// back as [`Error::Rpc`].
    pub async fn request(&self, init: &RpcRequestInit, timeout: Duration) -> Result<Value> {
        let request = RpcRequest::new(self.next_id(), init);
        let response = self.connection.call(&request, timeout).await?;

        match response.numeric_id() {
            Some(id) if id == request.id => response.into_result(),
            _ => Err(Error::invalid_response(format!(
                "response id {} does not match request id {}",
                response.id, request.id
            ))),
        }
    }
}
