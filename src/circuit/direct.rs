//! Plain TCP circuit for development and tests.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::circuit::{Circuit, CircuitId, CircuitStream};
use crate::error::{Error, Result};

/// Circuit that connects straight to the target without any anonymization.
#[derive(Debug)]
pub struct DirectCircuit {
    id: CircuitId,
    connect_timeout: Duration,
    closed: CancellationToken,
}

impl DirectCircuit {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            id: CircuitId::new(),
            connect_timeout,
            closed: CancellationToken::new(),
        }
    }

    /// Marks the circuit unusable and fires its close signal.
    pub fn close(&self) {
        self.closed.cancel();
    }
}

#[async_trait]
impl Circuit for DirectCircuit {
    fn id(&self) -> CircuitId {
        self.id
    }

    async fn open(&self, host: &str, port: u16) -> Result<CircuitStream> {
        if self.closed.is_cancelled() {
            return Err(Error::connection(format!("{} is closed", self.id)));
        }
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| Error::timeout(self.connect_timeout))?
            .map_err(|e| Error::connection(format!("{host}:{port}: {e}")))?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }

    fn closed(&self) -> BoxFuture<'static, ()> {
        self.closed.clone().cancelled_owned().boxed()
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
