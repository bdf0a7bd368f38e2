//! Error types for the fetch layer.
//!
//! Every error is `Clone`: a pool slot keeps its construction error and
//! hands a copy to each caller awaiting that slot.

use serde_json::Value;
use thiserror::Error;

/// Errors produced by pools, circuits, connections and the consensus fetcher.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A circuit could not open a stream or a transport handshake failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A bounded call exceeded its deadline.
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// A backend URL has neither an http(s) nor a ws(s) scheme.
    #[error("Unknown protocol in backend URL '{0}'")]
    UnknownProtocol(String),

    /// Every fan-out worker failed.
    #[error("Consensus unavailable: all {workers} workers failed")]
    ConsensusUnavailable {
        /// Number of workers spawned.
        workers: usize,
        /// One error per worker, in completion order.
        errors: Vec<Error>,
    },

    /// Construction or fetch was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// The backend answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    /// The backend answered with something that is not a usable JSON-RPC response.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// SOCKS5 negotiation with the circuit provider failed.
    #[error("SOCKS5 error: {0}")]
    Socks(String),

    /// TLS setup or handshake failed.
    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    /// A setting is unusable at the point it is applied.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A pool was addressed outside its fixed capacity.
    #[error("Index {index} out of range for pool of capacity {capacity}")]
    IndexOutOfRange { index: usize, capacity: usize },
}

impl Error {
    /// Creates a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Creates a timeout error from a duration.
    pub fn timeout(after: std::time::Duration) -> Self {
        Self::Timeout(after.as_millis() as u64)
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Returns true if the error is a JSON-RPC error returned by a backend.
    #[inline]
    #[must_use]
    pub fn is_rpc(&self) -> bool {
        matches!(self, Self::Rpc { .. })
    }

    /// Returns true if the error is a timeout.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type for the fetch layer.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_display() {
        let err = Error::timeout(Duration::from_secs(3));
        assert_eq!(err.to_string(), "Timed out after 3000 ms");

        let err = Error::ConsensusUnavailable {
            workers: 5,
            errors: vec![Error::Cancelled; 5],
        };
        assert_eq!(err.to_string(), "Consensus unavailable: all 5 workers failed");

        let err = Error::Rpc {
            code: -32000,
            message: "execution reverted".into(),
            data: None,
        };
        assert!(err.is_rpc());
        assert!(err.to_string().contains("-32000"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(ref m) if m.contains("refused")));
    }
}
