//! JSON-RPC 2.0 envelopes and the per-connection request layer.

pub mod connection;
pub mod types;

pub use connection::RpcConnection;
pub use types::{RpcErrorObject, RpcRequest, RpcRequestInit, RpcResponse};
