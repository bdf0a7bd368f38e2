//! Response envelopes.
//!
//! # Responsibilities
//! - Build JSON-RPC responses carrying the client's ids
//! - Map fetch failures to JSON-RPC error objects
//!
//! # Design Decisions
//! - Transport status is always 200; failures travel in the envelope
//! - When every backend that answered returned the same error object, that
//!   object is forwarded verbatim

use serde_json::{json, Value};

use crate::error::Error;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const INTERNAL_ERROR: i64 = -32603;

pub fn success(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

pub fn failure(id: Value, code: i64, message: &str, data: Option<Value>) -> Value {
    let mut error = json!({ "code": code, "message": message });
    if let Some(data) = data {
        error["data"] = data;
    }
    json!({ "jsonrpc": "2.0", "id": id, "error": error })
}

/// Envelope for a failed fetch.
pub fn from_error(id: Value, err: &Error) -> Value {
    match err {
        Error::ConsensusUnavailable { workers, errors } => match shared_rpc_error(errors) {
            Some(Error::Rpc { code, message, data }) => failure(id, *code, message, data.clone()),
            _ => failure(
                id,
                INTERNAL_ERROR,
                "consensus unavailable",
                Some(json!({
                    "workers": workers,
                    "errors": errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
                })),
            ),
        },
        Error::Rpc { code, message, data } => failure(id, *code, message, data.clone()),
        other => failure(id, INTERNAL_ERROR, &other.to_string(), None),
    }
}

/// The error object returned by every backend that answered, if they agree.
fn shared_rpc_error(errors: &[Error]) -> Option<&Error> {
    let mut answered = errors.iter().filter(|e| e.is_rpc());
    let first = answered.next()?;
    let key = rpc_key(first);
    answered.all(|e| rpc_key(e) == key).then_some(first)
}

fn rpc_key(err: &Error) -> Option<(i64, &str, Option<String>)> {
    match err {
        Error::Rpc { code, message, data } => {
            Some((*code, message.as_str(), data.as_ref().map(|d| d.to_string())))
        }
        _ => None,
    }
}
