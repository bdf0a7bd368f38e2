//! Request handling.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4)
//! - Parse JSON-RPC bodies, single or batch
//! - Read per-request fetch options from headers
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - An invalid call inside a batch fails alone; its siblings still run

use axum::http::{HeaderMap, HeaderValue, Request};
use serde_json::Value;
use tower_http::request_id::{MakeRequestId, RequestId};

use crate::rpc::RpcRequestInit;

pub const X_REQUEST_ID: &str = "x-request-id";
/// Request header asking for the first answer without cross-checking.
pub const X_NO_CHECK: &str = "x-no-check";
/// Response header naming how a single call's answer was agreed.
pub const X_CONSENSUS: &str = "x-consensus";

/// Generates `x-request-id` values.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// A well-formed call and the id the client chose for it.
#[derive(Debug, Clone)]
pub struct IncomingCall {
    pub id: Value,
    pub init: RpcRequestInit,
}

/// A call that is valid JSON but not a valid JSON-RPC request.
#[derive(Debug, Clone)]
pub struct InvalidCall {
    pub id: Value,
    pub reason: String,
}

#[derive(Debug)]
pub enum IncomingBody {
    Single(Result<IncomingCall, InvalidCall>),
    Batch(Vec<Result<IncomingCall, InvalidCall>>),
}

/// Parses a request body. `Err` means the body is not JSON at all.
pub fn parse_body(body: &[u8]) -> Result<IncomingBody, String> {
    let value: Value = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    Ok(match value {
        Value::Array(calls) => IncomingBody::Batch(calls.into_iter().map(parse_call).collect()),
        call => IncomingBody::Single(parse_call(call)),
    })
}

fn parse_call(value: Value) -> Result<IncomingCall, InvalidCall> {
    let Value::Object(mut call) = value else {
        return Err(InvalidCall {
            id: Value::Null,
            reason: "request must be an object".into(),
        });
    };

    let id = call.remove("id").unwrap_or(Value::Null);
    let invalid = |reason: &str| InvalidCall {
        id: id.clone(),
        reason: reason.to_string(),
    };

    if let Some(version) = call.get("jsonrpc") {
        if version != "2.0" {
            return Err(invalid("jsonrpc must be \"2.0\""));
        }
    }
    if !matches!(id, Value::Null | Value::Number(_) | Value::String(_)) {
        return Err(invalid("id must be a string, number or null"));
    }

    let method = match call.remove("method") {
        Some(Value::String(method)) if !method.is_empty() => method,
        _ => return Err(invalid("method must be a non-empty string")),
    };
    let params = call.remove("params").unwrap_or(Value::Null);
    if !matches!(params, Value::Null | Value::Array(_) | Value::Object(_)) {
        return Err(invalid("params must be an array or object"));
    }

    Ok(IncomingCall {
        id,
        init: RpcRequestInit::new(method, params),
    })
}

/// Whether the client asked to skip cross-checking.
pub fn no_check_requested(headers: &HeaderMap) -> bool {
    headers
        .get(X_NO_CHECK)
        .and_then(|v| v.to_str().ok())
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// The request ID set by the middleware, for logs.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}
