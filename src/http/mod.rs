//! Local JSON-RPC gateway.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware: request ID, trace, timeout, body limit)
//!     → request.rs (parse single or batch JSON-RPC body, x-no-check)
//!     → consensus::fetch_or_fail per call
//!     → response.rs (JSON-RPC envelopes with the client's ids, x-consensus)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod status;

pub use request::{MakeRequestUuid, X_CONSENSUS, X_NO_CHECK, X_REQUEST_ID};
pub use server::{AppState, GatewayServer};
