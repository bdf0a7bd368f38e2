//! HTTP server setup and handlers.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, timeout, body limit)
//! - Answer every JSON-RPC call through the consensus fetcher
//! - Serve pool status and liveness

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::future::join_all;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::consensus::{fetch_or_fail, Agreement, FetchOptions};
use crate::ethereum::EthereumContext;
use crate::http::request::{
    no_check_requested, parse_body, request_id, IncomingBody, IncomingCall, InvalidCall, MakeRequestUuid,
    X_CONSENSUS,
};
use crate::http::response::{self, INVALID_REQUEST, PARSE_ERROR};
use crate::http::status;
use crate::lifecycle::{shutdown, Services};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
}

/// The gateway's HTTP server.
pub struct GatewayServer {
    router: Router,
    config: Arc<GatewayConfig>,
}

impl GatewayServer {
    pub fn new(services: Services) -> Self {
        let config = Arc::clone(&services.config);
        let router = Self::build_router(&config, AppState { services });
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/", post(rpc_default))
            .route("/rpc/{chain}", post(rpc_chain))
            .route("/status", get(status_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.listener.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The router, for serving on a custom listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            chains = self.config.chains.len(),
            "Gateway listening"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

async fn rpc_default(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    match state.services.chains.default_chain() {
        Some(ctx) => handle_rpc(ctx, &headers, &body).await,
        None => (StatusCode::NOT_FOUND, "No chains configured").into_response(),
    }
}

async fn rpc_chain(
    State(state): State<AppState>,
    Path(chain): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match state.services.chains.get(&chain) {
        Some(ctx) => handle_rpc(ctx, &headers, &body).await,
        None => {
            tracing::warn!(chain = %chain, "Unknown chain requested");
            (StatusCode::NOT_FOUND, format!("Unknown chain '{chain}'")).into_response()
        }
    }
}

async fn handle_rpc(ctx: Arc<EthereumContext>, headers: &HeaderMap, body: &[u8]) -> Response {
    let request_id = request_id(headers);
    let no_check = no_check_requested(headers);

    match parse_body(body) {
        Err(reason) => {
            tracing::debug!(request_id = %request_id, error = %reason, "Unparseable request body");
            Json(response::failure(Value::Null, PARSE_ERROR, "parse error", Some(json!(reason)))).into_response()
        }
        Ok(IncomingBody::Single(call)) => {
            let (body, agreement) = answer(&ctx, request_id, call, no_check).await;
            let mut response = Json(body).into_response();
            if let Some(agreement) = agreement {
                response
                    .headers_mut()
                    .insert(X_CONSENSUS, HeaderValue::from_static(agreement.as_str()));
            }
            response
        }
        Ok(IncomingBody::Batch(calls)) => {
            if calls.is_empty() {
                return Json(response::failure(Value::Null, INVALID_REQUEST, "empty batch", None)).into_response();
            }
            tracing::debug!(request_id = %request_id, calls = calls.len(), "Batch request");
            let answers = join_all(
                calls
                    .into_iter()
                    .map(|call| answer(&ctx, request_id, call, no_check)),
            )
            .await;
            Json(Value::Array(answers.into_iter().map(|(body, _)| body).collect())).into_response()
        }
    }
}

async fn answer(
    ctx: &EthereumContext,
    request_id: &str,
    call: Result<IncomingCall, InvalidCall>,
    no_check: bool,
) -> (Value, Option<Agreement>) {
    let call = match call {
        Ok(call) => call,
        Err(invalid) => {
            let body = response::failure(invalid.id, INVALID_REQUEST, "invalid request", Some(json!(invalid.reason)));
            return (body, None);
        }
    };

    let options = FetchOptions {
        cancel: None,
        no_check,
    };
    match fetch_or_fail(ctx, &call.init, options).await {
        Ok(fetched) => {
            tracing::debug!(
                request_id = %request_id,
                chain = %ctx.name(),
                method = %call.init.method,
                agreement = %fetched.provenance.agreement,
                "Call answered"
            );
            (response::success(call.id, fetched.value), Some(fetched.provenance.agreement))
        }
        Err(err) => {
            tracing::warn!(
                request_id = %request_id,
                chain = %ctx.name(),
                method = %call.init.method,
                error = %err,
                "Call failed"
            );
            (response::from_error(call.id, &err), None)
        }
    }
}

async fn status_handler(State(state): State<AppState>) -> Json<status::StatusReport> {
    Json(status::snapshot(&state.services))
}

async fn health_handler() -> &'static str {
    "ok"
}
