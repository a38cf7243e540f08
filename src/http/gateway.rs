//! JSON gateway for the RPC API.
//!
//! # Responsibilities
//! - Expose hash / verify / ping as JSON over HTTP
//! - Forward each request through the RPC interceptor chain, in process or over the internal socket
//! - Map faults and transport failures to HTTP status codes
//!
//! # Routes
//! - `POST /v1/password/hash`   `{"password"}`         → `{"hash", "error"}`
//! - `POST /v1/password/verify` `{"password", "hash"}` → `{"valid", "error"}`
//! - `GET  /v1/ping`                                   → `{"timestamp"}` (RFC 3339)

use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(unix)]
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::http::response::{error_response, fault_response};
use crate::net::PeerAddr;
#[cfg(unix)]
use crate::rpc::RpcClient;
use crate::rpc::protocol::{Call, PasswordReq, Reply};
use crate::rpc::{CallContext, Dispatcher, RpcError};

/// Sequence for calls the gateway dispatches in process.
static GATEWAY_CALL_ID: AtomicU64 = AtomicU64::new(1);

/// How the gateway reaches the RPC service.
#[derive(Clone)]
pub enum Upstream {
    /// Call the dispatcher directly.
    InProcess(Dispatcher),
    /// Issue RPC calls over the internal socket.
    #[cfg(unix)]
    Socket(Arc<RpcClient>),
}

impl Upstream {
    pub async fn call(&self, call: Call) -> Result<Reply, RpcError> {
        match self {
            Upstream::InProcess(dispatcher) => {
                let ctx = CallContext {
                    id: GATEWAY_CALL_ID.fetch_add(1, Ordering::Relaxed),
                    peer: PeerAddr::Gateway,
                };
                Ok(dispatcher.dispatch(&ctx, call).await)
            }
            #[cfg(unix)]
            Upstream::Socket(client) => client.call(call).await,
        }
    }
}

/// Gateway routes, with the upstream as router state.
pub fn routes(upstream: Upstream) -> Router {
    Router::new()
        .route("/v1/password/hash", post(hash))
        .route("/v1/password/verify", post(verify))
        .route("/v1/ping", get(ping))
        .with_state(upstream)
}

async fn hash(
    State(upstream): State<Upstream>,
    body: Result<Json<PasswordReq>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => return rejected(rejection),
    };
    match upstream.call(Call::Hash(req)).await {
        Ok(Reply::Hashed(res)) => Json(res).into_response(),
        other => failed(other),
    }
}

async fn verify(
    State(upstream): State<Upstream>,
    body: Result<Json<PasswordReq>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => return rejected(rejection),
    };
    match upstream.call(Call::Verify(req)).await {
        Ok(Reply::Verified(res)) => Json(res).into_response(),
        other => failed(other),
    }
}

#[derive(Debug, Serialize)]
struct PingBody {
    timestamp: String,
}

async fn ping(State(upstream): State<Upstream>) -> Response {
    match upstream.call(Call::Ping).await {
        Ok(Reply::Pong(res)) => Json(PingBody {
            timestamp: res.timestamp.to_rfc3339(),
        })
        .into_response(),
        other => failed(other),
    }
}

fn rejected(rejection: JsonRejection) -> Response {
    let status = match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::BAD_REQUEST,
    };
    error_response(status, "invalid_argument", rejection.body_text())
}

fn failed(result: Result<Reply, RpcError>) -> Response {
    match result {
        Ok(Reply::Fault(fault)) => fault_response(fault),
        Ok(other) => {
            tracing::error!(reply = ?other, "Upstream returned a reply of the wrong kind");
            error_response(StatusCode::BAD_GATEWAY, "internal", "unexpected upstream reply")
        }
        Err(e) => {
            tracing::warn!(error = %e, "RPC upstream unavailable");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "unavailable", "upstream unavailable")
        }
    }
}
