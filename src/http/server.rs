//! HTTP server for the JSON gateway.
//!
//! # Responsibilities
//! - Build the axum `Router`: gateway routes, telemetry routes, middleware
//! - Serve HTTP/1.1 connections from any `Listener` with hyper
//! - Drain: finish in-flight requests, then close keep-alive connections
//!
//! # Middleware (outermost first)
//! 1. `x-request-id` set (UUID v4) and propagated to the response
//! 2. request trace span
//! 3. panic recovery (500, single request)
//! 4. body size limit
//! 5. request timeout

use std::any::Any;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use hyper::body::Incoming;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::HttpConfig;
use crate::http::gateway::{routes, Upstream};
use crate::http::response::error_response;
use crate::lifecycle::{ServerHandle, StopOutcome};
use crate::net::{serve_connections, Connection, Listener, PeerAddr, ServeError};
use crate::observability::Telemetry;
use crate::rpc::interceptor::panic_message;

/// HTTP/JSON gateway server.
#[derive(Clone)]
pub struct HttpServer {
    router: Router,
    handle: ServerHandle,
    header_read_timeout: Duration,
}

impl HttpServer {
    pub fn new(config: &HttpConfig, upstream: Upstream, telemetry: &dyn Telemetry) -> Self {
        Self {
            router: Self::build_router(config, upstream, telemetry),
            handle: ServerHandle::new("http"),
            header_read_timeout: config.header_read_timeout(),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &HttpConfig, upstream: Upstream, telemetry: &dyn Telemetry) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                let request_id = req
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                let peer = req
                    .extensions()
                    .get::<PeerAddr>()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                tracing::info_span!(
                    "http.request",
                    method = %req.method(),
                    path = %req.uri().path(),
                    request_id,
                    peer,
                )
            }))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
            .layer(TimeoutLayer::new(config.request_timeout()));

        routes(upstream).merge(telemetry.router()).layer(middleware)
    }

    pub fn handle(&self) -> &ServerHandle {
        &self.handle
    }

    /// The router with all layers, for serving outside a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve `listener` until stopped or until the listener closes.
    pub async fn serve<L: Listener>(&self, listener: L) -> Result<(), ServeError> {
        let router = self.router.clone();
        let drain = self.handle.drain().clone();
        let header_read_timeout = self.header_read_timeout;
        serve_connections(&self.handle, listener, move |conn| {
            serve_connection(conn, router.clone(), drain.clone(), header_read_timeout)
        })
        .await
    }

    /// Stop accepting, drain connections until `deadline`, then force-close the rest.
    pub async fn stop(&self, deadline: Instant) -> StopOutcome {
        self.handle.stop(deadline).await
    }
}

async fn serve_connection(
    conn: Connection,
    router: Router,
    drain: CancellationToken,
    header_read_timeout: Duration,
) {
    let peer = conn.peer().clone();
    let span = tracing::debug_span!("http.connection", connection_id = %conn.id(), peer = %peer);

    let service = hyper::service::service_fn(move |mut req: Request<Incoming>| {
        req.extensions_mut().insert(peer.clone());
        router.clone().oneshot(req)
    });

    async move {
        let mut builder = hyper::server::conn::http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .header_read_timeout(header_read_timeout);
        let connection = builder.serve_connection(TokioIo::new(conn), service);
        tokio::pin!(connection);

        let result = tokio::select! {
            result = connection.as_mut() => result,
            _ = drain.cancelled() => {
                connection.as_mut().graceful_shutdown();
                connection.await
            }
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, "HTTP connection ended with error");
        }
    }
    .instrument(span)
    .await
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!(panic = %panic_message(payload.as_ref()), "HTTP handler panicked");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", "internal error")
}
