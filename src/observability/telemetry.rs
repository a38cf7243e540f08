//! Health, metrics and service discovery endpoints.
//!
//! # Responsibilities
//! - `GET /healthz`: liveness with the current timestamp
//! - `GET /metrics`: Prometheus text exposition (404 when metrics are disabled)
//! - `GET /.well-known/finger`: service name, build information and endpoint urls
//!
//! # Design Decisions
//! - Build information and the Prometheus handle are injected, never read from globals
//! - The HTTP gateway merges `Telemetry::router()` into its own router

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::rpc::protocol::Timestamp;

/// Provides the telemetry routes served next to the JSON gateway.
pub trait Telemetry: Send + Sync + 'static {
    fn router(&self) -> Router;
}

/// Version details reported by `/.well-known/finger` and `password_svc_build_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub version: String,
    pub revision: String,
    pub branch: String,
    pub build_date: String,
}

impl BuildInfo {
    /// Version from Cargo; revision, branch and date from `BUILD_REVISION`,
    /// `BUILD_BRANCH` and `BUILD_DATE` at compile time when provided.
    pub fn from_env() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            revision: option_env!("BUILD_REVISION").unwrap_or("unknown").to_string(),
            branch: option_env!("BUILD_BRANCH").unwrap_or("unknown").to_string(),
            build_date: option_env!("BUILD_DATE").unwrap_or("unknown").to_string(),
        }
    }

    pub fn version_full(&self) -> String {
        format!("{} ({}-{})", self.version, self.revision, self.branch)
    }
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct Finger {
    #[serde(rename = "service-name")]
    pub service_name: &'static str,
    #[serde(rename = "service-description")]
    pub service_description: &'static str,
    pub version: String,
    #[serde(rename = "version-full")]
    pub version_full: String,
    pub revision: String,
    pub branch: String,
    pub build_date: String,
    pub healthz_url: &'static str,
    pub metric_url: &'static str,
    pub endpoints: [&'static str; 2],
}

/// Default telemetry endpoints.
#[derive(Clone)]
pub struct ServiceTelemetry {
    build: BuildInfo,
    prometheus: Option<PrometheusHandle>,
}

impl ServiceTelemetry {
    pub fn new(build: BuildInfo, prometheus: Option<PrometheusHandle>) -> Self {
        Self { build, prometheus }
    }

    pub fn build(&self) -> &BuildInfo {
        &self.build
    }
}

impl Telemetry for ServiceTelemetry {
    fn router(&self) -> Router {
        Router::new()
            .route("/healthz", get(healthz))
            .route("/metrics", get(metrics))
            .route("/.well-known/finger", get(finger))
            .with_state(self.clone())
    }
}

pub async fn healthz() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "OK",
        timestamp: Timestamp::now().seconds,
    })
}

pub async fn metrics(State(telemetry): State<ServiceTelemetry>) -> Response {
    match &telemetry.prometheus {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}

pub async fn finger(State(telemetry): State<ServiceTelemetry>) -> Json<Finger> {
    let build = &telemetry.build;
    Json(Finger {
        service_name: "Password",
        service_description: "Remote password hasher",
        version: build.version.clone(),
        version_full: build.version_full(),
        revision: build.revision.clone(),
        branch: build.branch.clone(),
        build_date: build.build_date.clone(),
        healthz_url: "/healthz",
        metric_url: "/metrics",
        endpoints: ["rpc", "http"],
    })
}
