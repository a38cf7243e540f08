//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0, addresses parse)
//! - Check cross-section consistency (gateway upstream needs the internal socket)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::{GatewayUpstream, ServiceConfig};
use crate::rpc::protocol::PREFACE;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration, collecting every error found.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }
    if config.listener.handshake_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.handshake_timeout_secs", "must be greater than 0"));
    }
    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.trim().is_empty() {
            errors.push(ValidationError::new("listener.tls.cert_path", "must not be empty"));
        }
        if tls.key_path.trim().is_empty() {
            errors.push(ValidationError::new("listener.tls.key_path", "must not be empty"));
        }
    }

    if config.internal.enabled && config.internal.socket_path.as_os_str().is_empty() {
        errors.push(ValidationError::new("internal.socket_path", "must not be empty"));
    }

    if config.multiplexer.detection_timeout_ms == 0 {
        errors.push(ValidationError::new("multiplexer.detection_timeout_ms", "must be greater than 0"));
    }
    if config.multiplexer.max_peek_bytes < PREFACE.len() {
        errors.push(ValidationError::new(
            "multiplexer.max_peek_bytes",
            format!("must be at least {} bytes to recognise the RPC preface", PREFACE.len()),
        ));
    }
    if config.multiplexer.queue_capacity == 0 {
        errors.push(ValidationError::new("multiplexer.queue_capacity", "must be greater than 0"));
    }

    if config.rpc.max_frame_bytes == 0 {
        errors.push(ValidationError::new("rpc.max_frame_bytes", "must be greater than 0"));
    }
    if config.rpc.preface_timeout_ms == 0 {
        errors.push(ValidationError::new("rpc.preface_timeout_ms", "must be greater than 0"));
    }
    if config.rpc.dial_timeout_secs == 0 {
        errors.push(ValidationError::new("rpc.dial_timeout_secs", "must be greater than 0"));
    }

    if config.http.request_timeout_secs == 0 {
        errors.push(ValidationError::new("http.request_timeout_secs", "must be greater than 0"));
    }
    if config.http.header_read_timeout_secs == 0 {
        errors.push(ValidationError::new("http.header_read_timeout_secs", "must be greater than 0"));
    }
    if config.http.max_body_bytes == 0 {
        errors.push(ValidationError::new("http.max_body_bytes", "must be greater than 0"));
    }
    if config.http.gateway_upstream == GatewayUpstream::InternalSocket {
        if !config.internal.enabled {
            errors.push(ValidationError::new(
                "http.gateway_upstream",
                "internal_socket requires internal.enabled = true",
            ));
        } else if !cfg!(unix) {
            errors.push(ValidationError::new(
                "http.gateway_upstream",
                "internal_socket is only available on unix platforms",
            ));
        }
    }

    if config.shutdown.drain_timeout_ms == 0 {
        errors.push(ValidationError::new("shutdown.drain_timeout_ms", "must be greater than 0"));
    }

    let hashing = &config.hashing;
    if hashing.iterations == 0 {
        errors.push(ValidationError::new("hashing.iterations", "must be greater than 0"));
    }
    if hashing.parallelism == 0 {
        errors.push(ValidationError::new("hashing.parallelism", "must be greater than 0"));
    }
    if hashing.memory_kib < 8 * hashing.parallelism.max(1) {
        errors.push(ValidationError::new(
            "hashing.memory_kib",
            "must be at least 8 KiB per lane of parallelism",
        ));
    }

    if tracing_subscriber::EnvFilter::try_new(&config.observability.log_level).is_err() {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("'{}' is not a valid filter directive", config.observability.log_level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
