//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the password service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// External listener (bind address, TLS, connection limits).
    pub listener: ListenerConfig,

    /// Internal plaintext socket for same-host callers.
    pub internal: InternalConfig,

    /// Protocol classification settings.
    pub multiplexer: MultiplexerConfig,

    /// Binary RPC protocol settings.
    pub rpc: RpcConfig,

    /// HTTP/JSON gateway settings.
    pub http: HttpConfig,

    /// Graceful shutdown settings.
    pub shutdown: ShutdownConfig,

    /// Password hashing parameters.
    pub hashing: HashingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// External listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:5555").
    pub bind_address: String,

    /// TLS material. When absent the external port speaks plaintext.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Time allowed for a client to complete the TLS handshake.
    pub handshake_timeout_secs: u64,
}

impl ListenerConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5555".to_string(),
            tls: None,
            max_connections: 10_000,
            handshake_timeout_secs: 10,
        }
    }
}

/// TLS configuration for the external listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Internal socket configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InternalConfig {
    /// Enable the internal Unix socket.
    pub enabled: bool,

    /// Filesystem path of the socket.
    pub socket_path: PathBuf,
}

impl Default for InternalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            socket_path: PathBuf::from("service.sock"),
        }
    }
}

/// Protocol classifier configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MultiplexerConfig {
    /// How long a new connection may take to send enough bytes to be classified.
    pub detection_timeout_ms: u64,

    /// Upper bound on bytes buffered while classifying.
    pub max_peek_bytes: usize,

    /// Pending connections buffered per derived listener.
    pub queue_capacity: usize,
}

impl MultiplexerConfig {
    pub fn detection_timeout(&self) -> Duration {
        Duration::from_millis(self.detection_timeout_ms)
    }
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            detection_timeout_ms: 2_000,
            max_peek_bytes: 64,
            queue_capacity: 128,
        }
    }
}

/// Binary RPC protocol configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Largest accepted frame payload in bytes.
    pub max_frame_bytes: usize,

    /// Time allowed for a client to send the connection preface.
    pub preface_timeout_ms: u64,

    /// Idle connections kept by the internal socket client.
    pub client_pool_size: usize,

    /// Dial timeout for the internal socket client.
    pub dial_timeout_secs: u64,
}

impl RpcConfig {
    pub fn preface_timeout(&self) -> Duration {
        Duration::from_millis(self.preface_timeout_ms)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 64 * 1024,
            preface_timeout_ms: 5_000,
            client_pool_size: 8,
            dial_timeout_secs: 10,
        }
    }
}

/// How the HTTP gateway reaches the RPC service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayUpstream {
    /// Call the RPC dispatcher directly.
    InProcess,
    /// Issue RPC calls over the internal socket.
    InternalSocket,
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,

    /// Time allowed to receive request headers in seconds.
    pub header_read_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Transport used by the gateway to reach the RPC service.
    pub gateway_upstream: GatewayUpstream,
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn header_read_timeout(&self) -> Duration {
        Duration::from_secs(self.header_read_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            header_read_timeout_secs: 5,
            max_body_bytes: 64 * 1024,
            gateway_upstream: GatewayUpstream::InternalSocket,
        }
    }
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time in-flight work may take to finish once draining begins.
    pub drain_timeout_ms: u64,
}

impl ShutdownConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: 10_000,
        }
    }
}

/// Argon2id parameters for the default request handler.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HashingConfig {
    /// Memory cost in KiB.
    pub memory_kib: u32,

    /// Number of passes.
    pub iterations: u32,

    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Expose Prometheus metrics on `/metrics`.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: ServiceConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:5555");
        assert!(config.internal.enabled);
        assert_eq!(config.shutdown.drain_timeout(), Duration::from_secs(10));
        assert_eq!(config.http.gateway_upstream, GatewayUpstream::InternalSocket);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:7000"

            [listener.tls]
            cert_path = "certs/server.pem"
            key_path = "certs/server.key"

            [http]
            gateway_upstream = "in_process"

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:7000");
        assert_eq!(config.listener.max_connections, 10_000);
        assert_eq!(config.listener.tls.unwrap().key_path, "certs/server.key");
        assert_eq!(config.http.gateway_upstream, GatewayUpstream::InProcess);
        assert_eq!(config.http.request_timeout_secs, 30);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
