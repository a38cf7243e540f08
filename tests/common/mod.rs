//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use password_service::config::{HashingConfig, ServiceConfig, TlsConfig};
use password_service::hashing::{Argon2Hasher, HandlerError, RequestHandler};
use password_service::lifecycle::{Lifecycle, RunningService};
use password_service::observability::{BuildInfo, ServiceTelemetry};
use password_service::rpc::protocol::{HashRes, VerifyRes};
use password_service::rpc::{Call, PasswordReq, Reply, RpcConnection};
use tokio::net::TcpStream;

/// Argon2 parameters small enough for tests.
pub fn fast_hashing() -> HashingConfig {
    HashingConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    }
}

/// Plaintext service on an ephemeral port with its socket inside `dir`.
pub fn test_config(dir: &Path) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.internal.socket_path = dir.join("service.sock");
    config.multiplexer.detection_timeout_ms = 300;
    config.rpc.preface_timeout_ms = 1000;
    config.http.header_read_timeout_secs = 2;
    config.shutdown.drain_timeout_ms = 2000;
    config.hashing = fast_hashing();
    config.observability.metrics_enabled = false;
    config
}

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

pub fn with_tls(mut config: ServiceConfig) -> ServiceConfig {
    config.listener.tls = Some(TlsConfig {
        cert_path: fixture("server.pem").display().to_string(),
        key_path: fixture("server.key").display().to_string(),
    });
    config
}

pub fn argon2(config: &ServiceConfig) -> Arc<dyn RequestHandler> {
    Arc::new(Argon2Hasher::new(&config.hashing).unwrap())
}

pub async fn start(config: ServiceConfig, handler: Arc<dyn RequestHandler>) -> RunningService {
    let telemetry = Arc::new(ServiceTelemetry::new(BuildInfo::from_env(), None));
    Lifecycle::new(config, handler, telemetry).start().await.unwrap()
}

/// Open an RPC connection over plain TCP.
pub async fn rpc_connect(addr: SocketAddr) -> RpcConnection<TcpStream> {
    let stream = TcpStream::connect(addr).await.unwrap();
    RpcConnection::handshake(stream, 65536).await.unwrap()
}

pub fn http_url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}

pub fn hash_call(password: &str) -> Call {
    Call::Hash(PasswordReq {
        password: password.to_string(),
        hash: String::new(),
    })
}

pub fn verify_call(password: &str, hash: &str) -> Call {
    Call::Verify(PasswordReq {
        password: password.to_string(),
        hash: hash.to_string(),
    })
}

pub fn expect_hashed(reply: Reply) -> HashRes {
    match reply {
        Reply::Hashed(res) => res,
        other => panic!("expected a hash reply, got {other:?}"),
    }
}

pub fn expect_verified(reply: Reply) -> VerifyRes {
    match reply {
        Reply::Verified(res) => res,
        other => panic!("expected a verify reply, got {other:?}"),
    }
}

/// Handler whose `hash` blocks for a fixed time.
pub struct SlowHandler {
    pub delay: Duration,
}

impl RequestHandler for SlowHandler {
    fn hash(&self, password: &str) -> Result<String, HandlerError> {
        std::thread::sleep(self.delay);
        Ok(format!("slow:{password}"))
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, HandlerError> {
        Ok(hash == format!("slow:{password}"))
    }
}

/// Handler that panics when asked to hash "panic".
pub struct PanickingHandler;

impl RequestHandler for PanickingHandler {
    fn hash(&self, password: &str) -> Result<String, HandlerError> {
        if password == "panic" {
            panic!("handler blew up");
        }
        Ok(format!("ok:{password}"))
    }

    fn verify(&self, _password: &str, _hash: &str) -> Result<bool, HandlerError> {
        Ok(false)
    }
}
