//! Both protocols over TLS on the shared port, and the TLS policy.

use std::sync::Arc;
use std::time::Duration;

use password_service::rpc::{Call, Reply, RpcConnection};
use password_service::ShutdownOutcome;
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

mod common;

fn roots() -> RootCertStore {
    let pem = std::fs::read(common::fixture("ca.pem")).unwrap();
    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut pem.as_slice()) {
        roots.add(cert.unwrap()).unwrap();
    }
    roots
}

fn client_config() -> ClientConfig {
    ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots())
        .with_no_client_auth()
}

async fn connect(config: ClientConfig, addr: std::net::SocketAddr) -> std::io::Result<TlsStream<TcpStream>> {
    let tcp = TcpStream::connect(addr).await?;
    let name = ServerName::try_from("localhost").unwrap();
    TlsConnector::from(Arc::new(config)).connect(name, tcp).await
}

#[tokio::test]
async fn test_rpc_over_tls() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::with_tls(common::test_config(dir.path()));
    let running = common::start(config.clone(), common::argon2(&config)).await;

    let stream = connect(client_config(), running.local_addr()).await.unwrap();
    let mut conn = RpcConnection::handshake(stream, 65536).await.unwrap();
    assert!(matches!(conn.call(Call::Ping).await.unwrap(), Reply::Pong(_)));

    let hashed = common::expect_hashed(conn.call(common::hash_call("over tls")).await.unwrap());
    let verified = conn.call(common::verify_call("over tls", &hashed.hash)).await.unwrap();
    assert!(common::expect_verified(verified).valid);

    assert_eq!(running.shutdown().await, ShutdownOutcome::Clean);
}

#[tokio::test]
async fn test_http_over_tls() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::with_tls(common::test_config(dir.path()));
    let running = common::start(config.clone(), common::argon2(&config)).await;

    let mut stream = connect(client_config(), running.local_addr()).await.unwrap();
    stream
        .write_all(b"GET /v1/ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = Vec::new();
    let _ = stream.read_to_end(&mut response).await;
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 200 OK"), "unexpected response: {text}");
    assert!(text.contains("\"timestamp\""));

    running.shutdown().await;
}

#[tokio::test]
async fn test_weak_cipher_suite_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::with_tls(common::test_config(dir.path()));
    let running = common::start(config.clone(), common::argon2(&config)).await;

    let provider = CryptoProvider {
        cipher_suites: vec![ring::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256],
        ..ring::default_provider()
    };
    let weak = ClientConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(&[&rustls::version::TLS12])
        .unwrap()
        .with_root_certificates(roots())
        .with_no_client_auth();

    assert!(connect(weak, running.local_addr()).await.is_err());
    running.shutdown().await;
}

#[tokio::test]
async fn test_plaintext_client_gets_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::with_tls(common::test_config(dir.path()));
    let running = common::start(config.clone(), common::argon2(&config)).await;

    let mut tcp = TcpStream::connect(running.local_addr()).await.unwrap();
    tcp.write_all(b"GET /healthz HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
    let mut buf = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(2), tcp.read_to_end(&mut buf)).await;
    let text = String::from_utf8_lossy(&buf);
    assert!(!text.contains("HTTP/1.1 200"), "plaintext request was served: {read:?}");

    running.shutdown().await;
}
