//! TLS configuration and certificate loading.
//!
//! The external listener only negotiates TLS 1.2 or newer with ECDHE key
//! exchange over P-384 or X25519 and AEAD ciphers with 256-bit strength
//! (plus ChaCha20-Poly1305). The server's cipher order wins.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

/// Error type for TLS setup.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("certificate file not found: {0}")]
    CertNotFound(String),

    #[error("private key file not found: {0}")]
    KeyNotFound(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(String),

    #[error("no private key found in {0}")]
    NoPrivateKey(String),

    #[error("invalid TLS configuration: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Cipher suites and key exchange groups accepted on the external listener.
pub fn restricted_provider() -> CryptoProvider {
    let base = ring::default_provider();
    CryptoProvider {
        cipher_suites: vec![
            ring::cipher_suite::TLS13_AES_256_GCM_SHA384,
            ring::cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
            ring::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
            ring::cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
            ring::cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
            ring::cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
        ],
        kx_groups: vec![ring::kx_group::SECP384R1, ring::kx_group::X25519],
        ..base
    }
}

/// Load TLS configuration from certificate and key files.
pub fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>, TlsError> {
    // Basic validation
    if !cert_path.exists() {
        return Err(TlsError::CertNotFound(cert_path.display().to_string()));
    }
    if !key_path.exists() {
        return Err(TlsError::KeyNotFound(key_path.display().to_string()));
    }

    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let mut config = ServerConfig::builder_with_provider(Arc::new(restricted_provider()))
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.ignore_client_order = true;

    tracing::info!(
        cert = %cert_path.display(),
        key = %key_path.display(),
        "TLS configuration loaded"
    );

    Ok(Arc::new(config))
}

/// Build an acceptor for the external listener.
pub fn acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, TlsError> {
    load_tls_config(cert_path, key_path).map(TlsAcceptor::from)
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path).map(BufReader::new).map_err(|source| TlsError::Read {
        path: path.display().to_string(),
        source,
    })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read {
            path: path.display().to_string(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.display().to_string()));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Read {
            path: path.display().to_string(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    #[test]
    fn test_loads_fixture_pair() {
        let config = load_tls_config(&fixture("server.pem"), &fixture("server.key")).unwrap();
        assert!(config.ignore_client_order);
    }

    #[test]
    fn test_missing_files_are_reported() {
        let err = load_tls_config(Path::new("/nonexistent.pem"), &fixture("server.key")).unwrap_err();
        assert!(matches!(err, TlsError::CertNotFound(_)));

        let err = load_tls_config(&fixture("server.pem"), Path::new("/nonexistent.key")).unwrap_err();
        assert!(matches!(err, TlsError::KeyNotFound(_)));
    }

    #[test]
    fn test_key_file_without_certificates() {
        let err = load_tls_config(&fixture("server.key"), &fixture("server.key")).unwrap_err();
        assert!(matches!(err, TlsError::NoCertificates(_)));
    }

    #[test]
    fn test_provider_excludes_weak_suites() {
        let provider = restricted_provider();
        assert_eq!(provider.cipher_suites.len(), 6);
        assert!(!provider
            .cipher_suites
            .contains(&ring::cipher_suite::TLS13_AES_128_GCM_SHA256));
        assert_eq!(provider.kx_groups.len(), 2);
    }
}
