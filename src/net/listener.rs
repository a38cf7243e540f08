//! Listeners with backpressure.
//!
//! # Responsibilities
//! - Bind the external TCP address and the internal Unix socket
//! - Accept incoming connections, completing TLS handshakes off the accept path
//! - Enforce max_connections limit via semaphore
//! - Graceful handling of accept errors
//!
//! # Design Decisions
//! - `Listener` is the only capability servers and the multiplexer depend on
//! - Only `ListenerError::Closed` is terminal; accept errors are retried by callers
//! - Handshakes run concurrently so one slow client cannot stall the accept loop

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_rustls::TlsAcceptor;

use crate::config::ListenerConfig;
use crate::net::connection::{Connection, PeerAddr};

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("failed to bind: {0}")]
    Bind(#[source] std::io::Error),
    /// Failed to accept a connection. The listener is still usable.
    #[error("failed to accept: {0}")]
    Accept(#[source] std::io::Error),
    /// The listener will never yield another connection.
    #[error("listener closed: {0}")]
    Closed(String),
}

impl ListenerError {
    /// Whether the listener is permanently unusable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ListenerError::Closed(_))
    }
}

/// A source of inbound connections.
pub trait Listener: Send + 'static {
    /// Wait for the next connection.
    fn accept(&mut self) -> impl Future<Output = Result<Connection, ListenerError>> + Send;
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool.
/// This ensures backpressure is maintained even if the connection handler panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

/// The public TCP listener, optionally terminating TLS.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections wait in the kernel backlog until a slot becomes available.
pub struct ExternalListener {
    inner: TcpListener,
    tls: Option<TlsAcceptor>,
    connection_limit: Arc<Semaphore>,
    handshake_timeout: Duration,
    handshakes: FuturesUnordered<BoxFuture<'static, Option<Connection>>>,
}

enum Event {
    Handshaken(Option<Connection>),
    Accepted(std::io::Result<(TcpStream, SocketAddr)>, ConnectionPermit),
}

impl ExternalListener {
    /// Bind to the configured address with connection limits.
    pub async fn bind(
        config: &ListenerConfig,
        tls: Option<TlsAcceptor>,
    ) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
            ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            tls = tls.is_some(),
            max_connections = config.max_connections,
            "External listener bound"
        );

        Ok(Self {
            inner: listener,
            tls,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
            handshake_timeout: config.handshake_timeout(),
            handshakes: FuturesUnordered::new(),
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Get current available connection slots.
    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    async fn accept_with_permit(
        inner: &TcpListener,
        limit: &Arc<Semaphore>,
    ) -> Event {
        // The semaphore is never closed, so acquisition only waits.
        let permit = match Arc::clone(limit).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => std::future::pending().await,
        };
        let accepted = inner.accept().await;
        Event::Accepted(accepted, ConnectionPermit { _permit: permit })
    }

    fn start_handshake(
        &self,
        acceptor: TlsAcceptor,
        stream: TcpStream,
        addr: SocketAddr,
        permit: ConnectionPermit,
    ) {
        let timeout = self.handshake_timeout;
        self.handshakes.push(Box::pin(async move {
            match tokio::time::timeout(timeout, acceptor.accept(stream)).await {
                Ok(Ok(tls)) => {
                    Some(Connection::new(PeerAddr::Tcp(addr), tls).with_permit(permit))
                }
                Ok(Err(e)) => {
                    tracing::debug!(peer_addr = %addr, error = %e, "TLS handshake failed");
                    None
                }
                Err(_) => {
                    tracing::debug!(peer_addr = %addr, "TLS handshake timed out");
                    None
                }
            }
        }));
    }
}

impl Listener for ExternalListener {
    async fn accept(&mut self) -> Result<Connection, ListenerError> {
        loop {
            let event = tokio::select! {
                Some(done) = self.handshakes.next(), if !self.handshakes.is_empty() => {
                    Event::Handshaken(done)
                }
                event = Self::accept_with_permit(&self.inner, &self.connection_limit) => event,
            };

            match event {
                Event::Handshaken(Some(conn)) => return Ok(conn),
                Event::Handshaken(None) => continue,
                Event::Accepted(Err(e), _) => return Err(ListenerError::Accept(e)),
                Event::Accepted(Ok((stream, addr)), permit) => {
                    let _ = stream.set_nodelay(true);
                    tracing::debug!(
                        peer_addr = %addr,
                        available_permits = self.connection_limit.available_permits(),
                        "Connection accepted"
                    );

                    match self.tls.clone() {
                        Some(acceptor) => self.start_handshake(acceptor, stream, addr, permit),
                        None => {
                            return Ok(Connection::new(PeerAddr::Tcp(addr), stream).with_permit(permit))
                        }
                    }
                }
            }
        }
    }
}

#[cfg(unix)]
pub use self::unix::InternalListener;

#[cfg(unix)]
mod unix {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    use tokio::net::UnixListener;

    use super::{Listener, ListenerError};
    use crate::net::connection::{Connection, PeerAddr};

    /// The plaintext same-host listener on a Unix domain socket.
    ///
    /// The socket file is owner-only and is removed when the listener is dropped.
    pub struct InternalListener {
        inner: UnixListener,
        path: PathBuf,
    }

    impl InternalListener {
        /// Bind the socket, replacing a stale file left by a previous run.
        pub fn bind(path: &Path) -> Result<Self, ListenerError> {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!(path = %path.display(), "Removed stale socket file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ListenerError::Bind(e)),
            }

            let inner = UnixListener::bind(path).map_err(ListenerError::Bind)?;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(ListenerError::Bind)?;

            tracing::info!(path = %path.display(), "Internal listener bound");

            Ok(Self {
                inner,
                path: path.to_path_buf(),
            })
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl Listener for InternalListener {
        async fn accept(&mut self) -> Result<Connection, ListenerError> {
            let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;
            let peer = PeerAddr::Unix(addr.as_pathname().map(Path::to_path_buf));
            tracing::debug!(peer_addr = %peer, "Connection accepted");
            Ok(Connection::new(peer, stream))
        }
    }

    impl Drop for InternalListener {
        fn drop(&mut self) {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove socket file");
                }
            }
        }
    }
}
