//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection limits)
//!     → tls.rs (TLS handshake with the restricted policy)
//!     → connection.rs (id, peer, boxed stream)
//!     → multiplexer / protocol server accept loop (serve.rs)
//!
//! Incoming Unix socket connection
//!     → listener.rs (plaintext, same host only)
//!     → RPC server accept loop (serve.rs)
//! ```
//!
//! # Design Decisions
//! - Accept errors back off and retry; only a closed listener ends an accept loop
//! - Each connection tracked for graceful shutdown
//! - TLS is optional and handled transparently

pub mod backoff;
pub mod connection;
pub mod listener;
pub mod serve;
pub mod tls;

pub use connection::{
    AsyncStream, BoxedIo, Connection, ConnectionGuard, ConnectionId, ConnectionTracker, PeerAddr,
};
#[cfg(unix)]
pub use listener::InternalListener;
pub use listener::{ConnectionPermit, ExternalListener, Listener, ListenerError};
pub use serve::{serve_connections, ServeError};
