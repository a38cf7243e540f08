//! Binary RPC subsystem.
//!
//! # Data Flow
//! ```text
//! DerivedListener / InternalListener
//!     → server.rs (preface, framing, one call at a time per connection)
//!     → interceptor.rs (span → metrics → panic recovery → completion log)
//!     → service.rs (validation, handler on the blocking pool)
//!     → hashing::RequestHandler
//!
//! HTTP gateway
//!     → client.rs (internal socket, pooled connections)  or  interceptor.rs directly
//! ```
//!
//! # Design Decisions
//! - Per-call failures travel in the reply, never as a dropped connection
//! - Panics are contained per call by the recovery interceptor
//! - On drain a connection finishes the call in progress, then closes

pub mod client;
pub mod interceptor;
pub mod protocol;
pub mod server;
pub mod service;

#[cfg(unix)]
pub use client::RpcClient;
pub use client::RpcConnection;
pub use interceptor::{CallContext, Dispatcher};
pub use protocol::{Call, Fault, FaultCode, PasswordReq, Reply};
pub use server::RpcServer;
pub use service::PasswordService;

use std::time::Duration;

/// Error type for RPC transport operations.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection did not start with the RPC preface")]
    BadPreface,

    #[error("no preface received within {0:?}")]
    PrefaceTimeout(Duration),

    #[error("failed to encode frame: {0}")]
    Encode(#[source] postcard::Error),

    #[error("failed to decode frame: {0}")]
    Decode(#[source] postcard::Error),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("response id {got} does not match request id {expected}")]
    IdMismatch { expected: u64, got: u64 },

    #[error("dial timed out after {0:?}")]
    DialTimeout(Duration),
}

impl RpcError {
    /// Whether the connection is unusable and a fresh one may succeed.
    pub fn is_disconnect(&self) -> bool {
        match self {
            RpcError::ConnectionClosed => true,
            RpcError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
