//! HTTP/JSON gateway subsystem.
//!
//! # Data Flow
//! ```text
//! Connection (derived "http" listener)
//!     → hyper HTTP/1.1 → tower-http middleware → axum Router
//!         → gateway routes → Upstream (in process | internal socket) → RPC interceptors
//!         → telemetry routes (/healthz, /metrics, /.well-known/finger)
//! ```

pub mod gateway;
pub mod response;
pub mod server;

pub use gateway::{routes, Upstream};
pub use response::{error_response, fault_response, ErrorBody};
pub use server::HttpServer;
