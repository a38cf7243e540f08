//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → telemetry.rs (/metrics scrape, /healthz, /.well-known/finger)
//! ```
//!
//! # Design Decisions
//! - `x-request-id` and the `rpc.call` span are attached to every log event of a request
//! - The library records through the `metrics` facade; only the binary installs a recorder

pub mod logging;
pub mod metrics;
pub mod telemetry;

pub use logging::init_logging;
pub use telemetry::{BuildInfo, ServiceTelemetry, Telemetry};
