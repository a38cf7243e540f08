//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs, manager.rs):
//!     Bind listeners → Multiplexer → RPC server → HTTP gateway → Serving
//!
//! Shutdown (shutdown.rs, handle.rs):
//!     Stop signal or server failure → Stop accepting → Drain (deadline) → Kill rest → Stopped
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM/SIGQUIT → graceful shutdown
//!
//! Exit (runtime.rs):
//!     Forced stop → runtime released without joining abandoned handler work
//! ```
//!
//! # Design Decisions
//! - Ordered startup: listeners first, then servers, gateway last
//! - RPC and HTTP drain concurrently against one deadline
//! - Shutdown has timeout: connections still open at the deadline are closed

pub mod handle;
pub mod manager;
pub mod runtime;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use handle::{ServerHandle, ServerState, StopOutcome};
pub use manager::{Lifecycle, LifecycleError, RunningService};
pub use shutdown::{drain_servers, DrainReport};
pub use startup::{protocol_rules, ListenerSet};
pub use state::{LifecycleState, ShutdownOutcome};
