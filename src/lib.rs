//! Password hashing service.
//!
//! One API (hash / verify / ping) served over two protocols on a single
//! TLS port, plus a plaintext Unix socket for same-host callers.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────────┐
//!                 │                    PASSWORD SERVICE                      │
//!                 │                                                          │
//!  TCP / TLS      │  ┌──────────┐    ┌──────────┐   "rpc"   ┌────────────┐   │
//!  ───────────────┼─▶│   net    │───▶│   mux    │──────────▶│ rpc server │   │
//!                 │  │ listener │    │ classify │           └─────┬──────┘   │
//!                 │  └──────────┘    └────┬─────┘                 │          │
//!                 │                       │ "http"                ▼          │
//!                 │                       ▼              ┌────────────────┐  │
//!                 │                ┌─────────────┐       │  interceptors  │  │
//!                 │                │ http gateway│──────▶│  → service     │  │
//!                 │                └─────────────┘       │  → hashing     │  │
//!  Unix socket    │  ┌──────────┐                        └────────────────┘  │
//!  ───────────────┼─▶│ internal │──────────────────────────────▲             │
//!                 │  └──────────┘                                            │
//!                 │   config · observability · lifecycle (start / drain)     │
//!                 └──────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod hashing;
pub mod http;
pub mod lifecycle;
pub mod mux;
pub mod net;
pub mod observability;
pub mod rpc;

pub use config::ServiceConfig;
pub use lifecycle::{Lifecycle, RunningService, ShutdownOutcome};
