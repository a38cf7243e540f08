//! Startup helpers: listener binding and protocol classification rules.
//!
//! # Design Decisions
//! - Fail fast: any bind or TLS error aborts startup
//! - Listeners bind before any server starts, so a port conflict leaves nothing running

use std::net::SocketAddr;
use std::path::Path;

use crate::config::ServiceConfig;
use crate::lifecycle::manager::LifecycleError;
use crate::mux::{AnyMatcher, PrefaceMatcher, Rule};
#[cfg(unix)]
use crate::net::InternalListener;
use crate::net::{tls, ExternalListener, ListenerError};
use crate::rpc::protocol::PREFACE;

/// Rule name of the binary RPC protocol.
pub const RPC_RULE: &str = "rpc";
/// Rule name of the HTTP gateway (catch-all).
pub const HTTP_RULE: &str = "http";

/// Classification rules for the external port, in priority order.
pub fn protocol_rules() -> Vec<Rule> {
    vec![
        Rule::new(RPC_RULE, PrefaceMatcher::new(PREFACE)),
        Rule::new(HTTP_RULE, AnyMatcher),
    ]
}

/// Every listener the service owns, bound and ready to accept.
pub struct ListenerSet {
    pub external: ExternalListener,
    pub local_addr: SocketAddr,
    #[cfg(unix)]
    pub internal: Option<InternalListener>,
}

impl ListenerSet {
    pub async fn bind(config: &ServiceConfig) -> Result<Self, LifecycleError> {
        let acceptor = match &config.listener.tls {
            Some(tls_config) => Some(tls::acceptor(
                Path::new(&tls_config.cert_path),
                Path::new(&tls_config.key_path),
            )?),
            None => {
                tracing::warn!("No TLS configured, external listener accepts plaintext");
                None
            }
        };

        let external = ExternalListener::bind(&config.listener, acceptor).await?;
        let local_addr = external.local_addr().map_err(ListenerError::Bind)?;

        #[cfg(unix)]
        let internal = if config.internal.enabled {
            Some(InternalListener::bind(&config.internal.socket_path)?)
        } else {
            None
        };

        Ok(Self {
            external,
            local_addr,
            #[cfg(unix)]
            internal,
        })
    }

    pub fn internal_socket(&self) -> Option<&Path> {
        #[cfg(unix)]
        {
            self.internal.as_ref().map(InternalListener::path)
        }
        #[cfg(not(unix))]
        {
            None
        }
    }
}
