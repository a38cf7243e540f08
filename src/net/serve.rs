//! Accept loop shared by the protocol servers.

use std::future::Future;

use crate::lifecycle::ServerHandle;
use crate::net::backoff::accept_backoff;
use crate::net::connection::Connection;
use crate::net::listener::{Listener, ListenerError};

/// Error returned by a protocol server's `serve`.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// The listener reported terminal closure while the server was still serving.
    #[error("listener closed: {0}")]
    ListenerClosed(String),
}

/// Accept connections from `listener` until the handle stops accepting.
///
/// Every connection runs on its own task, counted by the handle's tracker,
/// and is dropped if the handle's kill token fires first.
pub async fn serve_connections<L, F, Fut>(
    handle: &ServerHandle,
    mut listener: L,
    handler: F,
) -> Result<(), ServeError>
where
    L: Listener,
    F: Fn(Connection) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    if handle.accepting().is_cancelled() {
        return Ok(());
    }
    handle.mark_serving();

    let mut failures = 0u32;
    loop {
        let accepted = tokio::select! {
            biased;
            _ = handle.accepting().cancelled() => return Ok(()),
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok(conn) => {
                failures = 0;
                let guard = handle.tracker().track(conn.id());
                let kill = handle.kill().clone();
                let work = handler(conn);
                tokio::spawn(async move {
                    tokio::select! {
                        _ = kill.cancelled() => {
                            tracing::debug!(connection_id = %guard.id(), "Connection force-closed");
                        }
                        _ = work => {}
                    }
                    drop(guard);
                });
            }
            Err(ListenerError::Closed(reason)) => {
                tracing::warn!(server = handle.name(), %reason, "Listener closed");
                return Err(ServeError::ListenerClosed(reason));
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                let delay = accept_backoff(failures);
                tracing::warn!(server = handle.name(), error = %e, ?delay, "Accept failed");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
