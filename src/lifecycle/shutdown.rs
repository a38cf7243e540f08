//! Concurrent drain of the protocol servers.

use futures_util::future::join_all;
use tokio::time::Instant;

use crate::lifecycle::handle::{ServerHandle, StopOutcome};

/// Result of draining a set of servers against one deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub servers: Vec<(&'static str, StopOutcome)>,
}

impl DrainReport {
    /// True if any server had to force-close connections.
    pub fn forced(&self) -> bool {
        self.servers.iter().any(|(_, outcome)| outcome.is_forced())
    }

    /// Connections closed at the deadline, across all servers.
    pub fn abandoned(&self) -> u64 {
        self.servers
            .iter()
            .map(|(_, outcome)| match outcome {
                StopOutcome::Forced { abandoned } => *abandoned,
                StopOutcome::Graceful => 0,
            })
            .sum()
    }
}

/// Stop every server concurrently, all bounded by `deadline`.
pub async fn drain_servers(handles: &[&ServerHandle], deadline: Instant) -> DrainReport {
    let stops = handles.iter().map(|handle| async move {
        let outcome = handle.stop(deadline).await;
        (handle.name(), outcome)
    });
    DrainReport {
        servers: join_all(stops).await,
    }
}
