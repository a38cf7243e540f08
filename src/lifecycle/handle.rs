//! Stop control for a running protocol server.
//!
//! # Responsibilities
//! - Publish the server's state (NotStarted → Serving → Draining → Stopped)
//! - Own the accept / drain / kill cancellation tokens
//! - Bound the drain by a deadline and force-terminate what is left
//!
//! # Design Decisions
//! - Cloneable: the accept loop, connection tasks and the lifecycle manager share one handle
//! - Kill drops connection futures rather than aborting tasks, so guards run normally

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::net::ConnectionTracker;

/// Time allowed for killed connection tasks to unwind after the deadline.
const KILL_GRACE: Duration = Duration::from_millis(100);

/// Observable state of one protocol server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    NotStarted,
    Serving,
    Draining,
    Stopped,
}

/// How a server stop finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Every connection finished before the deadline.
    Graceful,
    /// The deadline passed; `abandoned` connections were force-closed.
    Forced { abandoned: u64 },
}

impl StopOutcome {
    pub fn is_forced(&self) -> bool {
        matches!(self, StopOutcome::Forced { .. })
    }
}

struct Inner {
    name: &'static str,
    state: watch::Sender<ServerState>,
    accepting: CancellationToken,
    drain: CancellationToken,
    kill: CancellationToken,
    tracker: ConnectionTracker,
}

/// Shared stop control for one protocol server.
#[derive(Clone)]
pub struct ServerHandle {
    inner: Arc<Inner>,
}

impl ServerHandle {
    pub fn new(name: &'static str) -> Self {
        let (state, _) = watch::channel(ServerState::NotStarted);
        Self {
            inner: Arc::new(Inner {
                name,
                state,
                accepting: CancellationToken::new(),
                drain: CancellationToken::new(),
                kill: CancellationToken::new(),
                tracker: ConnectionTracker::new(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn state(&self) -> ServerState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ServerState> {
        self.inner.state.subscribe()
    }

    /// Record that an accept loop is running. No-op once stopping has begun.
    pub fn mark_serving(&self) {
        self.inner.state.send_if_modified(|state| {
            if *state == ServerState::NotStarted {
                *state = ServerState::Serving;
                true
            } else {
                false
            }
        });
    }

    /// Fires when accept loops must stop taking new connections.
    pub fn accepting(&self) -> &CancellationToken {
        &self.inner.accepting
    }

    /// Fires when live connections should finish their current work and close.
    pub fn drain(&self) -> &CancellationToken {
        &self.inner.drain
    }

    /// Fires when live connections must be dropped immediately.
    pub fn kill(&self) -> &CancellationToken {
        &self.inner.kill
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.inner.tracker
    }

    /// Stop accepting, drain live connections until `deadline`, then force-close the rest.
    pub async fn stop(&self, deadline: Instant) -> StopOutcome {
        self.inner.state.send_replace(ServerState::Draining);
        self.inner.accepting.cancel();
        self.inner.drain.cancel();

        let tracker = &self.inner.tracker;
        tracing::debug!(
            server = self.inner.name,
            active_connections = tracker.active_count(),
            "Draining connections"
        );

        let outcome = match tokio::time::timeout_at(deadline, tracker.wait_idle()).await {
            Ok(()) => StopOutcome::Graceful,
            Err(_) => {
                let abandoned = tracker.active_count();
                tracing::warn!(
                    server = self.inner.name,
                    abandoned,
                    "Drain deadline reached, closing remaining connections"
                );
                self.inner.kill.cancel();
                let _ = tokio::time::timeout(KILL_GRACE, tracker.wait_idle()).await;
                StopOutcome::Forced { abandoned }
            }
        };

        self.inner.state.send_replace(ServerState::Stopped);
        tracing::info!(server = self.inner.name, ?outcome, "Server stopped");
        outcome
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("active", &self.inner.tracker.active_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ConnectionId;

    #[tokio::test]
    async fn test_stop_when_idle_is_graceful() {
        let handle = ServerHandle::new("test");
        handle.mark_serving();
        assert_eq!(handle.state(), ServerState::Serving);

        let outcome = handle.stop(Instant::now() + Duration::from_secs(1)).await;
        assert_eq!(outcome, StopOutcome::Graceful);
        assert_eq!(handle.state(), ServerState::Stopped);
        assert!(handle.accepting().is_cancelled());
        assert!(!handle.kill().is_cancelled());
    }

    #[tokio::test]
    async fn test_stop_waits_for_connections() {
        let handle = ServerHandle::new("test");
        let guard = handle.tracker().track(ConnectionId::new());

        let drain = handle.drain().clone();
        tokio::spawn(async move {
            drain.cancelled().await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(guard);
        });

        let outcome = handle.stop(Instant::now() + Duration::from_secs(2)).await;
        assert_eq!(outcome, StopOutcome::Graceful);
    }

    #[tokio::test]
    async fn test_deadline_forces_kill() {
        let handle = ServerHandle::new("test");
        let guard = handle.tracker().track(ConnectionId::new());

        let kill = handle.kill().clone();
        tokio::spawn(async move {
            kill.cancelled().await;
            drop(guard);
        });

        let outcome = handle.stop(Instant::now() + Duration::from_millis(50)).await;
        assert_eq!(outcome, StopOutcome::Forced { abandoned: 1 });
        assert!(handle.kill().is_cancelled());
        assert_eq!(handle.tracker().active_count(), 0);
    }

    #[test]
    fn test_mark_serving_after_stop_is_ignored() {
        let handle = ServerHandle::new("test");
        handle.inner.state.send_replace(ServerState::Stopped);
        handle.mark_serving();
        assert_eq!(handle.state(), ServerState::Stopped);
    }
}
