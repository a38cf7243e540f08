//! Listeners fed by the multiplexer instead of a socket.

use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::net::{Connection, Listener, ListenerError};

/// Why the multiplexer stopped, shared with every derived listener.
#[derive(Debug, Clone, Default)]
pub(crate) struct CloseSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
}

impl CloseSignal {
    /// Record `reason` (first caller wins) and wake all derived listeners.
    pub(crate) fn close(&self, reason: impl Into<String>) {
        let _ = self.reason.set(reason.into());
        self.token.cancel();
    }

    pub(crate) async fn closed(&self) {
        self.token.cancelled().await
    }

    fn reason(&self) -> String {
        self.reason
            .get()
            .cloned()
            .unwrap_or_else(|| "multiplexer stopped".to_string())
    }
}

/// A logical listener yielding connections classified under one rule.
///
/// Has no socket of its own; the multiplexer is the only producer.
#[derive(Debug)]
pub struct DerivedListener {
    name: &'static str,
    rx: mpsc::Receiver<Connection>,
    closed: CloseSignal,
}

impl DerivedListener {
    pub(crate) fn new(
        name: &'static str,
        rx: mpsc::Receiver<Connection>,
        closed: CloseSignal,
    ) -> Self {
        Self { name, rx, closed }
    }

    /// Name of the rule feeding this listener.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Listener for DerivedListener {
    async fn accept(&mut self) -> Result<Connection, ListenerError> {
        tokio::select! {
            biased;
            _ = self.closed.closed() => Err(ListenerError::Closed(self.closed.reason())),
            next = self.rx.recv() => match next {
                Some(conn) => Ok(conn),
                None => Err(ListenerError::Closed(self.closed.reason())),
            },
        }
    }
}
