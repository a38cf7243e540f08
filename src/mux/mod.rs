//! Protocol multiplexer.
//!
//! Splits one listener into several derived listeners by looking at the
//! first bytes each client sends.
//!
//! # Data Flow
//! ```text
//! source Listener
//!     → dispatch loop (accept, spawn one classification task per connection)
//!     → classification task (peek ≤ max_peek_bytes, rules in priority order,
//!                            bounded by the detection timeout)
//!     → Rewind(prefix, stream)
//!     → bounded queue of the matched DerivedListener
//!     → protocol server accept loop
//! ```
//!
//! # Design Decisions
//! - Classification is concurrent, so a silent client cannot delay others
//! - Each derived listener has its own queue; a stalled consumer only stalls its own deliveries
//! - `serve` consumes the multiplexer, so it can only be started once
//! - When the dispatch loop ends every derived listener reports `Closed` with the reason

pub mod listener;
pub mod matcher;
pub mod rewind;

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::MultiplexerConfig;
use crate::net::backoff::accept_backoff;
use crate::net::{Connection, Listener, ListenerError};
use crate::observability::metrics;

pub use listener::DerivedListener;
pub use matcher::{classify, AnyMatcher, MatchResult, Matcher, PrefaceMatcher, Rule};
pub use rewind::Rewind;

use listener::CloseSignal;

/// Runtime settings for a multiplexer.
#[derive(Debug, Clone)]
pub struct MuxConfig {
    pub detection_timeout: Duration,
    pub max_peek_bytes: usize,
    pub queue_capacity: usize,
}

impl From<&MultiplexerConfig> for MuxConfig {
    fn from(config: &MultiplexerConfig) -> Self {
        Self {
            detection_timeout: config.detection_timeout(),
            max_peek_bytes: config.max_peek_bytes,
            queue_capacity: config.queue_capacity,
        }
    }
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self::from(&MultiplexerConfig::default())
    }
}

/// Error type for multiplexer construction and serving.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    #[error("at least one classification rule is required")]
    NoRules,

    #[error("a catch-all rule is required")]
    MissingFallback,

    #[error("catch-all rule '{0}' must be the last rule")]
    FallbackNotLast(&'static str),

    #[error("rule '{rule}' needs {required} bytes but the peek bound is {bound}")]
    PeekBoundTooSmall {
        rule: &'static str,
        required: usize,
        bound: usize,
    },

    #[error("source listener failed: {0}")]
    Accept(#[source] ListenerError),
}

pub fn validate_rules(rules: &[Rule], max_peek_bytes: usize) -> Result<(), MuxError> {
    let last = rules.len().checked_sub(1).ok_or(MuxError::NoRules)?;

    for (index, rule) in rules.iter().enumerate() {
        let matcher = rule.matcher();
        if matcher.is_catch_all() && index != last {
            return Err(MuxError::FallbackNotLast(rule.name()));
        }
        if matcher.required_len() > max_peek_bytes {
            return Err(MuxError::PeekBoundTooSmall {
                rule: rule.name(),
                required: matcher.required_len(),
                bound: max_peek_bytes,
            });
        }
    }

    if !rules[last].matcher().is_catch_all() {
        return Err(MuxError::MissingFallback);
    }
    Ok(())
}

/// Classifies connections from one listener onto derived listeners.
pub struct Multiplexer<L> {
    listener: L,
    rules: Arc<[Rule]>,
    senders: Arc<[mpsc::Sender<Connection>]>,
    config: MuxConfig,
    closed: CloseSignal,
}

impl<L: Listener> Multiplexer<L> {
    /// Build a multiplexer and its derived listeners, one per rule in rule order.
    pub fn new(
        listener: L,
        rules: Vec<Rule>,
        config: MuxConfig,
    ) -> Result<(Self, Vec<DerivedListener>), MuxError> {
        validate_rules(&rules, config.max_peek_bytes)?;

        let closed = CloseSignal::default();
        let mut senders = Vec::with_capacity(rules.len());
        let mut derived = Vec::with_capacity(rules.len());
        for rule in &rules {
            let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
            senders.push(tx);
            derived.push(DerivedListener::new(rule.name(), rx, closed.clone()));
        }

        let mux = Self {
            listener,
            rules: rules.into(),
            senders: senders.into(),
            config,
            closed,
        };
        Ok((mux, derived))
    }

    /// Run the dispatch loop until `shutdown` fires or the source listener closes.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), MuxError> {
        let Multiplexer {
            mut listener,
            rules,
            senders,
            config,
            closed,
        } = self;

        tracing::info!(
            rules = ?rules.iter().map(Rule::name).collect::<Vec<_>>(),
            "Multiplexer serving"
        );

        let mut failures = 0u32;
        let result = loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break Ok(()),
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok(conn) => {
                    failures = 0;
                    tokio::spawn(classify_and_deliver(
                        conn,
                        Arc::clone(&rules),
                        Arc::clone(&senders),
                        config.clone(),
                        closed.clone(),
                    ));
                }
                Err(e) if e.is_terminal() => break Err(MuxError::Accept(e)),
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = accept_backoff(failures);
                    tracing::warn!(error = %e, ?delay, "Multiplexer accept failed");
                    tokio::time::sleep(delay).await;
                }
            }
        };

        match &result {
            Ok(()) => {
                tracing::info!("Multiplexer stopped");
                closed.close("multiplexer stopped");
            }
            Err(e) => {
                tracing::error!(error = %e, "Multiplexer terminated");
                closed.close(e.to_string());
            }
        }
        result
    }
}

/// Why classification gave up on a connection.
#[derive(Debug, Clone, Copy)]
enum Dropped {
    Eof,
    Io,
    Timeout,
}

impl Dropped {
    fn as_str(self) -> &'static str {
        match self {
            Dropped::Eof => "eof",
            Dropped::Io => "io_error",
            Dropped::Timeout => "timeout",
        }
    }
}

async fn classify_and_deliver(
    mut conn: Connection,
    rules: Arc<[Rule]>,
    senders: Arc<[mpsc::Sender<Connection>]>,
    config: MuxConfig,
    closed: CloseSignal,
) {
    let id = conn.id();
    let detection = tokio::time::timeout(
        config.detection_timeout,
        detect(&mut conn, &rules, config.max_peek_bytes),
    );
    let detected = tokio::select! {
        biased;
        _ = closed.closed() => return,
        detected = detection => detected.unwrap_or(Err(Dropped::Timeout)),
    };

    let (index, prefix) = match detected {
        Ok(found) => found,
        Err(reason) => {
            tracing::debug!(
                connection_id = %id,
                peer_addr = %conn.peer(),
                reason = reason.as_str(),
                "Connection dropped before classification"
            );
            metrics::record_mux_dropped(reason.as_str());
            return;
        }
    };

    let rule = rules[index].name();
    tracing::trace!(connection_id = %id, rule, peeked = prefix.len(), "Connection classified");
    metrics::record_mux_classified(rule);

    let conn = conn.rewind(prefix);
    tokio::select! {
        biased;
        _ = closed.closed() => {
            tracing::debug!(connection_id = %id, rule, "Multiplexer closed before delivery");
        }
        sent = senders[index].send(conn) => {
            if sent.is_err() {
                tracing::debug!(connection_id = %id, rule, "No consumer for classified connection");
                metrics::record_mux_dropped("no_consumer");
            }
        }
    }
}

/// Read until a rule decides, the peek bound is reached, or the stream ends.
async fn detect(
    conn: &mut Connection,
    rules: &[Rule],
    bound: usize,
) -> Result<(usize, Bytes), Dropped> {
    let mut buf = BytesMut::with_capacity(bound);
    loop {
        let exhausted = buf.len() >= bound;
        if let Some(index) = classify(rules, &buf, exhausted) {
            return Ok((index, buf.freeze()));
        }

        let start = buf.len();
        buf.resize(bound, 0);
        let read = conn.read(&mut buf[start..]).await;
        let n = match read {
            Ok(0) => return Err(Dropped::Eof),
            Ok(n) => n,
            Err(e) => {
                tracing::trace!(connection_id = %conn.id(), error = %e, "Read failed during classification");
                return Err(Dropped::Io);
            }
        };
        buf.truncate(start + n);
    }
}
