//! OS signal handling.
//!
//! SIGINT, SIGTERM and SIGQUIT all request a graceful shutdown. If no
//! Unix handler can be registered, Ctrl+C is used instead.

/// Resolve when the process is asked to terminate. Returns the signal name.
#[cfg(unix)]
pub async fn termination() -> &'static str {
    use futures_util::future::select_all;
    use tokio::signal::unix::{signal, SignalKind};

    let kinds = [
        ("SIGINT", SignalKind::interrupt()),
        ("SIGTERM", SignalKind::terminate()),
        ("SIGQUIT", SignalKind::quit()),
    ];

    let mut streams = Vec::with_capacity(kinds.len());
    for (name, kind) in kinds {
        match signal(kind) {
            Ok(stream) => streams.push((name, stream)),
            Err(e) => tracing::warn!(signal = name, error = %e, "Failed to install signal handler"),
        }
    }
    if streams.is_empty() {
        return ctrl_c().await;
    }

    let waits = streams.iter_mut().map(|(name, stream)| {
        Box::pin(async move {
            stream.recv().await;
            *name
        })
    });
    let (name, _, _) = select_all(waits).await;
    tracing::info!(signal = name, "Shutdown signal received");
    name
}

#[cfg(not(unix))]
pub async fn termination() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!(signal = "SIGINT", "Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
    "SIGINT"
}
