//! Ownership of the Tokio runtime the binary serves on.
//!
//! Handler work runs on the blocking pool. Dropping a runtime waits for every
//! blocking task, so a call abandoned by a forced stop would otherwise hold the
//! process open until the handler returned.

use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use crate::lifecycle::state::ShutdownOutcome;

/// How long a clean exit waits for stray blocking work.
pub const CLEAN_EXIT_GRACE: Duration = Duration::from_secs(1);

/// Multi-thread runtime with I/O and timers enabled.
pub fn build() -> std::io::Result<Runtime> {
    Builder::new_multi_thread()
        .enable_all()
        .thread_name("password-svc-worker")
        .build()
}

/// Tear the runtime down according to how the service stopped.
///
/// After a forced or failed stop the runtime is released immediately; any
/// handler still running on the blocking pool is left behind.
pub fn release(runtime: Runtime, outcome: &ShutdownOutcome) {
    match outcome {
        ShutdownOutcome::Clean => runtime.shutdown_timeout(CLEAN_EXIT_GRACE),
        ShutdownOutcome::Forced | ShutdownOutcome::Failed(_) => {
            tracing::warn!(?outcome, "Releasing runtime without waiting for abandoned calls");
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn runtime_with_stuck_blocking_task() -> Runtime {
        let runtime = build().unwrap();
        runtime.spawn_blocking(|| std::thread::sleep(Duration::from_secs(5)));
        runtime
    }

    #[test]
    fn test_forced_release_does_not_wait_for_blocking_work() {
        let runtime = runtime_with_stuck_blocking_task();
        let started = Instant::now();
        release(runtime, &ShutdownOutcome::Forced);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_clean_release_is_bounded() {
        let runtime = runtime_with_stuck_blocking_task();
        let started = Instant::now();
        release(runtime, &ShutdownOutcome::Clean);
        let elapsed = started.elapsed();
        assert!(elapsed >= CLEAN_EXIT_GRACE - Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(3));
    }
}
