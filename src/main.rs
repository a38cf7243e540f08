use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use password_service::config::{load_config, ServiceConfig};
use password_service::hashing::Argon2Hasher;
use password_service::lifecycle::{runtime, signals, Lifecycle};
use password_service::observability::{self, metrics, BuildInfo, ServiceTelemetry};
use password_service::ShutdownOutcome;

/// Remote password hasher: binary RPC and HTTP/JSON on one TLS port.
#[derive(Debug, Parser)]
#[command(name = "password-service", version)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(long)]
    bind: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load configuration from {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => ServiceConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    if let Err(e) = observability::init_logging(&config.observability) {
        eprintln!("failed to initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    let build = BuildInfo::from_env();
    tracing::info!(version = %build.version_full(), "password-service starting");

    let prometheus = if config.observability.metrics_enabled {
        match metrics::install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::error!(error = %e, "Failed to install metrics recorder");
                return ExitCode::FAILURE;
            }
        }
    } else {
        None
    };
    metrics::record_build_info(&build);

    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        internal_socket = config.internal.enabled,
        gateway_upstream = ?config.http.gateway_upstream,
        "Configuration loaded"
    );

    let hasher = match Argon2Hasher::new(&config.hashing) {
        Ok(hasher) => hasher,
        Err(e) => {
            tracing::error!(error = %e, "Invalid hashing parameters");
            return ExitCode::FAILURE;
        }
    };
    let telemetry = Arc::new(ServiceTelemetry::new(build, prometheus));

    let rt = match runtime::build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let outcome = rt.block_on(async move {
        match Lifecycle::new(config, Arc::new(hasher), telemetry).start().await {
            Ok(running) => Some(running.run_until(signals::termination()).await),
            Err(_) => None,
        }
    });

    match outcome {
        Some(outcome) => {
            runtime::release(rt, &outcome);
            ExitCode::from(&outcome)
        }
        None => {
            runtime::release(rt, &ShutdownOutcome::Failed("startup failed".into()));
            ExitCode::FAILURE
        }
    }
}
