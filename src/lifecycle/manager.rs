//! Lifecycle manager: starts the listeners and servers in order, serves
//! until told to stop, then drains against one deadline.
//!
//! # Startup order
//! 1. bind listeners (external TCP/TLS, internal Unix socket)
//! 2. multiplexer on the external listener
//! 3. RPC server on the "rpc" derived listener and the internal socket
//! 4. HTTP gateway on the "http" derived listener
//!
//! A failure at any step stops what already started and ends in `Failed`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{GatewayUpstream, ServiceConfig};
use crate::hashing::RequestHandler;
use crate::http::{HttpServer, Upstream};
use crate::lifecycle::handle::ServerHandle;
use crate::lifecycle::shutdown::drain_servers;
use crate::lifecycle::startup::{protocol_rules, ListenerSet};
use crate::lifecycle::state::{LifecycleState, ShutdownOutcome};
use crate::mux::{DerivedListener, Multiplexer, MuxConfig, MuxError};
use crate::net::tls::TlsError;
use crate::net::{ListenerError, ServeError};
use crate::observability::Telemetry;
use crate::rpc::{Dispatcher, PasswordService, RpcError, RpcServer};

/// Error that prevents the service from starting.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("multiplexer setup failed: {0}")]
    Mux(#[from] MuxError),

    #[error("gateway upstream requires the internal socket, which is disabled")]
    InternalSocketDisabled,

    #[error("gateway could not reach the internal socket: {0}")]
    Gateway(#[source] RpcError),
}

/// Builds and starts the service.
pub struct Lifecycle {
    config: ServiceConfig,
    handler: Arc<dyn RequestHandler>,
    telemetry: Arc<dyn Telemetry>,
    state: watch::Sender<LifecycleState>,
}

impl Lifecycle {
    pub fn new(
        config: ServiceConfig,
        handler: Arc<dyn RequestHandler>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        let (state, _) = watch::channel(LifecycleState::Idle);
        Self {
            config,
            handler,
            telemetry,
            state,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Bind every listener and start every server.
    pub async fn start(self) -> Result<RunningService, LifecycleError> {
        self.state.send_replace(LifecycleState::Starting);
        match self.start_inner().await {
            Ok(running) => {
                running.state.send_replace(LifecycleState::Serving);
                tracing::info!(
                    address = %running.local_addr,
                    internal_socket = ?running.internal_socket,
                    "Service started"
                );
                Ok(running)
            }
            Err((e, state)) => {
                state.send_replace(LifecycleState::Failed);
                tracing::error!(error = %e, "Service failed to start");
                Err(e)
            }
        }
    }

    async fn start_inner(
        self,
    ) -> Result<RunningService, (LifecycleError, watch::Sender<LifecycleState>)> {
        let Lifecycle {
            config,
            handler,
            telemetry,
            state,
        } = self;

        let listeners = match ListenerSet::bind(&config).await {
            Ok(listeners) => listeners,
            Err(e) => return Err((e, state)),
        };
        let local_addr = listeners.local_addr;
        let internal_socket = listeners.internal_socket().map(Path::to_path_buf);

        let mux_config = MuxConfig::from(&config.multiplexer);
        let (mux, derived) = match Multiplexer::new(listeners.external, protocol_rules(), mux_config)
        {
            Ok(built) => built,
            Err(e) => return Err((e.into(), state)),
        };
        let (rpc_listener, http_listener) = match split_derived(derived) {
            Ok(pair) => pair,
            Err(e) => return Err((e.into(), state)),
        };

        let (failures_tx, failures) = mpsc::channel(4);
        let mux_shutdown = CancellationToken::new();
        let mut tasks = Vec::new();

        let mux_failures = failures_tx.clone();
        let mux_token = mux_shutdown.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = mux.serve(mux_token).await {
                let _ = mux_failures.send(format!("multiplexer: {e}")).await;
            }
        }));

        let dispatcher = Dispatcher::new(PasswordService::new(handler));
        let rpc = RpcServer::new(dispatcher.clone(), &config.rpc);
        tasks.push(spawn_server(&failures_tx, {
            let rpc = rpc.clone();
            async move { rpc.serve(rpc_listener).await }
        }));
        #[cfg(unix)]
        if let Some(internal) = listeners.internal {
            tasks.push(spawn_server(&failures_tx, {
                let rpc = rpc.clone();
                async move { rpc.serve(internal).await }
            }));
        }

        let upstream = match config.http.gateway_upstream {
            GatewayUpstream::InProcess => Ok(Upstream::InProcess(dispatcher)),
            GatewayUpstream::InternalSocket => {
                connect_internal(internal_socket.as_deref(), &config).await
            }
        };
        let upstream = match upstream {
            Ok(upstream) => upstream,
            Err(e) => {
                let deadline = Instant::now() + config.shutdown.drain_timeout();
                rpc.stop(deadline).await;
                mux_shutdown.cancel();
                join_tasks(tasks).await;
                return Err((e, state));
            }
        };

        let http = HttpServer::new(&config.http, upstream, telemetry.as_ref());
        tasks.push(spawn_server(&failures_tx, {
            let http = http.clone();
            async move { http.serve(http_listener).await }
        }));

        Ok(RunningService {
            state,
            local_addr,
            internal_socket,
            drain_timeout: config.shutdown.drain_timeout(),
            rpc,
            http,
            mux_shutdown,
            tasks,
            failures,
        })
    }
}

/// A started service.
pub struct RunningService {
    state: watch::Sender<LifecycleState>,
    local_addr: SocketAddr,
    internal_socket: Option<PathBuf>,
    drain_timeout: Duration,
    rpc: RpcServer,
    http: HttpServer,
    mux_shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    failures: mpsc::Receiver<String>,
}

impl RunningService {
    /// Address of the external listener.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn internal_socket(&self) -> Option<&Path> {
        self.internal_socket.as_deref()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn rpc_handle(&self) -> &ServerHandle {
        self.rpc.handle()
    }

    pub fn http_handle(&self) -> &ServerHandle {
        self.http.handle()
    }

    /// Serve until `stop` resolves or a server fails, then shut down.
    pub async fn run_until<F>(mut self, stop: F) -> ShutdownOutcome
    where
        F: std::future::Future,
    {
        let failure = tokio::select! {
            _ = stop => None,
            failure = self.failures.recv() => {
                Some(failure.unwrap_or_else(|| "all servers exited".to_string()))
            }
        };
        self.stop(failure).await
    }

    /// Drain and stop now.
    pub async fn shutdown(self) -> ShutdownOutcome {
        self.stop(None).await
    }

    async fn stop(self, failure: Option<String>) -> ShutdownOutcome {
        self.state.send_replace(LifecycleState::Draining);
        match &failure {
            Some(reason) => tracing::error!(%reason, "Server failure, shutting down"),
            None => tracing::info!(drain_timeout = ?self.drain_timeout, "Shutting down"),
        }

        let deadline = Instant::now() + self.drain_timeout;
        let report = drain_servers(&[self.rpc.handle(), self.http.handle()], deadline).await;
        if report.forced() {
            tracing::warn!(
                abandoned = report.abandoned(),
                "time limit reached, initiating hard shutdown"
            );
        }

        self.mux_shutdown.cancel();
        join_tasks(self.tasks).await;

        let (state, outcome) = match failure {
            Some(reason) => (LifecycleState::Failed, ShutdownOutcome::Failed(reason)),
            None if report.forced() => (LifecycleState::Stopped, ShutdownOutcome::Forced),
            None => (LifecycleState::Stopped, ShutdownOutcome::Clean),
        };
        self.state.send_replace(state);
        tracing::info!(?outcome, "Shutdown complete");
        outcome
    }
}

impl std::fmt::Debug for RunningService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningService")
            .field("state", &self.state())
            .field("local_addr", &self.local_addr)
            .field("internal_socket", &self.internal_socket)
            .finish()
    }
}

/// The derived listeners come back in rule order: rpc, then http.
fn split_derived(
    derived: Vec<DerivedListener>,
) -> Result<(DerivedListener, DerivedListener), MuxError> {
    let mut derived = derived.into_iter();
    match (derived.next(), derived.next()) {
        (Some(rpc), Some(http)) => Ok((rpc, http)),
        _ => Err(MuxError::NoRules),
    }
}

fn spawn_server<F>(failures: &mpsc::Sender<String>, serve: F) -> JoinHandle<()>
where
    F: std::future::Future<Output = Result<(), ServeError>> + Send + 'static,
{
    let failures = failures.clone();
    tokio::spawn(async move {
        if let Err(e) = serve.await {
            let _ = failures.send(e.to_string()).await;
        }
    })
}

async fn join_tasks(tasks: Vec<JoinHandle<()>>) {
    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Server task ended abnormally");
        }
    }
}

#[cfg(unix)]
async fn connect_internal(
    socket: Option<&Path>,
    config: &ServiceConfig,
) -> Result<Upstream, LifecycleError> {
    let path = socket.ok_or(LifecycleError::InternalSocketDisabled)?;
    let client = crate::rpc::RpcClient::connect(path, &config.rpc)
        .await
        .map_err(LifecycleError::Gateway)?;
    Ok(Upstream::Socket(Arc::new(client)))
}

#[cfg(not(unix))]
async fn connect_internal(
    _socket: Option<&Path>,
    _config: &ServiceConfig,
) -> Result<Upstream, LifecycleError> {
    Err(LifecycleError::InternalSocketDisabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::HandlerError;
    use crate::observability::{BuildInfo, ServiceTelemetry};

    struct PlainHandler;

    impl RequestHandler for PlainHandler {
        fn hash(&self, password: &str) -> Result<String, HandlerError> {
            Ok(format!("plain:{password}"))
        }

        fn verify(&self, password: &str, hash: &str) -> Result<bool, HandlerError> {
            Ok(hash == format!("plain:{password}"))
        }
    }

    fn lifecycle(config: ServiceConfig) -> Lifecycle {
        let telemetry = Arc::new(ServiceTelemetry::new(BuildInfo::from_env(), None));
        Lifecycle::new(config, Arc::new(PlainHandler), telemetry)
    }

    fn config(dir: &Path) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.listener.bind_address = "127.0.0.1:0".into();
        config.internal.socket_path = dir.join("svc.sock");
        config.shutdown.drain_timeout_ms = 500;
        config
    }

    #[tokio::test]
    async fn test_start_and_clean_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let lifecycle = lifecycle(config(dir.path()));
        let mut states = lifecycle.watch_state();
        assert_eq!(lifecycle.state(), LifecycleState::Idle);

        let running = lifecycle.start().await.unwrap();
        assert_eq!(running.state(), LifecycleState::Serving);
        assert!(states.has_changed().unwrap());
        assert!(running.internal_socket().unwrap().exists());

        let outcome = running.shutdown().await;
        assert_eq!(outcome, ShutdownOutcome::Clean);
        assert_eq!(*states.borrow_and_update(), LifecycleState::Stopped);
        assert!(!dir.path().join("svc.sock").exists());
    }

    #[tokio::test]
    async fn test_in_process_gateway_without_socket() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.internal.enabled = false;
        config.http.gateway_upstream = GatewayUpstream::InProcess;

        let running = lifecycle(config).start().await.unwrap();
        assert!(running.internal_socket().is_none());
        assert_eq!(running.shutdown().await, ShutdownOutcome::Clean);
    }

    #[tokio::test]
    async fn test_socket_upstream_without_socket_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.internal.enabled = false;

        let lifecycle = lifecycle(config);
        let states = lifecycle.watch_state();
        let err = lifecycle.start().await.unwrap_err();
        assert!(matches!(err, LifecycleError::InternalSocketDisabled));
        assert_eq!(*states.borrow(), LifecycleState::Failed);
    }

    #[tokio::test]
    async fn test_run_until_stop_future() {
        let dir = tempfile::tempdir().unwrap();
        let running = lifecycle(config(dir.path())).start().await.unwrap();
        let outcome = running
            .run_until(tokio::time::sleep(Duration::from_millis(20)))
            .await;
        assert_eq!(outcome, ShutdownOutcome::Clean);
    }
}
