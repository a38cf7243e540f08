//! RPC protocol server.
//!
//! # Responsibilities
//! - Accept connections from any `Listener` (derived or internal socket)
//! - Check the connection preface, then answer framed calls in order
//! - On drain, finish the call in progress and close the connection

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tracing::Instrument;

use crate::config::RpcConfig;
use crate::lifecycle::{ServerHandle, StopOutcome};
use crate::net::{serve_connections, Connection, Listener, ServeError};
use crate::rpc::interceptor::{CallContext, Dispatcher};
use crate::rpc::protocol::{codec, decode, encode, Fault, Reply, RequestFrame, ResponseFrame, PREFACE};
use crate::rpc::RpcError;

/// Serves the binary RPC protocol.
#[derive(Clone)]
pub struct RpcServer {
    dispatcher: Dispatcher,
    handle: ServerHandle,
    max_frame_bytes: usize,
    preface_timeout: Duration,
}

impl RpcServer {
    pub fn new(dispatcher: Dispatcher, config: &RpcConfig) -> Self {
        Self {
            dispatcher,
            handle: ServerHandle::new("rpc"),
            max_frame_bytes: config.max_frame_bytes,
            preface_timeout: config.preface_timeout(),
        }
    }

    pub fn handle(&self) -> &ServerHandle {
        &self.handle
    }

    /// Serve `listener` until stopped or until the listener closes.
    ///
    /// May be called for several listeners at once; they share one handle.
    pub async fn serve<L: Listener>(&self, listener: L) -> Result<(), ServeError> {
        let server = self.clone();
        serve_connections(&self.handle, listener, move |conn| {
            let server = server.clone();
            async move { server.serve_connection(conn).await }
        })
        .await
    }

    /// Stop accepting, drain connections until `deadline`, then force-close the rest.
    pub async fn stop(&self, deadline: Instant) -> StopOutcome {
        self.handle.stop(deadline).await
    }

    async fn serve_connection(self, mut conn: Connection) {
        let peer = conn.peer().clone();
        let span = tracing::debug_span!("rpc.connection", connection_id = %conn.id(), peer = %peer);

        async move {
            if let Err(e) = self.read_preface(&mut conn).await {
                tracing::debug!(error = %e, "Rejected RPC connection");
                return;
            }

            let mut framed = Framed::new(conn, codec(self.max_frame_bytes));
            let drain = self.handle.drain().clone();

            loop {
                let next = tokio::select! {
                    biased;
                    _ = drain.cancelled() => break,
                    next = framed.next() => next,
                };

                let response = match next {
                    None => break,
                    Some(Ok(frame)) => match decode::<RequestFrame>(&frame) {
                        Ok(RequestFrame { id, call }) => {
                            let ctx = CallContext {
                                id,
                                peer: peer.clone(),
                            };
                            let reply = self.dispatcher.dispatch(&ctx, call).await;
                            ResponseFrame { id, reply }
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "Undecodable RPC frame");
                            ResponseFrame {
                                id: 0,
                                reply: Reply::Fault(Fault::invalid_argument(e.to_string())),
                            }
                        }
                    },
                    Some(Err(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
                        // Oversized frame: the stream can't be resynchronised.
                        tracing::debug!(error = %e, "Invalid RPC frame");
                        let fault = ResponseFrame {
                            id: 0,
                            reply: Reply::Fault(Fault::invalid_argument(e.to_string())),
                        };
                        if let Ok(payload) = encode(&fault) {
                            let _ = framed.send(payload).await;
                        }
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "RPC connection read failed");
                        break;
                    }
                };

                let payload = match encode(&response) {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to encode RPC response");
                        break;
                    }
                };
                if let Err(e) = framed.send(payload).await {
                    tracing::debug!(error = %e, "RPC connection write failed");
                    break;
                }
            }

            let _ = SinkExt::<bytes::Bytes>::close(&mut framed).await;
            tracing::trace!("RPC connection finished");
        }
        .instrument(span)
        .await
    }

    async fn read_preface(&self, conn: &mut Connection) -> Result<(), RpcError> {
        let mut preface = [0u8; PREFACE.len()];
        match tokio::time::timeout(self.preface_timeout, conn.read_exact(&mut preface)).await {
            Err(_) => Err(RpcError::PrefaceTimeout(self.preface_timeout)),
            Ok(Err(e)) => Err(RpcError::Io(e)),
            Ok(Ok(_)) if preface[..] == *PREFACE => Ok(()),
            Ok(Ok(_)) => Err(RpcError::BadPreface),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::{HandlerError, RequestHandler};
    use crate::net::{ListenerError, PeerAddr};
    use crate::rpc::client::RpcConnection;
    use crate::rpc::protocol::{Call, FaultCode, PasswordReq};
    use crate::rpc::service::PasswordService;
    use std::sync::Arc;
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::sync::mpsc;

    struct EchoHandler;

    impl RequestHandler for EchoHandler {
        fn hash(&self, password: &str) -> Result<String, HandlerError> {
            Ok(format!("hashed:{password}"))
        }

        fn verify(&self, password: &str, hash: &str) -> Result<bool, HandlerError> {
            Ok(hash == format!("hashed:{password}"))
        }
    }

    struct QueueListener(mpsc::Receiver<Connection>);

    impl Listener for QueueListener {
        async fn accept(&mut self) -> Result<Connection, ListenerError> {
            self.0
                .recv()
                .await
                .ok_or_else(|| ListenerError::Closed("queue dropped".into()))
        }
    }

    fn server() -> RpcServer {
        let dispatcher = Dispatcher::new(PasswordService::new(Arc::new(EchoHandler)));
        RpcServer::new(dispatcher, &RpcConfig::default())
    }

    async fn start(server: &RpcServer) -> mpsc::Sender<Connection> {
        let (tx, rx) = mpsc::channel(4);
        let server = server.clone();
        tokio::spawn(async move { server.serve(QueueListener(rx)).await });
        tx
    }

    async fn client(tx: &mpsc::Sender<Connection>) -> DuplexStream {
        let (client, server) = tokio::io::duplex(4096);
        tx.send(Connection::new(PeerAddr::Gateway, server)).await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_calls_are_answered_in_order() {
        let server = server();
        let tx = start(&server).await;
        let mut conn = RpcConnection::handshake(client(&tx).await, 4096).await.unwrap();

        let hashed = conn
            .call(Call::Hash(PasswordReq {
                password: "pw".into(),
                hash: String::new(),
            }))
            .await
            .unwrap();
        match hashed {
            Reply::Hashed(res) => assert_eq!(res.hash, "hashed:pw"),
            other => panic!("unexpected reply: {other:?}"),
        }

        let verified = conn
            .call(Call::Verify(PasswordReq {
                password: "pw".into(),
                hash: "hashed:pw".into(),
            }))
            .await
            .unwrap();
        assert!(matches!(verified, Reply::Verified(res) if res.valid));
    }

    #[tokio::test]
    async fn test_bad_preface_closes_connection() {
        let server = server();
        let tx = start(&server).await;
        let mut raw = client(&tx).await;

        raw.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let mut buf = Vec::new();
        raw.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_frame_gets_fault() {
        let server = server();
        let tx = start(&server).await;
        let mut raw = client(&tx).await;

        raw.write_all(PREFACE).await.unwrap();
        let mut framed = Framed::new(raw, codec(4096));
        framed.send(bytes::Bytes::from_static(&[0xff, 0xff])).await.unwrap();

        let frame = framed.next().await.unwrap().unwrap();
        let response: ResponseFrame = decode(&frame).unwrap();
        assert_eq!(response.id, 0);
        assert!(matches!(
            response.reply,
            Reply::Fault(Fault { code: FaultCode::InvalidArgument, .. })
        ));
    }

    #[tokio::test]
    async fn test_drain_closes_idle_connection() {
        let server = server();
        let tx = start(&server).await;
        let mut conn = RpcConnection::handshake(client(&tx).await, 4096).await.unwrap();
        conn.call(Call::Ping).await.unwrap();

        let outcome = server.stop(Instant::now() + Duration::from_secs(1)).await;
        assert_eq!(outcome, StopOutcome::Graceful);

        let err = conn.call(Call::Ping).await.unwrap_err();
        assert!(err.is_disconnect());
    }
}
