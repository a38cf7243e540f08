//! RPC client side: a single connection, and a pooled client for the internal socket.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::rpc::protocol::{codec, decode, encode, Call, Reply, RequestFrame, ResponseFrame, PREFACE};
use crate::rpc::RpcError;

/// One client connection speaking the RPC protocol.
pub struct RpcConnection<T> {
    framed: Framed<T, LengthDelimitedCodec>,
    next_id: u64,
}

impl<T: AsyncRead + AsyncWrite + Unpin> RpcConnection<T> {
    /// Send the preface over `io` and wrap it for framed calls.
    pub async fn handshake(mut io: T, max_frame_bytes: usize) -> Result<Self, RpcError> {
        io.write_all(PREFACE).await?;
        io.flush().await?;
        Ok(Self {
            framed: Framed::new(io, codec(max_frame_bytes)),
            next_id: 1,
        })
    }

    /// Issue one call and wait for its reply.
    pub async fn call(&mut self, call: Call) -> Result<Reply, RpcError> {
        let id = self.next_id;
        self.next_id += 1;

        let payload = encode(&RequestFrame { id, call })?;
        self.framed.send(payload).await?;

        let frame = match self.framed.next().await {
            Some(frame) => frame?,
            None => return Err(RpcError::ConnectionClosed),
        };
        let response: ResponseFrame = decode(&frame)?;

        // The server answers frames it could not decode with id 0.
        let unattributed_fault = response.id == 0 && matches!(response.reply, Reply::Fault(_));
        if response.id != id && !unattributed_fault {
            return Err(RpcError::IdMismatch {
                expected: id,
                got: response.id,
            });
        }
        Ok(response.reply)
    }
}

#[cfg(unix)]
pub use self::pool::RpcClient;

#[cfg(unix)]
mod pool {
    use std::path::{Path, PathBuf};
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    use tokio::net::UnixStream;

    use super::RpcConnection;
    use crate::config::RpcConfig;
    use crate::rpc::protocol::{Call, Reply};
    use crate::rpc::RpcError;

    /// Client for the internal Unix socket with a small idle-connection pool.
    pub struct RpcClient {
        path: PathBuf,
        idle: Mutex<Vec<RpcConnection<UnixStream>>>,
        pool_size: usize,
        dial_timeout: Duration,
        max_frame_bytes: usize,
    }

    impl RpcClient {
        pub fn new(path: &Path, config: &RpcConfig) -> Self {
            Self {
                path: path.to_path_buf(),
                idle: Mutex::new(Vec::new()),
                pool_size: config.client_pool_size,
                dial_timeout: config.dial_timeout(),
                max_frame_bytes: config.max_frame_bytes,
            }
        }

        /// Create a client and dial one connection, failing if the socket is unreachable.
        pub async fn connect(path: &Path, config: &RpcConfig) -> Result<Self, RpcError> {
            let client = Self::new(path, config);
            let conn = client.dial().await?;
            client.release(conn);
            tracing::debug!(path = %path.display(), "RPC client connected");
            Ok(client)
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        /// Number of idle pooled connections.
        pub fn idle_count(&self) -> usize {
            self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
        }

        /// Issue a call, retrying once on a fresh connection if a pooled one was closed.
        pub async fn call(&self, call: Call) -> Result<Reply, RpcError> {
            if let Some(mut conn) = self.checkout() {
                match conn.call(call.clone()).await {
                    Ok(reply) => {
                        self.release(conn);
                        return Ok(reply);
                    }
                    Err(e) if e.is_disconnect() => {
                        tracing::debug!(error = %e, "Pooled RPC connection closed, redialing");
                    }
                    Err(e) => return Err(e),
                }
            }

            let mut conn = self.dial().await?;
            let reply = conn.call(call).await?;
            self.release(conn);
            Ok(reply)
        }

        async fn dial(&self) -> Result<RpcConnection<UnixStream>, RpcError> {
            let stream = tokio::time::timeout(self.dial_timeout, UnixStream::connect(&self.path))
                .await
                .map_err(|_| RpcError::DialTimeout(self.dial_timeout))??;
            RpcConnection::handshake(stream, self.max_frame_bytes).await
        }

        fn checkout(&self) -> Option<RpcConnection<UnixStream>> {
            self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop()
        }

        fn release(&self, conn: RpcConnection<UnixStream>) {
            let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
            if idle.len() < self.pool_size {
                idle.push(conn);
            }
        }
    }

    impl std::fmt::Debug for RpcClient {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RpcClient")
                .field("path", &self.path)
                .field("pool_size", &self.pool_size)
                .field("idle", &self.idle_count())
                .finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::protocol::{Fault, PongRes};
    use tokio::io::AsyncReadExt;

    /// Reads one request and answers with `response_id`.
    async fn reply_with_id(io: tokio::io::DuplexStream, response_id: u64, reply: Reply) {
        let mut io = io;
        let mut preface = [0u8; PREFACE.len()];
        io.read_exact(&mut preface).await.unwrap();
        let mut framed = Framed::new(io, codec(1024));
        let _request = framed.next().await.unwrap().unwrap();
        let payload = encode(&ResponseFrame { id: response_id, reply }).unwrap();
        framed.send(payload).await.unwrap();
    }

    #[tokio::test]
    async fn test_mismatched_response_id() {
        let (client, server) = tokio::io::duplex(1024);
        tokio::spawn(reply_with_id(server, 42, Reply::Pong(PongRes::default())));

        let mut conn = RpcConnection::handshake(client, 1024).await.unwrap();
        let err = conn.call(Call::Ping).await.unwrap_err();
        assert!(matches!(err, RpcError::IdMismatch { expected: 1, got: 42 }));
    }

    #[tokio::test]
    async fn test_unattributed_fault_is_returned() {
        let (client, server) = tokio::io::duplex(1024);
        let fault = Fault::invalid_argument("bad frame");
        tokio::spawn(reply_with_id(server, 0, Reply::Fault(fault.clone())));

        let mut conn = RpcConnection::handshake(client, 1024).await.unwrap();
        assert_eq!(conn.call(Call::Ping).await.unwrap(), Reply::Fault(fault));
    }

    #[tokio::test]
    async fn test_closed_server_is_disconnect() {
        let (client, server) = tokio::io::duplex(1024);
        let mut conn = RpcConnection::handshake(client, 1024).await.unwrap();
        drop(server);

        let err = conn.call(Call::Ping).await.unwrap_err();
        assert!(err.is_disconnect(), "unexpected error: {err}");
    }
}
