//! Password service: request validation and delegation to the handler.

use std::sync::Arc;

use crate::hashing::RequestHandler;
use crate::rpc::protocol::{
    Call, ErrorPayload, Fault, HashRes, PasswordReq, PongRes, Reply, Timestamp, VerifyRes,
};

const PASSWORD_MANDATORY: &str = "password value is mandatory";
const HASH_MANDATORY: &str = "hash value is mandatory";

/// Implements the three RPC methods on top of a [`RequestHandler`].
#[derive(Clone)]
pub struct PasswordService {
    handler: Arc<dyn RequestHandler>,
}

impl PasswordService {
    pub fn new(handler: Arc<dyn RequestHandler>) -> Self {
        Self { handler }
    }

    /// Execute one call.
    ///
    /// Validation and handler errors are part of the reply; `Err` is reserved
    /// for calls that could not run at all.
    pub async fn call(&self, call: Call) -> Result<Reply, Fault> {
        match call {
            Call::Hash(req) => self.hash(req).await.map(Reply::Hashed),
            Call::Verify(req) => self.verify(req).await.map(Reply::Verified),
            Call::Ping => Ok(Reply::Pong(self.ping())),
        }
    }

    pub async fn hash(&self, req: PasswordReq) -> Result<HashRes, Fault> {
        if req.password.trim().is_empty() {
            return Ok(HashRes {
                hash: String::new(),
                error: Some(ErrorPayload::precondition_failed(PASSWORD_MANDATORY)),
            });
        }

        let handler = Arc::clone(&self.handler);
        let res = match blocking(move || handler.hash(&req.password)).await? {
            Ok(hash) => HashRes { hash, error: None },
            Err(e) => HashRes {
                hash: String::new(),
                error: Some(ErrorPayload::bad_request(e.to_string())),
            },
        };
        Ok(res)
    }

    pub async fn verify(&self, req: PasswordReq) -> Result<VerifyRes, Fault> {
        let missing = if req.password.trim().is_empty() {
            Some(PASSWORD_MANDATORY)
        } else if req.hash.trim().is_empty() {
            Some(HASH_MANDATORY)
        } else {
            None
        };
        if let Some(message) = missing {
            return Ok(VerifyRes {
                valid: false,
                error: Some(ErrorPayload::precondition_failed(message)),
            });
        }

        let handler = Arc::clone(&self.handler);
        let res = match blocking(move || handler.verify(&req.password, &req.hash)).await? {
            Ok(valid) => VerifyRes { valid, error: None },
            Err(e) => VerifyRes {
                valid: false,
                error: Some(ErrorPayload::bad_request(e.to_string())),
            },
        };
        Ok(res)
    }

    pub fn ping(&self) -> PongRes {
        PongRes {
            timestamp: Timestamp::now(),
        }
    }
}

/// Run CPU-bound handler work on the blocking pool.
///
/// A panic in `f` is resumed on the calling task so the recovery
/// interceptor sees it.
async fn blocking<T, F>(f: F) -> Result<T, Fault>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => Ok(value),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => Err(Fault::unavailable("service is shutting down")),
    }
}
