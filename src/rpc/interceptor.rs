//! Per-call interceptor chain.
//!
//! Every call, whichever transport it arrived on, passes through the same
//! layers in this order:
//! 1. tracing span `rpc.call` tagged with method, call id, peer and transport
//! 2. metrics (started / handled / handling time)
//! 3. panic recovery, turning a panic into `Fault::internal()` for that call only
//! 4. one structured completion log event

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use tracing::Instrument;

use crate::net::PeerAddr;
use crate::observability::metrics;
use crate::rpc::protocol::{
    Call, ErrorPayload, Fault, HashRes, Reply, VerifyRes, CODE_PRECONDITION_FAILED,
};
use crate::rpc::service::PasswordService;

/// Who issued a call.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Frame id (or a gateway-local sequence number).
    pub id: u64,
    pub peer: PeerAddr,
}

/// Entry point for executing calls through the interceptor chain.
#[derive(Clone)]
pub struct Dispatcher {
    service: Arc<PasswordService>,
}

impl Dispatcher {
    pub fn new(service: PasswordService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    pub async fn dispatch(&self, ctx: &CallContext, call: Call) -> Reply {
        let method = call.method();
        let span = tracing::info_span!(
            "rpc.call",
            method,
            call_id = ctx.id,
            peer = %ctx.peer,
            transport = ctx.peer.transport(),
        );

        async move {
            metrics::record_rpc_started(method);
            let start = Instant::now();

            let reply = recover(method, self.service.call(call)).await;

            let elapsed = start.elapsed();
            let code = reply_code(&reply);
            metrics::record_rpc_handled(method, code, elapsed);
            tracing::info!(
                method,
                code,
                duration_ms = elapsed.as_secs_f64() * 1000.0,
                "RPC call finished"
            );
            reply
        }
        .instrument(span)
        .await
    }
}

async fn recover<F>(method: &'static str, call: F) -> Reply
where
    F: Future<Output = Result<Reply, Fault>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(reply)) => reply,
        Ok(Err(fault)) => Reply::Fault(fault),
        Err(panic) => {
            tracing::error!(
                method,
                panic = %panic_message(panic.as_ref()),
                "RPC handler panicked"
            );
            Reply::Fault(Fault::internal())
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Status label for metrics and logs.
pub fn reply_code(reply: &Reply) -> &'static str {
    match reply {
        Reply::Fault(fault) => fault.code.as_str(),
        Reply::Hashed(HashRes {
            error: Some(error), ..
        })
        | Reply::Verified(VerifyRes {
            error: Some(error), ..
        }) => payload_code(error),
        _ => "ok",
    }
}

fn payload_code(error: &ErrorPayload) -> &'static str {
    if error.code == CODE_PRECONDITION_FAILED {
        "precondition_failed"
    } else {
        "bad_request"
    }
}
