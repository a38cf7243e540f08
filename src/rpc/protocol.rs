//! Binary RPC wire protocol.
//!
//! A client opens a connection by sending [`PREFACE`], then exchanges
//! length-delimited frames: a 4-byte big-endian length followed by a
//! postcard-encoded [`RequestFrame`] or [`ResponseFrame`]. Calls on one
//! connection are answered in order.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::codec::LengthDelimitedCodec;

use crate::rpc::RpcError;

/// Bytes a client sends before its first frame.
pub const PREFACE: &[u8] = b"PWRPC/1\n";

/// Validation failure code (HTTP 412 Precondition Failed).
pub const CODE_PRECONDITION_FAILED: u32 = 412;

/// Handler failure code (HTTP 400 Bad Request).
pub const CODE_BAD_REQUEST: u32 = 400;

/// Input to `hash` and `verify`. `hash` is ignored by the `hash` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordReq {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub hash: String,
}

/// Structured per-call error carried inside a successful reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: u32,
    pub message: String,
}

impl ErrorPayload {
    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self {
            code: CODE_PRECONDITION_FAILED,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: CODE_BAD_REQUEST,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRes {
    pub hash: String,
    pub error: Option<ErrorPayload>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRes {
    pub valid: bool,
    pub error: Option<ErrorPayload>,
}

/// Seconds and nanoseconds since the Unix epoch, UTC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: u32,
}

impl Timestamp {
    pub fn now() -> Self {
        let elapsed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            seconds: i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX),
            nanos: elapsed.subsec_nanos(),
        }
    }

    /// RFC 3339 in UTC with the fraction trimmed to 0, 3, 6 or 9 digits.
    pub fn to_rfc3339(&self) -> String {
        chrono::DateTime::<chrono::Utc>::from_timestamp(self.seconds, self.nanos)
            .unwrap_or_default()
            .to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PongRes {
    pub timestamp: Timestamp,
}

/// Transport-level status for calls that could not produce a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultCode {
    Internal,
    InvalidArgument,
    Unavailable,
}

impl FaultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultCode::Internal => "internal",
            FaultCode::InvalidArgument => "invalid_argument",
            FaultCode::Unavailable => "unavailable",
        }
    }
}

/// Opaque failure of a call. Never carries internal details for `Internal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{}: {message}", .code.as_str())]
pub struct Fault {
    pub code: FaultCode,
    pub message: String,
}

impl Fault {
    pub fn internal() -> Self {
        Self {
            code: FaultCode::Internal,
            message: "internal error".to_string(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            code: FaultCode::InvalidArgument,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            code: FaultCode::Unavailable,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Call {
    Hash(PasswordReq),
    Verify(PasswordReq),
    Ping,
}

impl Call {
    /// Method name used in logs and metric labels.
    pub fn method(&self) -> &'static str {
        match self {
            Call::Hash(_) => "hash",
            Call::Verify(_) => "verify",
            Call::Ping => "ping",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    Hashed(HashRes),
    Verified(VerifyRes),
    Pong(PongRes),
    Fault(Fault),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: u64,
    pub call: Call,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: u64,
    pub reply: Reply,
}

/// Frame codec shared by server and client.
pub fn codec(max_frame_bytes: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(max_frame_bytes)
        .new_codec()
}

pub fn encode<T: Serialize>(message: &T) -> Result<Bytes, RpcError> {
    postcard::to_stdvec(message)
        .map(Bytes::from)
        .map_err(RpcError::Encode)
}

pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, RpcError> {
    postcard::from_bytes(payload).map_err(RpcError::Decode)
}
