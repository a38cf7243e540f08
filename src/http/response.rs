//! Error responses for the JSON gateway.
//!
//! # Responsibilities
//! - Map RPC faults to HTTP status codes
//! - Render every gateway error as `{"code": ..., "error": ...}`
//!
//! # Design Decisions
//! - Per-call validation and handler errors are not HTTP errors; they stay in the 200 body
//! - Internal faults never expose details beyond "internal error"

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::rpc::protocol::{Fault, FaultCode};

/// JSON body of every non-2xx gateway response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub error: String,
}

/// Status code for a fault returned by the RPC layer.
pub fn fault_status(code: FaultCode) -> StatusCode {
    match code {
        FaultCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        FaultCode::InvalidArgument => StatusCode::BAD_REQUEST,
        FaultCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Build an error response with the given status.
pub fn error_response(status: StatusCode, code: &'static str, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            code,
            error: error.into(),
        }),
    )
        .into_response()
}

pub fn fault_response(fault: Fault) -> Response {
    error_response(fault_status(fault.code), fault.code.as_str(), fault.message)
}
