use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Client-facing RPC failure.
///
/// Messages are safe to show to callers; internal detail is logged at the
/// failure site, never carried here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Internal(String),
}

impl RpcError {
    /// Stable status code of the callable protocol.
    pub fn status(&self) -> &'static str {
        match self {
            RpcError::Unauthenticated(_) => "UNAUTHENTICATED",
            RpcError::InvalidArgument(_) => "INVALID_ARGUMENT",
            RpcError::Internal(_) => "INTERNAL",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            RpcError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            RpcError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            RpcError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        json_error(self.http_status(), self.status(), self.to_string())
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": {
                "status": code,
                "message": message.into(),
            }
        })),
    )
        .into_response()
}
