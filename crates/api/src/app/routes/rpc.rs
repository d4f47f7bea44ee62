//! Callable RPC routes.
//!
//! Wire format: `POST /<name>` with `{"data": {...}}`, answered by
//! `{"result": {...}}` or `{"error": {"status", "message"}}`.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, State},
    response::{IntoResponse, Response},
    routing::post,
};
use chrono::Utc;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::app::AppState;
use crate::app::errors::RpcError;
use crate::context::CallerContext;
use crate::gateway::{self, LogActivityRequest, SayHelloRequest};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sayHello", post(say_hello))
        .route("/logActivity", post(log_activity))
        .route("/logUserActivity", post(log_activity))
}

#[derive(Debug, Deserialize)]
struct CallableRequest<T> {
    #[serde(default)]
    data: T,
}

#[derive(Debug, Serialize)]
struct CallableResponse<T> {
    result: T,
}

/// Decode the `data` member of a callable body. An empty body means `{}`.
fn decode<T>(body: &[u8]) -> Result<T, RpcError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice::<CallableRequest<T>>(body)
        .map(|r| r.data)
        .map_err(|e| RpcError::InvalidArgument(format!("invalid request body: {e}")))
}

fn respond<T: Serialize>(result: Result<T, RpcError>) -> Response {
    match result {
        Ok(result) => Json(CallableResponse { result }).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn say_hello(body: Bytes) -> Response {
    respond(decode::<SayHelloRequest>(&body).map(|req| gateway::say_hello(req, Utc::now())))
}

async fn log_activity(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    body: Bytes,
) -> Response {
    let request = match decode::<LogActivityRequest>(&body) {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };
    respond(gateway::log_activity(state.store.as_ref(), caller.identity(), request, Utc::now()).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_callable_envelopes() {
        let req: SayHelloRequest = decode(br#"{"data":{"name":"Ada"}}"#).unwrap();
        assert_eq!(req.name.as_deref(), Some("Ada"));

        let empty: SayHelloRequest = decode(b"").unwrap();
        assert_eq!(empty.name, None);

        let no_data: LogActivityRequest = decode(b"{}").unwrap();
        assert_eq!(no_data.activity_type, None);

        let bad = decode::<LogActivityRequest>(b"{not json");
        assert!(matches!(bad, Err(RpcError::InvalidArgument(_))));
    }
}
