use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::debug;

use edutrack_auth::JwtValidator;

use crate::app::errors::RpcError;
use crate::context::CallerContext;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

/// Resolve the caller identity from an optional bearer token.
///
/// - no `Authorization` header → anonymous caller (operations decide)
/// - header present but malformed, badly signed or expired → `UNAUTHENTICATED`
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let caller = match extract_bearer(req.headers()) {
        Ok(None) => CallerContext::anonymous(),
        Ok(Some(token)) => match state.jwt.validate(token, Utc::now()) {
            Ok(claims) => CallerContext::authenticated(claims.identity()),
            Err(e) => {
                debug!(error = %e, "bearer token rejected");
                return RpcError::Unauthenticated("invalid or expired token".to_string())
                    .into_response();
            }
        },
        Err(e) => return e.into_response(),
    };

    req.extensions_mut().insert(caller);
    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Result<Option<&str>, RpcError> {
    let Some(header) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let malformed = || RpcError::Unauthenticated("malformed authorization header".to_string());

    let header = header.to_str().map_err(|_| malformed())?;
    let token = header.strip_prefix("Bearer ").ok_or_else(malformed)?.trim();
    if token.is_empty() {
        return Err(malformed());
    }

    Ok(Some(token))
}
