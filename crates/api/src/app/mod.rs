//! HTTP API application wiring (Axum router + shared state).
//!
//! - `routes/`: HTTP routes + handlers
//! - `errors.rs`: callable-protocol error responses

use std::sync::Arc;

use axum::{Router, routing::get};
use tower::ServiceBuilder;

use edutrack_auth::{Hs256JwtValidator, JwtValidator};
use edutrack_infra::document_store::DocumentStore;

use crate::middleware;

pub mod errors;
pub mod routes;

/// Shared state of the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub jwt: Arc<dyn JwtValidator>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, jwt: Arc<dyn JwtValidator>) -> Self {
        Self { store, jwt }
    }

    /// State verifying HS256 tokens signed with `jwt_secret`.
    pub fn with_hs256(store: Arc<dyn DocumentStore>, jwt_secret: &str) -> Self {
        Self::new(store, Arc::new(Hs256JwtValidator::new(jwt_secret.as_bytes())))
    }
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(state: AppState) -> Router {
    let auth_state = middleware::AuthState {
        jwt: state.jwt.clone(),
    };

    // Callable routes: caller identity resolved (optionally) from the token.
    let rpc = routes::rpc::router()
        .with_state(state)
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(rpc)
        .layer(ServiceBuilder::new())
}
