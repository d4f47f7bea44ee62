//! `edutrack-auth`: caller identity for the RPC surface.
//!
//! This crate is intentionally decoupled from HTTP and storage: it turns a
//! bearer token into a [`CallerIdentity`] and nothing more.

pub mod claims;
pub mod jwt;
pub mod principal;

pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use principal::{CallerIdentity, PrincipalId};
