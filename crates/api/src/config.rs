//! HTTP surface configuration.

use std::net::SocketAddr;

use thiserror::Error;
use tracing::warn;

pub const ENV_BIND_ADDR: &str = "EDUTRACK_BIND_ADDR";
pub const ENV_JWT_SECRET: &str = "JWT_SECRET";

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error)]
pub enum ApiConfigError {
    #[error("EDUTRACK_BIND_ADDR: invalid socket address '{value}'")]
    BindAddr { value: String },
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ApiConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiConfigError> {
        let raw_addr = lookup(ENV_BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .parse()
            .map_err(|_| ApiConfigError::BindAddr { value: raw_addr })?;

        let jwt_secret = lookup(ENV_JWT_SECRET).unwrap_or_else(|| {
            warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        Ok(Self {
            bind_addr,
            jwt_secret,
        })
    }
}
