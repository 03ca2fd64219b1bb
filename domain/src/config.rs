//! Runtime configuration (spec.md §6.5, SPEC_FULL.md §2.1).
//!
//! Plain `std::env` reads with typed defaults, the way `10log10-tinylvt`
//! loads `.env` via `dotenvy` in its binary entrypoints and then parses each
//! variable individually rather than pulling in a whole config-framework
//! dependency for eight settings.

use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Per-call bid arbitration deadline.
    pub bid_timeout: Duration,
    /// Auction closer sweep interval.
    pub closer_interval: Duration,
    /// Notification retry attempts.
    pub closer_max_retries: u32,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub jwt_public_key_path: String,
    /// Connection string for the pub/sub bus.
    pub bus_url: String,
    /// Connection string for the persistent store.
    pub db_url: String,
    /// `sqlx::PgPool` max connections. New: any `PgPool` deployment needs a
    /// pool size; the teacher pack has no equivalent setting of its own to
    /// carry over, so this is sized from the closer's concurrency needs.
    pub db_max_connections: u32,
    /// Listen address for the gateway's HTTP/WebSocket server. New: carried
    /// over from `original_source/services/realtime/main.py`'s uvicorn
    /// host:port binding, which spec.md never had to name because it
    /// treated the gateway as a black box.
    pub gateway_bind_addr: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Settings {
            bid_timeout: Duration::from_millis(env_u64("BID_TIMEOUT_MS", 5_000)?),
            closer_interval: Duration::from_secs(env_u64("CLOSER_INTERVAL_S", 60)?),
            closer_max_retries: env_u64("CLOSER_MAX_RETRIES", 3)? as u32,
            jwt_audience: env::var("JWT_AUDIENCE").unwrap_or_else(|_| "auction:realtime".to_string()),
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "auction:core".to_string()),
            jwt_public_key_path: env::var("JWT_PUBLIC_KEY_PATH")
                .unwrap_or_else(|_| "/app/secrets/public_key.pem".to_string()),
            bus_url: env::var("BUS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            db_url: env::var("DB_URL")
                .unwrap_or_else(|_| "postgres://localhost/auction".to_string()),
            db_max_connections: env_u64("DB_MAX_CONNECTIONS", 10)? as u32,
            gateway_bind_addr: env::var("GATEWAY_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        })
    }
}

fn env_u64(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}
