//! Gateway-local error type (spec.md §7 "the gateway translates them into
//! ERROR frames with short human-readable strings (no stack traces)").

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("authentication failed: {0}")]
    Auth(#[from] auth::AuthError),

    #[error(transparent)]
    Arbitration(#[from] domain::ArbitrationError),

    #[error("bus error: {0}")]
    Bus(#[from] bus::BusError),
}

impl GatewayError {
    /// Text for a `{type:"ERROR", message}` frame (spec.md §6.1). Never
    /// includes anything auth-related: an auth failure never reaches this
    /// path, since it closes the connection before any frame is sent
    /// (spec.md §4.3 "reject with policy-violation close code").
    pub fn frame_message(&self) -> String {
        match self {
            GatewayError::Auth(_) => "authentication failed".to_string(),
            GatewayError::Arbitration(e) => e.client_message(),
            GatewayError::Bus(_) => "bid accepted, live update may be delayed".to_string(),
        }
    }
}
