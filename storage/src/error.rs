//! Storage-level error type (spec.md §7).
//!
//! `sqlx::Error` and friends live only here; every public `AuctionStore`
//! method returns `domain::ArbitrationError` instead, via `From<StoreError>`,
//! so callers never need to match on a storage-specific error type.

use thiserror::Error;

use domain::ArbitrationError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("auction not found")]
    AuctionNotFound,

    #[error("wallet not found for user")]
    WalletNotFound,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Arbitration(#[from] ArbitrationError),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl From<StoreError> for ArbitrationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AuctionNotFound => {
                ArbitrationError::Precondition("auction not found".to_string())
            }
            StoreError::WalletNotFound => {
                ArbitrationError::Fatal
            }
            StoreError::PermissionDenied(msg) => ArbitrationError::Precondition(msg),
            StoreError::Validation(msg) => ArbitrationError::Validation(msg),
            StoreError::Arbitration(e) => e,
            StoreError::Sqlx(e) => classify_sqlx_error(e),
        }
    }
}

fn classify_sqlx_error(err: sqlx::Error) -> ArbitrationError {
    match &err {
        sqlx::Error::Database(db_err) => {
            // Serialization failures and deadlocks are Postgres SQLSTATE 40001/40P01.
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") => {
                    ArbitrationError::Transient(err.to_string())
                }
                _ => ArbitrationError::Fatal,
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            ArbitrationError::Transient(err.to_string())
        }
        _ => ArbitrationError::Fatal,
    }
}
