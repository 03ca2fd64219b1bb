//! Error taxonomy shared by the arbitration, storage, and gateway crates
//! (spec.md §7: kinds, not type names).

use thiserror::Error;

/// Outcome of a rejected or failed `place_bid`/`buy_now`/`close_expired`
/// call. Every higher layer (storage, arbitration, gateway) maps its own
/// error type onto this one so the gateway has a single place to turn an
/// error into an ERROR frame string (spec.md §7: "no stack traces").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArbitrationError {
    /// Malformed input, non-positive amount, bid <= current price.
    #[error("{0}")]
    Validation(String),

    /// Auction not ACTIVE, expired, owner bidding on own auction.
    #[error("{0}")]
    Precondition(String),

    /// `wallet.balance < amount`.
    #[error("insufficient funds: balance {balance} short of {required}")]
    InsufficientFunds {
        balance: rust_decimal::Decimal,
        required: rust_decimal::Decimal,
    },

    /// Missing/invalid token, wrong audience/issuer, missing `user_id`.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Serialization failure or lock-wait timeout; caller may retry.
    #[error("transient storage failure: {0}")]
    Transient(String),

    /// The per-call bid deadline (spec.md §5, §6.5 `BID_TIMEOUT_MS`)
    /// elapsed before the transaction committed. Distinct from `Transient`
    /// because the wire contract for this case is a literal `"timeout"`
    /// message (spec.md §5 "Cancellation"), not the generic
    /// "service unavailable" a retried-and-exhausted transient failure gets.
    #[error("bid arbitration deadline exceeded")]
    Timeout,

    /// Publish to the pub/sub bus failed after the bid already committed.
    #[error("bus unavailable: {0}")]
    BusUnavailable(String),

    /// Schema/constraint violation indicating a bug; rolled back, logged,
    /// surfaced opaquely.
    #[error("internal error")]
    Fatal,
}

impl ArbitrationError {
    /// Short human-readable string for an ERROR frame (spec.md §7).
    /// Deliberately never includes the `Fatal` variant's internals.
    pub fn client_message(&self) -> String {
        match self {
            ArbitrationError::Validation(msg) => msg.clone(),
            ArbitrationError::Precondition(msg) => msg.clone(),
            ArbitrationError::InsufficientFunds { balance, required } => {
                format!("insufficient funds: balance {balance} short of {required}")
            }
            ArbitrationError::Authentication(msg) => msg.clone(),
            ArbitrationError::Transient(_) => "service unavailable".to_string(),
            ArbitrationError::Timeout => "timeout".to_string(),
            ArbitrationError::BusUnavailable(_) => {
                "bid accepted, live update may be delayed".to_string()
            }
            ArbitrationError::Fatal => "internal error".to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ArbitrationError::Transient(_))
    }
}
