//! Connection Gateway + GraphQL surface (C6, spec.md §4.3, §4.4).

pub mod api;
pub mod error;
pub mod router;
pub mod session;
pub mod state;
pub mod ws;

pub use error::GatewayError;
pub use router::build_router;
pub use state::AppState;
