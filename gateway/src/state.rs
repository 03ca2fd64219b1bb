//! Shared state handed to every axum handler (spec.md §4.3, §4.4).

use std::sync::Arc;
use std::time::Duration;

use arbitration::ArbitrationCore;
use auth::TokenVerifier;
use bus::Bus;
use storage::AuctionStore;

use crate::api::{build_schema, AppSchema};
use crate::session::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AuctionStore>,
    pub bus: Arc<dyn Bus>,
    pub verifier: Arc<TokenVerifier>,
    pub arbitration: Arc<ArbitrationCore>,
    pub sessions: Arc<SessionRegistry>,
    pub schema: AppSchema,
}

impl AppState {
    pub fn new(
        store: Arc<dyn AuctionStore>,
        bus: Arc<dyn Bus>,
        verifier: Arc<TokenVerifier>,
        bid_timeout: Duration,
    ) -> Self {
        let arbitration = Arc::new(ArbitrationCore::new(store.clone(), bid_timeout));
        let schema = build_schema(store.clone());
        AppState {
            store,
            bus,
            verifier,
            arbitration,
            sessions: Arc::new(SessionRegistry::new()),
            schema,
        }
    }
}
