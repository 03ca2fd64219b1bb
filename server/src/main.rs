//! Process entrypoint: wires the ambient stack (config, logging, storage,
//! bus, auth) together and runs the Connection Gateway's HTTP server
//! alongside the Auction Closer's sweep loop (spec.md §2 "two long-running
//! processes: a realtime gateway ... and a closer").
//!
//! Bootstrap shape: load env, init tracing, build the pool, log, run
//! forever. Follows `other_examples/52ab90ed_..._attestation_watcher.rs.rs`'s
//! `main`.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use auth::TokenVerifier;
use bus::redis::RedisBus;
use bus::Bus;
use closer::{Closer, LoggingNotifier};
use domain::Settings;
use gateway::AppState;
use storage::pg::PgStore;
use storage::AuctionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let settings = Settings::from_env().context("loading configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.db_max_connections)
        .connect(&settings.db_url)
        .await
        .context("connecting to the persistent store")?;
    let store: Arc<dyn AuctionStore> = Arc::new(PgStore::new(pool));

    let bus: Arc<dyn Bus> = Arc::new(
        RedisBus::connect(&settings.bus_url)
            .await
            .context("connecting to the pub/sub bus")?,
    );

    let verifier = Arc::new(TokenVerifier::from_settings(&settings).context("loading JWT verifier")?);

    let state = AppState::new(store.clone(), bus, verifier, settings.bid_timeout);
    let router = gateway::build_router(state);

    let closer = Closer::new(
        store,
        Arc::new(LoggingNotifier),
        settings.closer_interval,
        settings.closer_max_retries,
    );

    info!(addr = %settings.gateway_bind_addr, "starting outcry server");
    let listener = tokio::net::TcpListener::bind(&settings.gateway_bind_addr)
        .await
        .context("binding gateway listen address")?;

    tokio::select! {
        result = axum::serve(listener, router) => {
            result.context("gateway server exited")?;
        }
        _ = closer.run() => {}
    }

    Ok(())
}
