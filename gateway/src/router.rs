//! HTTP surface: the WebSocket upgrade route (C6) plus the GraphQL endpoint
//! (spec.md §4.4), wired together behind the CORS/tracing layers
//! `SPEC_FULL.md`'s ambient-stack section calls for.

use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::ws::ws_handler;

async fn graphql_handler(State(state): State<AppState>, req: GraphQLRequest) -> GraphQLResponse {
    state.schema.execute(req.into_inner()).await.into()
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws/auction/:auction_id", get(ws_handler))
        .route("/graphql", post(graphql_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
