//! Connection Gateway (C6, spec.md §4.3, §6.1).
//!
//! State machine: `CONNECTING -> (auth ok) -> SUBSCRIBED <-> BROADCASTING
//! -> CLOSED`, or `CONNECTING -> (auth fail) -> CLOSED (policy violation)`.
//! Ported from `original_source/services/realtime/routers/auction.py`'s
//! `websocket_endpoint` + `utils/redis.py`'s `redis_listener`: same
//! inbound-loop-plus-parallel-listener-task shape, rewritten as two
//! `tokio::spawn`ed tasks joined by `tokio::select!` and a single writer
//! task, the cancellation pattern grounded in
//! `other_examples/20b5f348_..._application.rs.rs`'s
//! `select! { result = task_a => ..., result = task_b => ... }`.

use std::str::FromStr;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use jiff::Timestamp;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use bus::Topic;
use domain::{mask_username, AuctionId, ClientFrame, ServerFrame};

use crate::error::GatewayError;
use crate::state::AppState;

/// The 1008 "Policy Violation" close code, used for auth rejection
/// (spec.md §4.3 "reject with policy-violation close code").
const POLICY_VIOLATION: u16 = 1008;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Token may arrive via an HTTP-only cookie or a `token=` query parameter
/// (spec.md §6.1). Cookies are parsed by hand rather than pulling in
/// `axum-extra`'s cookie jar for a single lookup.
fn extract_token(headers: &HeaderMap, query: &WsQuery) -> Option<String> {
    if let Some(token) = &query.token {
        if !token.is_empty() {
            return Some(token.clone());
        }
    }
    let cookie_header = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    cookie_header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == "token").then(|| value.to_string())
    })
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Path(auction_id_raw): Path<String>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let Ok(auction_id) = AuctionId::from_str(&auction_id_raw) else {
        return (StatusCode::BAD_REQUEST, "invalid auction id").into_response();
    };

    let token = extract_token(&headers, &query);
    let verifier = state.verifier.clone();

    match token.and_then(|t| verifier.verify(&t).ok()) {
        Some(claims) => ws
            .on_upgrade(move |socket| handle_socket(socket, state, auction_id, claims))
            .into_response(),
        None => ws.on_upgrade(|socket| reject_policy_violation(socket)).into_response(),
    }
}

async fn reject_policy_violation(mut socket: WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: POLICY_VIOLATION,
            reason: "missing or invalid token".into(),
        })))
        .await;
}

async fn handle_socket(socket: WebSocket, state: AppState, auction_id: AuctionId, claims: auth::Claims) {
    let session_uid = Uuid::new_v4();
    let key = (auction_id, session_uid);
    let user_id = claims.user_id;
    state.sessions.insert(key);
    info!(%auction_id, %user_id, "session subscribed");

    let topic = Topic::auction(auction_id);
    let bus_stream = match state.bus.subscribe(&topic).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "failed to subscribe to bus topic, closing session");
            state.sessions.remove(&key);
            return;
        }
    };

    let (mut ws_sink, mut ws_stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    let inbound_tx = tx.clone();
    let inbound_state = state.clone();
    let inbound = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_stream.next().await {
            let Message::Text(text) = msg else {
                continue;
            };
            handle_inbound_frame(&inbound_state, auction_id, &claims, &text, &inbound_tx).await;
        }
    });

    let outbound_tx = tx.clone();
    let outbound = tokio::spawn(async move {
        let mut bus_stream = bus_stream;
        while let Some(message) = bus_stream.next().await {
            if outbound_tx.send(Message::Text(message)).is_err() {
                break;
            }
        }
    });

    let inbound_abort = inbound.abort_handle();
    let outbound_abort = outbound.abort_handle();

    tokio::select! {
        _ = inbound => { outbound_abort.abort(); }
        _ = outbound => { inbound_abort.abort(); }
    }

    writer.abort();
    drop(tx);

    state.sessions.remove(&key);
    info!(%auction_id, %user_id, "session closed");
}

/// One inbound client frame (spec.md §4.3 "Inbound message loop"). Invalid
/// JSON is silently dropped; everything else gets a frame back on `tx`.
async fn handle_inbound_frame(
    state: &AppState,
    auction_id: AuctionId,
    claims: &auth::Claims,
    text: &str,
    tx: &mpsc::UnboundedSender<Message>,
) {
    let Ok(frame) = serde_json::from_str::<ClientFrame>(text) else {
        return;
    };

    match frame {
        ClientFrame::Bid { amount } => {
            let Some(amount) = amount.to_decimal() else {
                let _ = tx.send(Message::Text(
                    ServerFrame::error("bid amount must be a valid decimal").to_json(),
                ));
                return;
            };
            handle_arbitration_call(state, auction_id, tx, |core, now| {
                core.place_bid(auction_id, claims.user_id, amount, now)
            })
            .await;
        }
        ClientFrame::BuyNow => {
            handle_arbitration_call(state, auction_id, tx, |core, now| {
                core.buy_now(auction_id, claims.user_id, now)
            })
            .await;
        }
        ClientFrame::Unknown => {
            let _ = tx.send(Message::Text(ServerFrame::error("unknown action").to_json()));
        }
    }
}

/// Shared tail of the `BID`/`BUY_NOW` inbound handlers (spec.md §4.1: both
/// `placeBid` and `buyNow` produce the same `{new_price, new_balance,
/// bidder, timestamp}` result shape, so both get the same private
/// `BID_ACK` plus public `NEW_BID` wire treatment, spec.md §6.1).
async fn handle_arbitration_call<F, Fut>(
    state: &AppState,
    auction_id: AuctionId,
    tx: &mpsc::UnboundedSender<Message>,
    call: F,
) where
    F: FnOnce(&arbitration::ArbitrationCore, Timestamp) -> Fut,
    Fut: std::future::Future<Output = Result<storage::BidOutcome, domain::ArbitrationError>>,
{
    let now = Timestamp::now();
    match call(&state.arbitration, now).await {
        Ok(outcome) => {
            let ack = ServerFrame::bid_ack(outcome.new_price, outcome.new_balance, outcome.timestamp);
            let _ = tx.send(Message::Text(ack.to_json()));

            let masked = mask_username(&outcome.bidder_username);
            let broadcast = ServerFrame::new_bid(outcome.new_price, outcome.bidder_id, masked, outcome.timestamp);

            let topic = Topic::auction(auction_id);
            if let Err(e) = state.bus.publish(&topic, broadcast.to_json()).await {
                // spec.md §7 "Bus unavailable": the bid already committed; log and
                // continue. The ACK above already reached the originator.
                warn!(%auction_id, error = %e, "failed to publish NEW_BID, bid remains committed");
            }
        }
        Err(e) => {
            let message = GatewayError::from(e).frame_message();
            let _ = tx.send(Message::Text(ServerFrame::error(message).to_json()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn token_prefers_query_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::COOKIE, HeaderValue::from_static("token=cookie-value"));
        let query = WsQuery { token: Some("query-value".to_string()) };
        assert_eq!(extract_token(&headers, &query), Some("query-value".to_string()));
    }

    #[test]
    fn token_falls_back_to_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::COOKIE, HeaderValue::from_static("other=x; token=cookie-value"));
        let query = WsQuery { token: None };
        assert_eq!(extract_token(&headers, &query), Some("cookie-value".to_string()));
    }

    #[test]
    fn missing_token_is_none() {
        let headers = HeaderMap::new();
        let query = WsQuery { token: None };
        assert_eq!(extract_token(&headers, &query), None);
    }
}
