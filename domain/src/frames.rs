//! Wire protocol between clients and the Connection Gateway (spec.md §6.1).
//!
//! The gateway is "a thin translator between wire frames and these values"
//! (spec.md §9): these types are the values; `gateway::ws` does the
//! translating. The same `ServerFrame::NewBid` variant is what gets
//! published verbatim to the pub/sub bus (spec.md §6.2: "Message body: the
//! UTF-8 JSON encoding of the NEW_BID frame").

use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::UserId;
use crate::money::format_amount;

/// `{ "action": "BID", "amount": <decimal> }` plus `{ "action": "BUY_NOW" }`
/// (spec.md §6.1 names the `BID` shape; `BUY_NOW` carries the same
/// discriminated-frame convention so spec.md §4.1's Buy-Now variant is
/// reachable over the wire the same way a normal bid is). Unrecognized
/// `action` values still parse (so the gateway can reply with an "unknown
/// action" ERROR frame instead of silently dropping the frame) but carry
/// no payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientFrame {
    Bid { amount: AmountField },
    BuyNow,
    #[serde(other)]
    Unknown,
}

/// Bid amounts arrive as either a JSON number or a string; the original
/// service (`Decimal(str(payload.get("amount")))`) accepts both, so this
/// crate does too rather than silently rejecting well-formed clients.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountField {
    Number(f64),
    Text(String),
}

impl AmountField {
    pub fn to_decimal(&self) -> Option<Decimal> {
        match self {
            AmountField::Number(n) => Decimal::try_from(*n).ok(),
            AmountField::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BidderInfo {
    pub id: UserId,
    pub username: String,
}

/// `type`-discriminated server->client frame (spec.md §6.1).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "BID_ACK")]
    BidAck {
        amount: String,
        new_balance: String,
        timestamp: String,
    },
    #[serde(rename = "NEW_BID")]
    NewBid {
        amount: String,
        bidder: BidderInfo,
        timestamp: String,
    },
    #[serde(rename = "ERROR")]
    Error { message: String },
}

impl ServerFrame {
    pub fn bid_ack(amount: Decimal, new_balance: Decimal, timestamp: Timestamp) -> Self {
        ServerFrame::BidAck {
            amount: format_amount(amount),
            new_balance: format_amount(new_balance),
            timestamp: timestamp.to_string(),
        }
    }

    pub fn new_bid(amount: Decimal, bidder_id: UserId, masked_username: String, timestamp: Timestamp) -> Self {
        ServerFrame::NewBid {
            amount: format_amount(amount),
            bidder: BidderInfo {
                id: bidder_id,
                username: masked_username,
            },
            timestamp: timestamp.to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("ServerFrame is always representable as JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bid_action_with_numeric_amount() {
        let frame: ClientFrame = serde_json::from_str(r#"{"action":"BID","amount":50.5}"#).unwrap();
        match frame {
            ClientFrame::Bid { amount } => {
                assert_eq!(amount.to_decimal().unwrap().to_string(), "50.5");
            }
            ClientFrame::Unknown => panic!("expected Bid"),
        }
    }

    #[test]
    fn parses_bid_action_with_string_amount() {
        let frame: ClientFrame = serde_json::from_str(r#"{"action":"BID","amount":"50.00"}"#).unwrap();
        match frame {
            ClientFrame::Bid { amount } => assert_eq!(amount.to_decimal().unwrap().to_string(), "50.00"),
            ClientFrame::Unknown => panic!("expected Bid"),
        }
    }

    #[test]
    fn parses_buy_now_action() {
        let frame: ClientFrame = serde_json::from_str(r#"{"action":"BUY_NOW"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::BuyNow));
    }

    #[test]
    fn unknown_action_parses_to_unknown_variant() {
        let frame: ClientFrame = serde_json::from_str(r#"{"action":"SNIPE"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Unknown));
    }

    #[test]
    fn invalid_json_fails_to_parse() {
        let result: Result<ClientFrame, _> = serde_json::from_str("not json");
        assert!(result.is_err());
    }

    #[test]
    fn new_bid_serializes_with_type_discriminator() {
        let frame = ServerFrame::error("bid must exceed current price");
        let json = frame.to_json();
        assert!(json.contains(r#""type":"ERROR""#));
        assert!(json.contains("bid must exceed current price"));
    }
}
