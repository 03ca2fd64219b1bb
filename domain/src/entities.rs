//! Core data model (spec.md §3).
//!
//! These are storage-neutral value types: `storage::pg` maps Postgres rows
//! onto them, `storage::memory` constructs them directly, and `gateway::api`
//! serves them straight out over GraphQL for fields that are plain GraphQL
//! scalars already; money and time fields are GraphQL-opaque here (no
//! `async-graphql` scalar impl exists for `rust_decimal::Decimal` or
//! `jiff::Timestamp` without pulling in feature flags this crate doesn't
//! carry) so `gateway::api` re-shapes those into wire-format strings at
//! its own GraphQL view types rather than deriving `SimpleObject` here.

use async_graphql::{Enum, SimpleObject};
use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{AuctionId, BidId, ProductId, UserId, WalletId, WalletTransactionId, WithdrawalRequestId};

/// Created externally (out of scope: registration/session minting); this
/// crate only ever reads a `User` row, never writes one.
#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub balance: Decimal,
    pub held_balance: Decimal,
}

impl Wallet {
    /// Invariant 5 (spec.md §3): total funds preserved across hold/release.
    pub fn total(&self) -> Decimal {
        self.balance + self.held_balance
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
pub struct Product {
    pub id: ProductId,
    pub owner_id: UserId,
    pub title: String,
    pub description: Option<String>,
    /// Reference only; upload handling is out of scope (spec.md §1).
    pub image_url: Option<String>,
    /// Free-text category, filterable via `listAuctions(filters.category)`
    /// (spec.md §4.4). Kept as a plain string rather than an enum: the
    /// original catalog's category list is data, not a fixed closed set,
    /// and `AuctionFilters::category` already treats it as one.
    /// Defaults to `"OTHER"` when the seller doesn't supply one.
    pub category: String,
    /// Same shape as `category`; defaults to `"USED_GOOD"`.
    pub condition: String,
}

pub const DEFAULT_PRODUCT_CATEGORY: &str = "OTHER";
pub const DEFAULT_PRODUCT_CONDITION: &str = "USED_GOOD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuctionStatus {
    Draft,
    Active,
    Finished,
    Expired,
    Cancelled,
}

impl AuctionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AuctionStatus::Finished | AuctionStatus::Expired | AuctionStatus::Cancelled
        )
    }
}

impl std::fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuctionStatus::Draft => "DRAFT",
            AuctionStatus::Active => "ACTIVE",
            AuctionStatus::Finished => "FINISHED",
            AuctionStatus::Expired => "EXPIRED",
            AuctionStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for AuctionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(AuctionStatus::Draft),
            "ACTIVE" => Ok(AuctionStatus::Active),
            "FINISHED" => Ok(AuctionStatus::Finished),
            "EXPIRED" => Ok(AuctionStatus::Expired),
            "CANCELLED" => Ok(AuctionStatus::Cancelled),
            other => Err(format!("unknown auction status {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auction {
    pub id: AuctionId,
    pub product_id: ProductId,
    pub status: AuctionStatus,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub starting_price: Decimal,
    pub current_price: Decimal,
    pub buy_now_price: Option<Decimal>,
    pub winner_id: Option<UserId>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidTransaction {
    pub id: BidId,
    pub auction_id: AuctionId,
    pub bidder_id: UserId,
    pub amount: Decimal,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletTransactionType {
    Deposit,
    Withdraw,
    BidHold,
    BidRelease,
    Payment,
    Refund,
}

impl std::fmt::Display for WalletTransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WalletTransactionType::Deposit => "DEPOSIT",
            WalletTransactionType::Withdraw => "WITHDRAW",
            WalletTransactionType::BidHold => "BID_HOLD",
            WalletTransactionType::BidRelease => "BID_RELEASE",
            WalletTransactionType::Payment => "PAYMENT",
            WalletTransactionType::Refund => "REFUND",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for WalletTransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(WalletTransactionType::Deposit),
            "WITHDRAW" => Ok(WalletTransactionType::Withdraw),
            "BID_HOLD" => Ok(WalletTransactionType::BidHold),
            "BID_RELEASE" => Ok(WalletTransactionType::BidRelease),
            "PAYMENT" => Ok(WalletTransactionType::Payment),
            "REFUND" => Ok(WalletTransactionType::Refund),
            other => Err(format!("unknown wallet transaction type {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: WalletTransactionId,
    pub wallet_id: WalletId,
    pub transaction_type: WalletTransactionType,
    pub amount: Decimal,
    /// Weak pointer, e.g. an auction id as text: lookup-only, never an FK
    /// (spec.md §9: "reference_id as an opaque weak pointer").
    pub reference_id: Option<String>,
    pub created_at: Timestamp,
}

/// Out of scope to process (payment gateway integration), but the shape is
/// kept so the `WITHDRAW` ledger entry type is checkable in tests
/// (SPEC_FULL.md §3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: WithdrawalRequestId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub status: WithdrawalStatus,
    pub bank_details: String,
}

/// Per-user view of an auction, computed by `listMyBids` (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserBidStatus {
    Guest,
    NoBid,
    Winning,
    Outbid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MyBidSummary {
    pub auction: Auction,
    pub my_highest_bid: Decimal,
    pub user_status: UserBidStatus,
}

/// Filters accepted by `listAuctions` (spec.md §4.4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuctionFilters {
    pub status: Option<AuctionStatus>,
    pub category: Option<String>,
    pub condition: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub search: Option<String>,
    pub order_by: AuctionOrderBy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Enum)]
pub enum AuctionOrderBy {
    #[default]
    CreatedAt,
    CurrentPrice,
    EndTime,
}
