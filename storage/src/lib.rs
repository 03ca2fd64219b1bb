//! Persistent Store (C1, spec.md §2, §3, §6.4).
//!
//! `AuctionStore` is the seam SPEC_FULL.md §9 calls for: `domain::rules`
//! carries the pure decision logic, and each implementation of this trait
//! is responsible only for acquiring locks in the right order, reading rows,
//! calling those pure functions, and writing the result back inside one
//! transaction. `pg` is the production implementation; `memory` backs unit
//! tests that don't want a live Postgres/Redis pair.

pub mod error;
pub mod memory;
pub mod pg;

pub use error::StoreError;

use async_trait::async_trait;
use jiff::Timestamp;
use rust_decimal::Decimal;

use domain::{
    ArbitrationError, Auction, AuctionFilters, AuctionId, AuctionStatus, MyBidSummary, UserId, Wallet,
};

/// Result of a committed `place_bid`/`buy_now` call (spec.md §4.1 "Result").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidOutcome {
    pub new_price: Decimal,
    pub new_balance: Decimal,
    pub bidder_id: UserId,
    pub bidder_username: String,
    pub timestamp: Timestamp,
}

/// One auction's transition as decided by a closer sweep (spec.md §4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureOutcome {
    pub auction_id: AuctionId,
    pub new_status: AuctionStatus,
    pub winner_id: Option<UserId>,
}

/// Fields accepted by `createAuction` (spec.md §4.4). Product fields are
/// flattened in here rather than taking a half-built `Product`, since the
/// product row and the auction row are created together in one call.
#[derive(Debug, Clone)]
pub struct CreateAuctionInput {
    pub owner_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub condition: Option<String>,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub starting_price: Decimal,
    pub buy_now_price: Option<Decimal>,
}

/// Fields accepted by `updateAuction` (spec.md §4.4). `None` leaves a field
/// unchanged; this is a sparse patch, not a full replacement.
#[derive(Debug, Clone, Default)]
pub struct UpdateAuctionFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub condition: Option<String>,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub starting_price: Option<Decimal>,
    pub buy_now_price: Option<Decimal>,
}

/// The Persistent Store's seam (C1). Every method that touches money or
/// auction state runs its own transaction internally; callers never see a
/// partially-applied write.
#[async_trait]
pub trait AuctionStore: Send + Sync {
    /// `placeBid` (spec.md §4.1): validates, locks in `wallet -> auction ->
    /// previous-winner-wallet` order, and commits via `domain::rules::plan_bid`.
    async fn place_bid(
        &self,
        auction_id: AuctionId,
        bidder_id: UserId,
        amount: Decimal,
        now: Timestamp,
    ) -> Result<BidOutcome, ArbitrationError>;

    /// `buyNow` (spec.md §4.1 "Buy-Now variant").
    async fn buy_now(
        &self,
        auction_id: AuctionId,
        buyer_id: UserId,
        now: Timestamp,
    ) -> Result<BidOutcome, ArbitrationError>;

    /// One closer sweep (spec.md §4.2): locks and transitions every
    /// `ACTIVE` auction whose `end_time < now`, in one transaction per
    /// batch. Idempotent: a second call against already-terminal auctions
    /// returns an empty vec.
    async fn sweep_expired(&self, now: Timestamp) -> Result<Vec<ClosureOutcome>, ArbitrationError>;

    async fn create_auction(&self, input: CreateAuctionInput) -> Result<Auction, ArbitrationError>;

    /// Permitted only while `status == DRAFT` and the caller owns the
    /// product (spec.md §4.4); otherwise a `Precondition` error.
    async fn update_auction(
        &self,
        auction_id: AuctionId,
        owner_id: UserId,
        fields: UpdateAuctionFields,
    ) -> Result<Auction, ArbitrationError>;

    async fn delete_auction(&self, auction_id: AuctionId, owner_id: UserId) -> Result<(), ArbitrationError>;

    async fn get_auction(&self, auction_id: AuctionId) -> Result<Option<Auction>, ArbitrationError>;

    /// Creates the wallet with a zero balance on first reference (spec.md
    /// §3 "Wallet: created on first reference").
    async fn get_wallet(&self, user_id: UserId) -> Result<Wallet, ArbitrationError>;

    async fn list_auctions(&self, filters: AuctionFilters) -> Result<Vec<Auction>, ArbitrationError>;

    async fn list_my_bids(&self, user_id: UserId) -> Result<Vec<MyBidSummary>, ArbitrationError>;
}
