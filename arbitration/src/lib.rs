//! Bid Arbitration Core (C4, spec.md §2, §4.1).
//!
//! `domain::rules` carries the pure decision logic and `storage::AuctionStore`
//! carries the lock-ordering/transaction mechanics (spec.md §9: "ORM-embedded
//! business rules extracted into pure transactional procedures against a
//! storage interface"). This crate is the thin seam the gateway actually
//! calls: it adds the two concerns that live above the storage boundary,
//! per spec.md §5/§7: a per-call deadline, and a small bounded retry over
//! `Transient` storage failures. Neither belongs in `storage` itself, since
//! a Postgres-specific retry there would retry the lock-wait from inside
//! the same transaction it's trying to get out of.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use domain::{ArbitrationError, AuctionId, UserId};
use jiff::Timestamp;
use rand::Rng;
use rust_decimal::Decimal;
use storage::{AuctionStore, BidOutcome};
use tokio::time;
use tracing::warn;

/// Up to this many retries of a `Transient` storage failure before it's
/// surfaced to the caller (spec.md §7: "retried up to 2 times with small
/// jitter before surfacing as 'service unavailable'").
const MAX_TRANSIENT_RETRIES: u32 = 2;

/// `placeBid`/`buyNow` (spec.md §4.1), wrapped with the deadline and retry
/// policy spec.md §5/§7 call for. Holds no state of its own beyond the
/// store handle and config, safe to share behind an `Arc` across every
/// connection a gateway process hosts.
pub struct ArbitrationCore {
    store: Arc<dyn AuctionStore>,
    bid_timeout: Duration,
}

impl ArbitrationCore {
    pub fn new(store: Arc<dyn AuctionStore>, bid_timeout: Duration) -> Self {
        ArbitrationCore { store, bid_timeout }
    }

    /// `placeBid(auction_id, user, amount)` (spec.md §4.1).
    pub async fn place_bid(
        &self,
        auction_id: AuctionId,
        bidder_id: UserId,
        amount: Decimal,
        now: Timestamp,
    ) -> Result<BidOutcome, ArbitrationError> {
        self.run_with_deadline(|| self.store.place_bid(auction_id, bidder_id, amount, now))
            .await
    }

    /// `buyNow(auction_id, user)` (spec.md §4.1 "Buy-Now variant").
    pub async fn buy_now(
        &self,
        auction_id: AuctionId,
        buyer_id: UserId,
        now: Timestamp,
    ) -> Result<BidOutcome, ArbitrationError> {
        self.run_with_deadline(|| self.store.buy_now(auction_id, buyer_id, now))
            .await
    }

    /// Enforces the per-call deadline (spec.md §6.5 `BID_TIMEOUT_MS`,
    /// default 5s) around the whole attempt, retries included. On
    /// elapsing, the in-flight transaction is left to the store's own
    /// rollback-on-drop semantics and the caller sees a literal timeout
    /// (spec.md §5 "Cancellation": "on deadline, the transaction is
    /// aborted and the client receives `{type:'ERROR', message:'timeout'}`").
    async fn run_with_deadline<F, Fut>(&self, attempt: F) -> Result<BidOutcome, ArbitrationError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<BidOutcome, ArbitrationError>>,
    {
        match time::timeout(self.bid_timeout, self.run_with_retry(attempt)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ArbitrationError::Timeout),
        }
    }

    /// At-most-`MAX_TRANSIENT_RETRIES` attempts with small jitter between
    /// them, only for `Transient` failures (spec.md §7); every other error
    /// kind is reported on the first attempt.
    async fn run_with_retry<F, Fut>(&self, attempt: F) -> Result<BidOutcome, ArbitrationError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<BidOutcome, ArbitrationError>>,
    {
        let mut tries = 0;
        loop {
            match attempt().await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_retryable() && tries < MAX_TRANSIENT_RETRIES => {
                    tries += 1;
                    let jitter_ms = rand::thread_rng().gen_range(5..30);
                    warn!(attempt = tries, error = %e, "retrying transient arbitration failure");
                    time::sleep(Duration::from_millis(jitter_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Auction, AuctionStatus, Product, ProductId, User, DEFAULT_PRODUCT_CATEGORY, DEFAULT_PRODUCT_CONDITION};
    use std::str::FromStr;
    use storage::memory::MemoryStore;

    fn user(username: &str) -> User {
        User {
            id: UserId::new(),
            username: username.to_string(),
            email: format!("{username}@example.com"),
        }
    }

    fn active_auction(owner_id: UserId) -> (Product, Auction) {
        let product = Product {
            id: ProductId::new(),
            owner_id,
            title: "Widget".to_string(),
            description: None,
            image_url: None,
            category: DEFAULT_PRODUCT_CATEGORY.to_string(),
            condition: DEFAULT_PRODUCT_CONDITION.to_string(),
        };
        let auction = Auction {
            id: AuctionId::new(),
            product_id: product.id,
            status: AuctionStatus::Active,
            start_time: Timestamp::from_str("2026-01-01T00:00:00Z").unwrap(),
            end_time: Timestamp::from_str("2026-01-02T00:00:00Z").unwrap(),
            starting_price: Decimal::from_str("10.00").unwrap(),
            current_price: Decimal::from_str("10.00").unwrap(),
            buy_now_price: Some(Decimal::from_str("500.00").unwrap()),
            winner_id: None,
            created_at: Timestamp::from_str("2025-12-31T00:00:00Z").unwrap(),
        };
        (product, auction)
    }

    #[tokio::test]
    async fn successful_bid_passes_through() {
        let store = Arc::new(MemoryStore::new());
        let owner = user("owner");
        let bidder = user("bidder");
        let (product, auction) = active_auction(owner.id);
        let auction_id = auction.id;

        store.seed_user(owner, Decimal::ZERO).await;
        store.seed_user(bidder.clone(), Decimal::from_str("500.00").unwrap()).await;
        store.seed_auction(product, auction).await;

        let core = ArbitrationCore::new(store, Duration::from_secs(5));
        let now = Timestamp::from_str("2026-01-01T01:00:00Z").unwrap();
        let outcome = core
            .place_bid(auction_id, bidder.id, Decimal::from_str("50.00").unwrap(), now)
            .await
            .unwrap();

        assert_eq!(outcome.new_price, Decimal::from_str("50.00").unwrap());
        assert_eq!(outcome.new_balance, Decimal::from_str("450.00").unwrap());
    }

    #[tokio::test]
    async fn validation_failures_are_not_retried() {
        let store = Arc::new(MemoryStore::new());
        let owner = user("owner");
        let (product, auction) = active_auction(owner.id);
        let auction_id = auction.id;

        store.seed_user(owner.clone(), Decimal::from_str("500.00").unwrap()).await;
        store.seed_auction(product, auction).await;

        let core = ArbitrationCore::new(store, Duration::from_secs(5));
        let now = Timestamp::from_str("2026-01-01T01:00:00Z").unwrap();
        let err = core
            .place_bid(auction_id, owner.id, Decimal::from_str("50.00").unwrap(), now)
            .await
            .unwrap_err();
        assert!(matches!(err, ArbitrationError::Precondition(_)));
    }

    #[tokio::test]
    async fn buy_now_closes_the_auction() {
        let store = Arc::new(MemoryStore::new());
        let owner = user("owner");
        let buyer = user("buyer");
        let (product, auction) = active_auction(owner.id);
        let auction_id = auction.id;

        store.seed_user(owner, Decimal::ZERO).await;
        store.seed_user(buyer.clone(), Decimal::from_str("1000.00").unwrap()).await;
        store.seed_auction(product, auction).await;

        let core = ArbitrationCore::new(store.clone(), Duration::from_secs(5));
        let now = Timestamp::from_str("2026-01-01T01:00:00Z").unwrap();
        let outcome = core.buy_now(auction_id, buyer.id, now).await.unwrap();

        assert_eq!(outcome.new_price, Decimal::from_str("500.00").unwrap());
        let updated = store.get_auction(auction_id).await.unwrap().unwrap();
        assert_eq!(updated.status, AuctionStatus::Finished);
        assert_eq!(updated.winner_id, Some(buyer.id));
    }
}
