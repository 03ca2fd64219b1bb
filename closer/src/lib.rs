//! Auction Closer (C5, spec.md §2, §4.2).
//!
//! A periodic driver calling the closer procedure (spec.md §9: "implement
//! as a periodic driver...; do not couple to any specific task-queue
//! library"). The tick loop and its log-and-continue error policy are
//! ported from `10log10-tinylvt`'s `Scheduler`
//! (`examples/other_examples/6af9dd92_..._scheduler.rs.rs`): a
//! `tokio::time::interval` loop that never lets a single failed tick kill
//! the process.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{ArbitrationError, AuctionId, UserId};
use jiff::Timestamp;
use rand::Rng;
use storage::{AuctionStore, ClosureOutcome};
use tokio::time;
use tracing::{error, info, instrument, warn};

/// Dispatches the winner-notification side-effect spec.md §4.2 calls for,
/// with the concrete channel (email, push, ...) left as an external
/// collaborator (spec.md §9 "Open question"). `LoggingNotifier` is the
/// only implementation this crate ships; production deployments swap in
/// their own.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_winner(&self, auction_id: AuctionId, winner_id: UserId) -> Result<(), String>;
}

pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify_winner(&self, auction_id: AuctionId, winner_id: UserId) -> Result<(), String> {
        info!(%auction_id, %winner_id, "winner notification dispatched");
        Ok(())
    }
}

fn log_arbitration_error(e: ArbitrationError) -> ArbitrationError {
    error!(error = %e, "closer sweep failed");
    e
}

pub struct Closer {
    store: Arc<dyn AuctionStore>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    max_retries: u32,
}

impl Closer {
    pub fn new(
        store: Arc<dyn AuctionStore>,
        notifier: Arc<dyn Notifier>,
        interval: Duration,
        max_retries: u32,
    ) -> Self {
        Closer {
            store,
            notifier,
            interval,
            max_retries,
        }
    }

    /// Runs forever, ticking every `interval`. A failed sweep is logged and
    /// the loop continues at the next tick (spec.md §7 "the closer logs
    /// and continues; it never kills the process").
    pub async fn run(&self) {
        let mut ticker = time::interval(self.interval);
        loop {
            ticker.tick().await;
            let _ = self.sweep(Timestamp::now()).await.map_err(log_arbitration_error);
        }
    }

    /// One sweep (spec.md §4.2): transitions every `ACTIVE` auction whose
    /// `end_time < now`, then attempts a winner notification per newly
    /// `FINISHED` auction. Idempotent: a second call over an
    /// already-terminal auction returns an empty outcome list from the
    /// store, so this is a no-op (spec.md §8 "Running the Auction Closer
    /// sweep twice in succession yields the same set of status
    /// transitions").
    #[instrument(skip(self))]
    pub async fn sweep(&self, now: Timestamp) -> Result<Vec<ClosureOutcome>, ArbitrationError> {
        let outcomes = self.store.sweep_expired(now).await?;

        for outcome in &outcomes {
            if let Some(winner_id) = outcome.winner_id {
                self.notify_with_retry(outcome.auction_id, winner_id).await;
            }
        }

        Ok(outcomes)
    }

    /// At-most-`max_retries` attempts with exponential backoff and small
    /// jitter; persistent failure is logged, not propagated (spec.md §4.2
    /// "persistent failure is logged, not blocking").
    async fn notify_with_retry(&self, auction_id: AuctionId, winner_id: UserId) {
        let mut attempt = 0;
        loop {
            match self.notifier.notify_winner(auction_id, winner_id).await {
                Ok(()) => return,
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        error!(%auction_id, %winner_id, error = %e, "winner notification permanently failed");
                        return;
                    }
                    let backoff = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..50));
                    warn!(%auction_id, %winner_id, attempt, error = %e, "retrying winner notification");
                    time::sleep(backoff + jitter).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Auction, AuctionStatus, Product, User, DEFAULT_PRODUCT_CATEGORY, DEFAULT_PRODUCT_CONDITION};
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use storage::memory::MemoryStore;

    struct CountingNotifier {
        calls: AtomicU32,
        fail_until: u32,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn notify_winner(&self, _auction_id: AuctionId, _winner_id: UserId) -> Result<(), String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_until {
                Err("simulated failure".to_string())
            } else {
                Ok(())
            }
        }
    }

    struct RecordingNotifier {
        notified: Mutex<Vec<(AuctionId, UserId)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify_winner(&self, auction_id: AuctionId, winner_id: UserId) -> Result<(), String> {
            self.notified.lock().unwrap().push((auction_id, winner_id));
            Ok(())
        }
    }

    fn user(username: &str) -> User {
        User {
            id: UserId::new(),
            username: username.to_string(),
            email: format!("{username}@example.com"),
        }
    }

    /// An ACTIVE auction whose `end_time` is already in the past, ready for
    /// the sweep to close on the next call.
    fn expired_auction(owner_id: UserId) -> (Product, Auction) {
        let product = Product {
            id: domain::ProductId::new(),
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
            buy_now_price: None,
            winner_id: None,
            created_at: Timestamp::from_str("2025-12-31T00:00:00Z").unwrap(),
        };
        (product, auction)
    }

    #[tokio::test]
    async fn sweep_notifies_winner_of_finished_auction() {
        let store = Arc::new(MemoryStore::new());
        let owner = user("owner");
        let bidder = user("bidder");
        let (product, auction) = expired_auction(owner.id);
        let auction_id = auction.id;

        store.seed_user(owner, Decimal::ZERO).await;
        store.seed_user(bidder.clone(), Decimal::from_str("500.00").unwrap()).await;
        store.seed_auction(product, auction).await;

        let bid_time = Timestamp::from_str("2026-01-01T12:00:00Z").unwrap();
        store
            .place_bid(auction_id, bidder.id, Decimal::from_str("50.00").unwrap(), bid_time)
            .await
            .unwrap();

        let notifier = Arc::new(RecordingNotifier { notified: Mutex::new(Vec::new()) });
        let closer = Closer::new(store.clone(), notifier.clone(), Duration::from_secs(60), 3);

        let after_end = Timestamp::from_str("2026-01-02T00:00:01Z").unwrap();
        let outcomes = closer.sweep(after_end).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].new_status, AuctionStatus::Finished);
        assert_eq!(notifier.notified.lock().unwrap().len(), 1);

        // Idempotent: a second sweep against the same now-terminal auction is a no-op.
        let second = closer.sweep(after_end).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn notification_retries_then_succeeds() {
        let store = Arc::new(MemoryStore::new());
        let owner = user("owner");
        let bidder = user("bidder");
        let (product, auction) = expired_auction(owner.id);
        let auction_id = auction.id;

        store.seed_user(owner, Decimal::ZERO).await;
        store.seed_user(bidder.clone(), Decimal::from_str("500.00").unwrap()).await;
        store.seed_auction(product, auction).await;

        let bid_time = Timestamp::from_str("2026-01-01T12:00:00Z").unwrap();
        store
            .place_bid(auction_id, bidder.id, Decimal::from_str("50.00").unwrap(), bid_time)
            .await
            .unwrap();

        let notifier = Arc::new(CountingNotifier { calls: AtomicU32::new(0), fail_until: 2 });
        let closer = Closer::new(store, notifier.clone(), Duration::from_secs(60), 3);

        let after_end = Timestamp::from_str("2026-01-02T00:00:01Z").unwrap();
        closer.sweep(after_end).await.unwrap();
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn expiry_without_bids_sends_no_notification() {
        let store = Arc::new(MemoryStore::new());
        let owner = user("owner");
        let (product, auction) = expired_auction(owner.id);

        store.seed_user(owner, Decimal::ZERO).await;
        store.seed_auction(product, auction).await;

        let notifier = Arc::new(RecordingNotifier { notified: Mutex::new(Vec::new()) });
        let closer = Closer::new(store, notifier.clone(), Duration::from_secs(60), 3);

        let after_end = Timestamp::from_str("2026-01-02T00:00:01Z").unwrap();
        let outcomes = closer.sweep(after_end).await.unwrap();
        assert_eq!(outcomes[0].new_status, AuctionStatus::Expired);
        assert!(notifier.notified.lock().unwrap().is_empty());
    }
}
