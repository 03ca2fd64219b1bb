//! In-memory `AuctionStore` for tests that don't want a live Postgres/Redis
//! pair (spec.md §9: "the storage layer is pluggable (in-memory for
//! tests)"). Single `tokio::sync::Mutex` guarding all tables, adequate for
//! unit tests exercising one call at a time, not a concurrency model to
//! imitate for `pg`.

use std::collections::HashMap;

use async_trait::async_trait;
use jiff::Timestamp;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use domain::{
    decide_closure, plan_bid, plan_buy_now, validate_bid_preconditions, ArbitrationError, Auction,
    AuctionFilters, AuctionId, AuctionOrderBy, AuctionStatus, BidId, BidTransaction, MyBidSummary,
    Product, ProductId, Refund, User, UserBidStatus, UserId, Wallet, WalletId, WalletTransaction,
    WalletTransactionType, WalletTransition, DEFAULT_PRODUCT_CATEGORY, DEFAULT_PRODUCT_CONDITION,
};

use crate::{AuctionStore, BidOutcome, ClosureOutcome, CreateAuctionInput, StoreError, UpdateAuctionFields};

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, User>,
    wallets: HashMap<UserId, Wallet>,
    products: HashMap<ProductId, Product>,
    auctions: HashMap<AuctionId, Auction>,
    bid_transactions: Vec<BidTransaction>,
    wallet_transactions: Vec<WalletTransaction>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Test helper: registers a user with a wallet seeded at `balance`.
    pub async fn seed_user(&self, user: User, balance: Decimal) {
        let mut inner = self.inner.lock().await;
        let wallet = Wallet {
            id: WalletId::new(),
            user_id: user.id,
            balance,
            held_balance: Decimal::ZERO,
        };
        inner.wallets.insert(user.id, wallet);
        inner.users.insert(user.id, user);
    }

    /// Test helper: inserts an auction (and its product) directly, bypassing
    /// `create_auction`'s DRAFT-only entry point.
    pub async fn seed_auction(&self, product: Product, auction: Auction) {
        let mut inner = self.inner.lock().await;
        inner.products.insert(product.id, product);
        inner.auctions.insert(auction.id, auction);
    }
}

fn wallet_or_zero(inner: &mut Inner, user_id: UserId) -> Wallet {
    inner
        .wallets
        .entry(user_id)
        .or_insert_with(|| Wallet {
            id: WalletId::new(),
            user_id,
            balance: Decimal::ZERO,
            held_balance: Decimal::ZERO,
        })
        .clone()
}

fn apply_transition(inner: &mut Inner, transition: &WalletTransition, bidder_id: UserId, auction_id: AuctionId, now: Timestamp, bid_type: WalletTransactionType) {
    match transition {
        WalletTransition::SameBidderRaise { delta } => {
            hold_funds(inner, bidder_id, *delta, auction_id, now, bid_type);
        }
        WalletTransition::NewWinner { refund, hold_amount } => {
            if let Some(Refund { prior_winner_id, amount }) = refund {
                release_hold(inner, *prior_winner_id, *amount, auction_id, now);
            }
            hold_funds(inner, bidder_id, *hold_amount, auction_id, now, bid_type);
        }
    }
}

fn hold_funds(inner: &mut Inner, user_id: UserId, amount: Decimal, auction_id: AuctionId, now: Timestamp, transaction_type: WalletTransactionType) {
    let wallet = inner.wallets.get_mut(&user_id).expect("wallet locked before hold");
    wallet.balance -= amount;
    wallet.held_balance += amount;
    inner.wallet_transactions.push(WalletTransaction {
        id: domain::WalletTransactionId::new(),
        wallet_id: wallet.id,
        transaction_type,
        amount,
        reference_id: Some(auction_id.to_string()),
        created_at: now,
    });
}

fn release_hold(inner: &mut Inner, user_id: UserId, amount: Decimal, auction_id: AuctionId, now: Timestamp) {
    let wallet = inner.wallets.get_mut(&user_id).expect("wallet locked before release");
    wallet.balance += amount;
    wallet.held_balance -= amount;
    inner.wallet_transactions.push(WalletTransaction {
        id: domain::WalletTransactionId::new(),
        wallet_id: wallet.id,
        transaction_type: WalletTransactionType::BidRelease,
        amount,
        reference_id: Some(auction_id.to_string()),
        created_at: now,
    });
}

#[async_trait]
impl AuctionStore for MemoryStore {
    async fn place_bid(
        &self,
        auction_id: AuctionId,
        bidder_id: UserId,
        amount: Decimal,
        now: Timestamp,
    ) -> Result<BidOutcome, ArbitrationError> {
        let mut inner = self.inner.lock().await;

        let wallet_balance = wallet_or_zero(&mut inner, bidder_id).balance;

        let auction = inner
            .auctions
            .get(&auction_id)
            .cloned()
            .ok_or(StoreError::AuctionNotFound)?;
        let owner_id = inner
            .products
            .get(&auction.product_id)
            .map(|p| p.owner_id)
            .ok_or(StoreError::AuctionNotFound)?;

        validate_bid_preconditions(&auction, owner_id, bidder_id, amount, now).map_err(StoreError::from)?;
        let plan = plan_bid(&auction, bidder_id, amount, wallet_balance).map_err(StoreError::from)?;

        apply_transition(&mut inner, &plan.transition, bidder_id, auction_id, now, WalletTransactionType::BidHold);

        inner.bid_transactions.push(BidTransaction {
            id: BidId::new(),
            auction_id,
            bidder_id,
            amount,
            created_at: now,
        });

        let auction = inner.auctions.get_mut(&auction_id).expect("auction locked above");
        auction.current_price = amount;
        auction.winner_id = Some(bidder_id);

        let new_balance = inner.wallets.get(&bidder_id).expect("wallet seeded above").balance;
        let bidder_username = inner
            .users
            .get(&bidder_id)
            .map(|u| u.username.clone())
            .unwrap_or_default();

        Ok(BidOutcome {
            new_price: amount,
            new_balance,
            bidder_id,
            bidder_username,
            timestamp: now,
        })
    }

    async fn buy_now(
        &self,
        auction_id: AuctionId,
        buyer_id: UserId,
        now: Timestamp,
    ) -> Result<BidOutcome, ArbitrationError> {
        let mut inner = self.inner.lock().await;

        let wallet_balance = wallet_or_zero(&mut inner, buyer_id).balance;

        let auction = inner
            .auctions
            .get(&auction_id)
            .cloned()
            .ok_or(StoreError::AuctionNotFound)?;
        let owner_id = inner
            .products
            .get(&auction.product_id)
            .map(|p| p.owner_id)
            .ok_or(StoreError::AuctionNotFound)?;

        let plan = plan_buy_now(&auction, owner_id, buyer_id, wallet_balance).map_err(StoreError::from)?;

        apply_transition(&mut inner, &plan.transition, buyer_id, auction_id, now, WalletTransactionType::Payment);

        inner.bid_transactions.push(BidTransaction {
            id: BidId::new(),
            auction_id,
            bidder_id: buyer_id,
            amount: plan.new_price,
            created_at: now,
        });

        let auction = inner.auctions.get_mut(&auction_id).expect("auction locked above");
        auction.current_price = plan.new_price;
        auction.winner_id = Some(buyer_id);
        auction.status = AuctionStatus::Finished;
        auction.end_time = now;

        let new_balance = inner.wallets.get(&buyer_id).expect("wallet seeded above").balance;
        let bidder_username = inner
            .users
            .get(&buyer_id)
            .map(|u| u.username.clone())
            .unwrap_or_default();

        Ok(BidOutcome {
            new_price: plan.new_price,
            new_balance,
            bidder_id: buyer_id,
            bidder_username,
            timestamp: now,
        })
    }

    async fn sweep_expired(&self, now: Timestamp) -> Result<Vec<ClosureOutcome>, ArbitrationError> {
        let mut inner = self.inner.lock().await;
        let mut outcomes = Vec::new();

        let candidate_ids: Vec<AuctionId> = inner.auctions.keys().copied().collect();
        for id in candidate_ids {
            let auction = inner.auctions.get(&id).expect("id came from this map");
            let Some(new_status) = decide_closure(auction, now) else {
                continue;
            };
            let winner_id = if new_status == AuctionStatus::Finished {
                auction.winner_id
            } else {
                None
            };
            inner.auctions.get_mut(&id).unwrap().status = new_status;
            outcomes.push(ClosureOutcome {
                auction_id: id,
                new_status,
                winner_id,
            });
        }

        Ok(outcomes)
    }

    async fn create_auction(&self, input: CreateAuctionInput) -> Result<Auction, ArbitrationError> {
        let mut inner = self.inner.lock().await;

        let product = Product {
            id: ProductId::new(),
            owner_id: input.owner_id,
            title: input.title,
            description: input.description,
            image_url: input.image_url,
            category: input.category.unwrap_or_else(|| DEFAULT_PRODUCT_CATEGORY.to_string()),
            condition: input.condition.unwrap_or_else(|| DEFAULT_PRODUCT_CONDITION.to_string()),
        };

        let auction = Auction {
            id: AuctionId::new(),
            product_id: product.id,
            status: AuctionStatus::Draft,
            start_time: input.start_time,
            end_time: input.end_time,
            starting_price: input.starting_price,
            current_price: input.starting_price,
            buy_now_price: input.buy_now_price,
            winner_id: None,
            created_at: now_placeholder(),
        };

        inner.products.insert(product.id, product);
        inner.auctions.insert(auction.id, auction.clone());
        Ok(auction)
    }

    async fn update_auction(
        &self,
        auction_id: AuctionId,
        owner_id: UserId,
        fields: UpdateAuctionFields,
    ) -> Result<Auction, ArbitrationError> {
        let mut inner = self.inner.lock().await;

        let auction = inner
            .auctions
            .get(&auction_id)
            .cloned()
            .ok_or(StoreError::AuctionNotFound)?;
        let product = inner
            .products
            .get(&auction.product_id)
            .cloned()
            .ok_or(StoreError::AuctionNotFound)?;

        if product.owner_id != owner_id {
            return Err(StoreError::PermissionDenied(
                "only the owning product's user may modify this auction".to_string(),
            )
            .into());
        }
        if auction.status != AuctionStatus::Draft {
            return Err(StoreError::Validation("only DRAFT auctions may be updated".to_string()).into());
        }

        let mut product = product;
        if let Some(title) = fields.title {
            product.title = title;
        }
        if fields.description.is_some() {
            product.description = fields.description;
        }
        if fields.image_url.is_some() {
            product.image_url = fields.image_url;
        }
        if let Some(category) = fields.category {
            product.category = category;
        }
        if let Some(condition) = fields.condition {
            product.condition = condition;
        }

        let mut auction = auction;
        if let Some(start_time) = fields.start_time {
            auction.start_time = start_time;
        }
        if let Some(end_time) = fields.end_time {
            auction.end_time = end_time;
        }
        if let Some(starting_price) = fields.starting_price {
            auction.starting_price = starting_price;
            auction.current_price = starting_price;
        }
        if fields.buy_now_price.is_some() {
            auction.buy_now_price = fields.buy_now_price;
        }

        inner.products.insert(product.id, product);
        inner.auctions.insert(auction.id, auction.clone());
        Ok(auction)
    }

    async fn delete_auction(&self, auction_id: AuctionId, owner_id: UserId) -> Result<(), ArbitrationError> {
        let mut inner = self.inner.lock().await;

        let auction = inner
            .auctions
            .get(&auction_id)
            .cloned()
            .ok_or(StoreError::AuctionNotFound)?;
        let owner_matches = inner
            .products
            .get(&auction.product_id)
            .map(|p| p.owner_id == owner_id)
            .unwrap_or(false);

        if !owner_matches {
            return Err(StoreError::PermissionDenied(
                "only the owning product's user may delete this auction".to_string(),
            )
            .into());
        }
        if auction.status != AuctionStatus::Draft {
            return Err(StoreError::Validation("only DRAFT auctions may be deleted".to_string()).into());
        }

        inner.auctions.remove(&auction_id);
        inner.products.remove(&auction.product_id);
        Ok(())
    }

    async fn get_auction(&self, auction_id: AuctionId) -> Result<Option<Auction>, ArbitrationError> {
        let inner = self.inner.lock().await;
        Ok(inner.auctions.get(&auction_id).cloned())
    }

    async fn get_wallet(&self, user_id: UserId) -> Result<Wallet, ArbitrationError> {
        let mut inner = self.inner.lock().await;
        Ok(wallet_or_zero(&mut inner, user_id))
    }

    async fn list_auctions(&self, filters: AuctionFilters) -> Result<Vec<Auction>, ArbitrationError> {
        let inner = self.inner.lock().await;

        let mut results: Vec<Auction> = inner
            .auctions
            .values()
            .filter(|a| a.status != AuctionStatus::Draft)
            .filter(|a| filters.status.map(|s| s == a.status).unwrap_or(true))
            .filter(|a| {
                filters
                    .min_price
                    .map(|min| a.current_price >= min)
                    .unwrap_or(true)
            })
            .filter(|a| {
                filters
                    .max_price
                    .map(|max| a.current_price <= max)
                    .unwrap_or(true)
            })
            .filter(|a| {
                let Some(product) = inner.products.get(&a.product_id) else {
                    return false;
                };
                let category_ok = filters
                    .category
                    .as_ref()
                    .map(|c| &product.category == c)
                    .unwrap_or(true);
                let condition_ok = filters
                    .condition
                    .as_ref()
                    .map(|c| &product.condition == c)
                    .unwrap_or(true);
                let search_ok = filters
                    .search
                    .as_ref()
                    .map(|needle| {
                        let needle = needle.to_lowercase();
                        product.title.to_lowercase().contains(&needle)
                            || product
                                .description
                                .as_deref()
                                .map(|d| d.to_lowercase().contains(&needle))
                                .unwrap_or(false)
                    })
                    .unwrap_or(true);
                category_ok && condition_ok && search_ok
            })
            .cloned()
            .collect();

        match filters.order_by {
            AuctionOrderBy::CreatedAt => results.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            AuctionOrderBy::CurrentPrice => results.sort_by(|a, b| b.current_price.cmp(&a.current_price)),
            AuctionOrderBy::EndTime => results.sort_by(|a, b| b.end_time.cmp(&a.end_time)),
        }

        Ok(results)
    }

    async fn list_my_bids(&self, user_id: UserId) -> Result<Vec<MyBidSummary>, ArbitrationError> {
        let inner = self.inner.lock().await;

        let mut highest: HashMap<AuctionId, Decimal> = HashMap::new();
        for bid in inner.bid_transactions.iter().filter(|b| b.bidder_id == user_id) {
            highest
                .entry(bid.auction_id)
                .and_modify(|existing| {
                    if bid.amount > *existing {
                        *existing = bid.amount;
                    }
                })
                .or_insert(bid.amount);
        }

        let mut summaries: Vec<MyBidSummary> = highest
            .into_iter()
            .filter_map(|(auction_id, my_highest_bid)| {
                let auction = inner.auctions.get(&auction_id)?.clone();
                let user_status = if my_highest_bid >= auction.current_price {
                    UserBidStatus::Winning
                } else {
                    UserBidStatus::Outbid
                };
                Some(MyBidSummary {
                    auction,
                    my_highest_bid,
                    user_status,
                })
            })
            .collect();

        summaries.sort_by(|a, b| b.auction.created_at.cmp(&a.auction.created_at));
        Ok(summaries)
    }
}

fn now_placeholder() -> Timestamp {
    Timestamp::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn user(username: &str) -> User {
        User {
            id: UserId::new(),
            username: username.to_string(),
            email: format!("{username}@example.com"),
        }
    }

    fn active_auction(owner_id: UserId, current: &str, starting: &str) -> (Product, Auction) {
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
            starting_price: Decimal::from_str(starting).unwrap(),
            current_price: Decimal::from_str(current).unwrap(),
            buy_now_price: Some(Decimal::from_str("500.00").unwrap()),
            winner_id: None,
            created_at: Timestamp::from_str("2025-12-31T00:00:00Z").unwrap(),
        };
        (product, auction)
    }

    #[tokio::test]
    async fn simple_raise_moves_funds_and_updates_auction() {
        let store = MemoryStore::new();
        let owner = user("owner");
        let bidder = user("bidder");
        let (product, auction) = active_auction(owner.id, "10.00", "10.00");
        let auction_id = auction.id;

        store.seed_user(owner, Decimal::ZERO).await;
        store.seed_user(bidder.clone(), Decimal::from_str("500.00").unwrap()).await;
        store.seed_auction(product, auction).await;

        let now = Timestamp::from_str("2026-01-01T01:00:00Z").unwrap();
        let outcome = store
            .place_bid(auction_id, bidder.id, Decimal::from_str("50.00").unwrap(), now)
            .await
            .unwrap();

        assert_eq!(outcome.new_price, Decimal::from_str("50.00").unwrap());
        assert_eq!(outcome.new_balance, Decimal::from_str("450.00").unwrap());

        let updated = store.get_auction(auction_id).await.unwrap().unwrap();
        assert_eq!(updated.current_price, Decimal::from_str("50.00").unwrap());
        assert_eq!(updated.winner_id, Some(bidder.id));
    }

    #[tokio::test]
    async fn outbid_refunds_prior_winner() {
        let store = MemoryStore::new();
        let owner = user("owner");
        let b1 = user("b1");
        let b2 = user("b2");
        let (product, auction) = active_auction(owner.id, "10.00", "10.00");
        let auction_id = auction.id;

        store.seed_user(owner, Decimal::ZERO).await;
        store.seed_user(b1.clone(), Decimal::from_str("500.00").unwrap()).await;
        store.seed_user(b2.clone(), Decimal::from_str("500.00").unwrap()).await;
        store.seed_auction(product, auction).await;

        let now = Timestamp::from_str("2026-01-01T01:00:00Z").unwrap();
        store
            .place_bid(auction_id, b1.id, Decimal::from_str("50.00").unwrap(), now)
            .await
            .unwrap();
        let outcome = store
            .place_bid(auction_id, b2.id, Decimal::from_str("100.00").unwrap(), now)
            .await
            .unwrap();

        assert_eq!(outcome.new_balance, Decimal::from_str("400.00").unwrap());

        let b1_wallet = store.get_wallet(b1.id).await.unwrap();
        assert_eq!(b1_wallet.balance, Decimal::from_str("500.00").unwrap());
        assert_eq!(b1_wallet.held_balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn owner_cannot_bid_on_own_auction() {
        let store = MemoryStore::new();
        let owner = user("owner");
        let (product, auction) = active_auction(owner.id, "10.00", "10.00");
        let auction_id = auction.id;

        store.seed_user(owner.clone(), Decimal::from_str("500.00").unwrap()).await;
        store.seed_auction(product, auction).await;

        let now = Timestamp::from_str("2026-01-01T01:00:00Z").unwrap();
        let err = store
            .place_bid(auction_id, owner.id, Decimal::from_str("50.00").unwrap(), now)
            .await
            .unwrap_err();
        assert!(matches!(err, ArbitrationError::Precondition(_)));
    }

    #[tokio::test]
    async fn sweep_finishes_auction_with_bids_and_is_idempotent() {
        let store = MemoryStore::new();
        let owner = user("owner");
        let bidder = user("bidder");
        let (product, auction) = active_auction(owner.id, "10.00", "10.00");
        let auction_id = auction.id;

        store.seed_user(owner, Decimal::ZERO).await;
        store.seed_user(bidder.clone(), Decimal::from_str("500.00").unwrap()).await;
        store.seed_auction(product, auction).await;

        let bid_time = Timestamp::from_str("2026-01-01T01:00:00Z").unwrap();
        store
            .place_bid(auction_id, bidder.id, Decimal::from_str("50.00").unwrap(), bid_time)
            .await
            .unwrap();

        let after_end = Timestamp::from_str("2026-01-02T00:00:01Z").unwrap();
        let outcomes = store.sweep_expired(after_end).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].new_status, AuctionStatus::Finished);

        let second_pass = store.sweep_expired(after_end).await.unwrap();
        assert!(second_pass.is_empty());
    }
}
