//! Postgres implementation of `AuctionStore` (C1, spec.md §6.4).
//!
//! Mirrors the `_tx`-suffixed transaction/pool split and `FromRow` +
//! `TryFrom` row-mapping style of `10log10-tinylvt`'s `store/currency.rs`:
//! every mutating operation begins a transaction, locks rows with `SELECT
//! ... FOR UPDATE` in the order spec.md §5 mandates, calls into
//! `domain::rules` to decide what to write, and commits.

use async_trait::async_trait;
use jiff::Timestamp;
use jiff_sqlx::{Timestamp as SqlxTs, ToSqlx};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use domain::{
    decide_closure, plan_bid, plan_buy_now, validate_bid_preconditions, Auction, AuctionFilters,
    AuctionId, AuctionOrderBy, AuctionStatus, ArbitrationError, BidId, MyBidSummary, ProductId,
    Refund, UserBidStatus, UserId, Wallet, WalletId, WalletTransactionType, WalletTransition,
    DEFAULT_PRODUCT_CATEGORY, DEFAULT_PRODUCT_CONDITION,
};

use crate::error::StoreError;
use crate::{AuctionStore, BidOutcome, ClosureOutcome, CreateAuctionInput, UpdateAuctionFields};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct DbWallet {
    id: WalletId,
    user_id: UserId,
    balance: Decimal,
    held_balance: Decimal,
}

impl From<DbWallet> for Wallet {
    fn from(db: DbWallet) -> Self {
        Wallet {
            id: db.id,
            user_id: db.user_id,
            balance: db.balance,
            held_balance: db.held_balance,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct DbAuction {
    id: AuctionId,
    product_id: ProductId,
    status: String,
    #[sqlx(try_from = "SqlxTs")]
    start_time: Timestamp,
    #[sqlx(try_from = "SqlxTs")]
    end_time: Timestamp,
    starting_price: Decimal,
    current_price: Decimal,
    buy_now_price: Option<Decimal>,
    winner_id: Option<UserId>,
    #[sqlx(try_from = "SqlxTs")]
    created_at: Timestamp,
}

impl TryFrom<DbAuction> for Auction {
    type Error = StoreError;

    fn try_from(db: DbAuction) -> Result<Self, StoreError> {
        Ok(Auction {
            id: db.id,
            product_id: db.product_id,
            status: db
                .status
                .parse()
                .map_err(|e: String| StoreError::Validation(e))?,
            start_time: db.start_time,
            end_time: db.end_time,
            starting_price: db.starting_price,
            current_price: db.current_price,
            buy_now_price: db.buy_now_price,
            winner_id: db.winner_id,
            created_at: db.created_at,
        })
    }
}

const AUCTION_COLUMNS: &str = "a.id, a.product_id, a.status, a.start_time, a.end_time, \
     a.starting_price, a.current_price, a.buy_now_price, a.winner_id, a.created_at";

const AUCTION_COLUMNS_BARE: &str = "id, product_id, status, start_time, end_time, \
     starting_price, current_price, buy_now_price, winner_id, created_at";

async fn get_or_create_wallet_for_update_tx(
    user_id: UserId,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<DbWallet, StoreError> {
    sqlx::query(
        r#"INSERT INTO wallets (user_id, balance, held_balance) VALUES ($1, 0, 0)
           ON CONFLICT (user_id) DO NOTHING"#,
    )
    .bind(user_id)
    .execute(&mut **tx)
    .await?;

    sqlx::query_as::<_, DbWallet>(
        r#"SELECT id, user_id, balance, held_balance FROM wallets WHERE user_id = $1 FOR UPDATE"#,
    )
    .bind(user_id)
    .fetch_one(&mut **tx)
    .await
    .map_err(StoreError::from)
}

async fn get_auction_with_owner_for_update_tx(
    auction_id: AuctionId,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<Option<(DbAuction, UserId)>, StoreError> {
    #[derive(sqlx::FromRow)]
    struct Row {
        #[sqlx(flatten)]
        auction: DbAuction,
        owner_id: UserId,
    }

    let row = sqlx::query_as::<_, Row>(&format!(
        "SELECT {AUCTION_COLUMNS}, p.owner_id \
         FROM auctions a JOIN products p ON a.product_id = p.id \
         WHERE a.id = $1 FOR UPDATE OF a"
    ))
    .bind(auction_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.map(|r| (r.auction, r.owner_id)))
}

async fn username_tx(user_id: UserId, tx: &mut Transaction<'_, Postgres>) -> Result<String, StoreError> {
    let username: String = sqlx::query_scalar("SELECT username FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(StoreError::from)?;
    Ok(username)
}

async fn apply_wallet_delta_tx(
    wallet_id: WalletId,
    balance_delta: Decimal,
    held_delta: Decimal,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE wallets SET balance = balance + $1, held_balance = held_balance + $2 WHERE id = $3",
    )
    .bind(balance_delta)
    .bind(held_delta)
    .bind(wallet_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_wallet_transaction_tx(
    wallet_id: WalletId,
    transaction_type: WalletTransactionType,
    amount: Decimal,
    reference_id: Option<String>,
    now: Timestamp,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"INSERT INTO wallet_transactions (wallet_id, transaction_type, amount, reference_id, created_at)
           VALUES ($1, $2, $3, $4, $5)"#,
    )
    .bind(wallet_id)
    .bind(transaction_type.to_string())
    .bind(amount)
    .bind(reference_id)
    .bind(now.to_sqlx())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Moves `amount` from `balance` to `held_balance` and appends an audit
/// entry of the given type (`BID_HOLD` for a normal bid, `PAYMENT` for
/// buy-now, per spec.md §4.1).
async fn hold_funds_tx(
    wallet_id: WalletId,
    amount: Decimal,
    reference_id: AuctionId,
    transaction_type: WalletTransactionType,
    now: Timestamp,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<(), StoreError> {
    apply_wallet_delta_tx(wallet_id, -amount, amount, tx).await?;
    insert_wallet_transaction_tx(wallet_id, transaction_type, amount, Some(reference_id.to_string()), now, tx).await
}

/// Moves `amount` from `held_balance` back to `balance` and appends a
/// `BID_RELEASE` entry (spec.md §4.1 step 3).
async fn release_hold_tx(
    wallet_id: WalletId,
    amount: Decimal,
    reference_id: AuctionId,
    now: Timestamp,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<(), StoreError> {
    apply_wallet_delta_tx(wallet_id, amount, -amount, tx).await?;
    insert_wallet_transaction_tx(
        wallet_id,
        WalletTransactionType::BidRelease,
        amount,
        Some(reference_id.to_string()),
        now,
        tx,
    )
    .await
}

async fn apply_transition_tx(
    transition: &WalletTransition,
    bidder_wallet_id: WalletId,
    auction_id: AuctionId,
    bid_type: WalletTransactionType,
    now: Timestamp,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<(), StoreError> {
    match transition {
        WalletTransition::SameBidderRaise { delta } => {
            hold_funds_tx(bidder_wallet_id, *delta, auction_id, bid_type, now, tx).await
        }
        WalletTransition::NewWinner { refund, hold_amount } => {
            if let Some(Refund { prior_winner_id, amount }) = refund {
                let prior_wallet = get_or_create_wallet_for_update_tx(*prior_winner_id, tx).await?;
                release_hold_tx(prior_wallet.id, *amount, auction_id, now, tx).await?;
            }
            hold_funds_tx(bidder_wallet_id, *hold_amount, auction_id, bid_type, now, tx).await
        }
    }
}

async fn insert_bid_transaction_tx(
    auction_id: AuctionId,
    bidder_id: UserId,
    amount: Decimal,
    now: Timestamp,
    tx: &mut Transaction<'_, Postgres>,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"INSERT INTO bid_transactions (id, auction_id, bidder_id, amount, created_at)
           VALUES ($1, $2, $3, $4, $5)"#,
    )
    .bind(BidId::new())
    .bind(auction_id)
    .bind(bidder_id)
    .bind(amount)
    .bind(now.to_sqlx())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl AuctionStore for PgStore {
    #[tracing::instrument(skip(self))]
    async fn place_bid(
        &self,
        auction_id: AuctionId,
        bidder_id: UserId,
        amount: Decimal,
        now: Timestamp,
    ) -> Result<BidOutcome, ArbitrationError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let bidder_wallet = get_or_create_wallet_for_update_tx(bidder_id, &mut tx).await?;

        let (db_auction, owner_id) = get_auction_with_owner_for_update_tx(auction_id, &mut tx)
            .await?
            .ok_or(StoreError::AuctionNotFound)?;
        let auction: Auction = db_auction.try_into()?;

        validate_bid_preconditions(&auction, owner_id, bidder_id, amount, now)
            .map_err(StoreError::from)?;
        let plan = plan_bid(&auction, bidder_id, amount, bidder_wallet.balance).map_err(StoreError::from)?;

        apply_transition_tx(
            &plan.transition,
            bidder_wallet.id,
            auction_id,
            WalletTransactionType::BidHold,
            now,
            &mut tx,
        )
        .await?;

        insert_bid_transaction_tx(auction_id, bidder_id, amount, now, &mut tx).await?;

        sqlx::query("UPDATE auctions SET current_price = $1, winner_id = $2 WHERE id = $3")
            .bind(amount)
            .bind(bidder_id)
            .bind(auction_id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;

        let new_balance: Decimal = sqlx::query_scalar("SELECT balance FROM wallets WHERE id = $1")
            .bind(bidder_wallet.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(StoreError::from)?;

        let bidder_username = username_tx(bidder_id, &mut tx).await?;

        tx.commit().await.map_err(StoreError::from)?;

        Ok(BidOutcome {
            new_price: amount,
            new_balance,
            bidder_id,
            bidder_username,
            timestamp: now,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn buy_now(
        &self,
        auction_id: AuctionId,
        buyer_id: UserId,
        now: Timestamp,
    ) -> Result<BidOutcome, ArbitrationError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let buyer_wallet = get_or_create_wallet_for_update_tx(buyer_id, &mut tx).await?;

        let (db_auction, owner_id) = get_auction_with_owner_for_update_tx(auction_id, &mut tx)
            .await?
            .ok_or(StoreError::AuctionNotFound)?;
        let auction: Auction = db_auction.try_into()?;

        let plan = plan_buy_now(&auction, owner_id, buyer_id, buyer_wallet.balance).map_err(StoreError::from)?;

        apply_transition_tx(
            &plan.transition,
            buyer_wallet.id,
            auction_id,
            WalletTransactionType::Payment,
            now,
            &mut tx,
        )
        .await?;

        insert_bid_transaction_tx(auction_id, buyer_id, plan.new_price, now, &mut tx).await?;

        sqlx::query(
            "UPDATE auctions SET current_price = $1, winner_id = $2, status = 'FINISHED', end_time = $3 WHERE id = $4",
        )
        .bind(plan.new_price)
        .bind(buyer_id)
        .bind(now.to_sqlx())
        .bind(auction_id)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        let new_balance: Decimal = sqlx::query_scalar("SELECT balance FROM wallets WHERE id = $1")
            .bind(buyer_wallet.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(StoreError::from)?;

        let bidder_username = username_tx(buyer_id, &mut tx).await?;

        tx.commit().await.map_err(StoreError::from)?;

        Ok(BidOutcome {
            new_price: plan.new_price,
            new_balance,
            bidder_id: buyer_id,
            bidder_username,
            timestamp: now,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn sweep_expired(&self, now: Timestamp) -> Result<Vec<ClosureOutcome>, ArbitrationError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let expired = sqlx::query_as::<_, DbAuction>(&format!(
            "SELECT {AUCTION_COLUMNS} FROM auctions a \
             WHERE a.status = 'ACTIVE' AND a.end_time < $1 FOR UPDATE OF a"
        ))
        .bind(now.to_sqlx())
        .fetch_all(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        let mut outcomes = Vec::with_capacity(expired.len());
        for db_auction in expired {
            let auction: Auction = db_auction.try_into()?;
            let Some(new_status) = decide_closure(&auction, now) else {
                continue;
            };

            sqlx::query("UPDATE auctions SET status = $1 WHERE id = $2")
                .bind(new_status.to_string())
                .bind(auction.id)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::from)?;

            outcomes.push(ClosureOutcome {
                auction_id: auction.id,
                new_status,
                winner_id: if new_status == AuctionStatus::Finished {
                    auction.winner_id
                } else {
                    None
                },
            });
        }

        tx.commit().await.map_err(StoreError::from)?;
        Ok(outcomes)
    }

    async fn create_auction(&self, input: CreateAuctionInput) -> Result<Auction, ArbitrationError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let product_id = ProductId::new();
        sqlx::query(
            r#"INSERT INTO products (id, owner_id, title, description, image_url, category, condition)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(product_id)
        .bind(input.owner_id)
        .bind(&input.title)
        .bind(&input.description)
        .bind(&input.image_url)
        .bind(input.category.as_deref().unwrap_or(DEFAULT_PRODUCT_CATEGORY))
        .bind(input.condition.as_deref().unwrap_or(DEFAULT_PRODUCT_CONDITION))
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        let auction_id = AuctionId::new();
        let created_at = jiff::Timestamp::now();
        let db_auction = sqlx::query_as::<_, DbAuction>(&format!(
            r#"INSERT INTO auctions
                 (id, product_id, status, start_time, end_time, starting_price, current_price, buy_now_price, winner_id, created_at)
               VALUES ($1, $2, 'DRAFT', $3, $4, $5, $5, $6, NULL, $7)
               RETURNING {AUCTION_COLUMNS_BARE}"#
        ))
        .bind(auction_id)
        .bind(product_id)
        .bind(input.start_time.to_sqlx())
        .bind(input.end_time.to_sqlx())
        .bind(input.starting_price)
        .bind(input.buy_now_price)
        .bind(created_at.to_sqlx())
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        tx.commit().await.map_err(StoreError::from)?;
        Ok(db_auction.try_into()?)
    }

    async fn update_auction(
        &self,
        auction_id: AuctionId,
        owner_id: UserId,
        fields: UpdateAuctionFields,
    ) -> Result<Auction, ArbitrationError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let (db_auction, actual_owner) = get_auction_with_owner_for_update_tx(auction_id, &mut tx)
            .await?
            .ok_or(StoreError::AuctionNotFound)?;
        let auction: Auction = db_auction.try_into()?;

        if actual_owner != owner_id {
            return Err(StoreError::PermissionDenied(
                "only the owning product's user may modify this auction".to_string(),
            )
            .into());
        }
        if auction.status != AuctionStatus::Draft {
            return Err(StoreError::Validation(
                "only DRAFT auctions may be updated".to_string(),
            )
            .into());
        }

        if fields.title.is_some() || fields.description.is_some() || fields.image_url.is_some()
            || fields.category.is_some() || fields.condition.is_some()
        {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE products SET ");
            let mut first = true;
            macro_rules! set_field {
                ($col:literal, $val:expr) => {
                    if let Some(v) = $val {
                        if !first {
                            qb.push(", ");
                        }
                        qb.push(concat!($col, " = "));
                        qb.push_bind(v);
                        first = false;
                    }
                };
            }
            set_field!("title", fields.title.clone());
            set_field!("description", fields.description.clone());
            set_field!("image_url", fields.image_url.clone());
            set_field!("category", fields.category.clone());
            set_field!("condition", fields.condition.clone());
            qb.push(" WHERE id = ");
            qb.push_bind(auction.product_id);
            qb.build().execute(&mut *tx).await.map_err(StoreError::from)?;
        }

        let new_starting_price = fields.starting_price.unwrap_or(auction.starting_price);
        let new_current_price = fields.starting_price.unwrap_or(auction.current_price);
        sqlx::query(
            "UPDATE auctions SET start_time = $1, end_time = $2, starting_price = $3, current_price = $4, buy_now_price = $5 WHERE id = $6",
        )
        .bind(fields.start_time.unwrap_or(auction.start_time).to_sqlx())
        .bind(fields.end_time.unwrap_or(auction.end_time).to_sqlx())
        .bind(new_starting_price)
        .bind(new_current_price)
        .bind(fields.buy_now_price.or(auction.buy_now_price))
        .bind(auction_id)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        let updated: DbAuction = sqlx::query_as(&format!(
            "SELECT {AUCTION_COLUMNS} FROM auctions a WHERE a.id = $1"
        ))
        .bind(auction_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        tx.commit().await.map_err(StoreError::from)?;
        Ok(updated.try_into()?)
    }

    async fn delete_auction(&self, auction_id: AuctionId, owner_id: UserId) -> Result<(), ArbitrationError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let (db_auction, actual_owner) = get_auction_with_owner_for_update_tx(auction_id, &mut tx)
            .await?
            .ok_or(StoreError::AuctionNotFound)?;
        let auction: Auction = db_auction.try_into()?;

        if actual_owner != owner_id {
            return Err(StoreError::PermissionDenied(
                "only the owning product's user may delete this auction".to_string(),
            )
            .into());
        }
        if auction.status != AuctionStatus::Draft {
            return Err(StoreError::Validation(
                "only DRAFT auctions may be deleted".to_string(),
            )
            .into());
        }

        sqlx::query("DELETE FROM auctions WHERE id = $1")
            .bind(auction_id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;
        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(auction.product_id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;

        tx.commit().await.map_err(StoreError::from)?;
        Ok(())
    }

    async fn get_auction(&self, auction_id: AuctionId) -> Result<Option<Auction>, ArbitrationError> {
        let row = sqlx::query_as::<_, DbAuction>(&format!(
            "SELECT {AUCTION_COLUMNS} FROM auctions a WHERE a.id = $1"
        ))
        .bind(auction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        row.map(Auction::try_from).transpose().map_err(Into::into)
    }

    async fn get_wallet(&self, user_id: UserId) -> Result<Wallet, ArbitrationError> {
        sqlx::query(
            "INSERT INTO wallets (user_id, balance, held_balance) VALUES ($1, 0, 0) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        let db_wallet = sqlx::query_as::<_, DbWallet>(
            "SELECT id, user_id, balance, held_balance FROM wallets WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(db_wallet.into())
    }

    async fn list_auctions(&self, filters: AuctionFilters) -> Result<Vec<Auction>, ArbitrationError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {AUCTION_COLUMNS} FROM auctions a JOIN products p ON a.product_id = p.id WHERE a.status != 'DRAFT'"
        ));

        if let Some(status) = filters.status {
            qb.push(" AND a.status = ").push_bind(status.to_string());
        }
        if let Some(category) = &filters.category {
            qb.push(" AND p.category = ").push_bind(category.clone());
        }
        if let Some(condition) = &filters.condition {
            qb.push(" AND p.condition = ").push_bind(condition.clone());
        }
        if let Some(min_price) = filters.min_price {
            qb.push(" AND a.current_price >= ").push_bind(min_price);
        }
        if let Some(max_price) = filters.max_price {
            qb.push(" AND a.current_price <= ").push_bind(max_price);
        }
        if let Some(search) = &filters.search {
            let pattern = format!("%{search}%");
            qb.push(" AND (p.title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR p.description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }

        let order_column = match filters.order_by {
            AuctionOrderBy::CreatedAt => "a.created_at",
            AuctionOrderBy::CurrentPrice => "a.current_price",
            AuctionOrderBy::EndTime => "a.end_time",
        };
        qb.push(format!(" ORDER BY {order_column} DESC"));

        let rows: Vec<DbAuction> = qb.build_query_as().fetch_all(&self.pool).await.map_err(StoreError::from)?;
        rows.into_iter()
            .map(Auction::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    async fn list_my_bids(&self, user_id: UserId) -> Result<Vec<MyBidSummary>, ArbitrationError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            #[sqlx(flatten)]
            auction: DbAuction,
            my_highest_bid: Decimal,
        }

        let rows: Vec<Row> = sqlx::query_as(&format!(
            "SELECT {AUCTION_COLUMNS}, MAX(b.amount) AS my_highest_bid \
             FROM auctions a JOIN bid_transactions b ON b.auction_id = a.id \
             WHERE b.bidder_id = $1 \
             GROUP BY a.id \
             ORDER BY a.created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        rows.into_iter()
            .map(|row| {
                let auction: Auction = row.auction.try_into()?;
                let user_status = if row.my_highest_bid >= auction.current_price {
                    UserBidStatus::Winning
                } else {
                    UserBidStatus::Outbid
                };
                Ok(MyBidSummary {
                    auction,
                    my_highest_bid: row.my_highest_bid,
                    user_status,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()
            .map_err(Into::into)
    }

}
