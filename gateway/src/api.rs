//! GraphQL surface for spec.md §4.4's "Supporting Operations"
//! (SPEC_FULL.md §4.4: "promoted from 'minimal external contract' to a
//! real, implemented GraphQL surface"). Grounded in the teacher's
//! `indexer`/`auction` `service.rs` `QueryRoot`/mutation-root shape
//! (`#[Object] impl QueryRoot` holding an `Arc<State>`), generalized from
//! a Linera view-storage `QueryRoot` to one backed by `storage::AuctionStore`.
//!
//! `domain::Auction`/`Wallet`/etc. are deliberately not the GraphQL output
//! types themselves (domain/entities.rs: no `async-graphql` scalar exists
//! for `rust_decimal::Decimal`/`jiff::Timestamp` here). This module's
//! `*Gql` types re-shape them into the wire-format strings spec.md §6.1
//! already specifies for money and time.

use std::str::FromStr;
use std::sync::Arc;

use async_graphql::{EmptySubscription, InputObject, Object, Schema, SimpleObject};
use jiff::Timestamp;
use rust_decimal::Decimal;

use domain::{Auction, AuctionFilters, AuctionOrderBy, AuctionStatus, MyBidSummary, UserBidStatus, Wallet};
use storage::{AuctionStore, CreateAuctionInput, UpdateAuctionFields};

pub type AppSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub fn build_schema(store: Arc<dyn AuctionStore>) -> AppSchema {
    Schema::build(
        QueryRoot { store: store.clone() },
        MutationRoot { store },
        EmptySubscription,
    )
    .finish()
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, String> {
    Decimal::from_str(value).map_err(|_| format!("{field} is not a valid decimal"))
}

fn parse_timestamp(field: &str, value: &str) -> Result<Timestamp, String> {
    Timestamp::from_str(value).map_err(|_| format!("{field} is not a valid ISO-8601 timestamp"))
}

fn parse_uuid_id<T: From<uuid::Uuid>>(field: &str, value: &str) -> Result<T, String> {
    uuid::Uuid::from_str(value).map(T::from).map_err(|_| format!("{field} is not a valid id"))
}

#[derive(SimpleObject)]
pub struct AuctionGql {
    pub id: String,
    pub product_id: String,
    pub status: AuctionStatus,
    pub start_time: String,
    pub end_time: String,
    pub starting_price: String,
    pub current_price: String,
    pub buy_now_price: Option<String>,
    pub winner_id: Option<String>,
    pub created_at: String,
}

impl From<&Auction> for AuctionGql {
    fn from(a: &Auction) -> Self {
        AuctionGql {
            id: a.id.to_string(),
            product_id: a.product_id.to_string(),
            status: a.status,
            start_time: a.start_time.to_string(),
            end_time: a.end_time.to_string(),
            starting_price: domain::money::format_amount(a.starting_price),
            current_price: domain::money::format_amount(a.current_price),
            buy_now_price: a.buy_now_price.map(domain::money::format_amount),
            winner_id: a.winner_id.map(|id| id.to_string()),
            created_at: a.created_at.to_string(),
        }
    }
}

#[derive(SimpleObject)]
pub struct WalletGql {
    pub id: String,
    pub user_id: String,
    pub balance: String,
    pub held_balance: String,
}

impl From<&Wallet> for WalletGql {
    fn from(w: &Wallet) -> Self {
        WalletGql {
            id: w.id.to_string(),
            user_id: w.user_id.to_string(),
            balance: domain::money::format_amount(w.balance),
            held_balance: domain::money::format_amount(w.held_balance),
        }
    }
}

#[derive(SimpleObject)]
pub struct MyBidGql {
    pub auction: AuctionGql,
    pub my_highest_bid: String,
    pub user_status: UserBidStatus,
}

impl From<&MyBidSummary> for MyBidGql {
    fn from(s: &MyBidSummary) -> Self {
        MyBidGql {
            auction: AuctionGql::from(&s.auction),
            my_highest_bid: domain::money::format_amount(s.my_highest_bid),
            user_status: s.user_status,
        }
    }
}

/// `listAuctions(filters)` (spec.md §4.4).
#[derive(InputObject, Default)]
pub struct AuctionFiltersInput {
    pub status: Option<AuctionStatus>,
    pub category: Option<String>,
    pub condition: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub search: Option<String>,
    pub order_by: Option<AuctionOrderBy>,
}

impl AuctionFiltersInput {
    fn into_domain(self) -> Result<AuctionFilters, String> {
        Ok(AuctionFilters {
            status: self.status,
            category: self.category,
            condition: self.condition,
            min_price: self.min_price.as_deref().map(|v| parse_decimal("minPrice", v)).transpose()?,
            max_price: self.max_price.as_deref().map(|v| parse_decimal("maxPrice", v)).transpose()?,
            search: self.search,
            order_by: self.order_by.unwrap_or_default(),
        })
    }
}

pub struct QueryRoot {
    store: Arc<dyn AuctionStore>,
}

#[Object]
impl QueryRoot {
    /// `getAuction`: a single auction by id.
    async fn auction(&self, id: String) -> Result<Option<AuctionGql>, String> {
        let auction_id = parse_uuid_id("id", &id)?;
        let auction = self.store.get_auction(auction_id).await.map_err(|e| e.client_message())?;
        Ok(auction.as_ref().map(AuctionGql::from))
    }

    /// `listAuctions(filters)` (spec.md §4.4).
    async fn auctions(&self, filters: Option<AuctionFiltersInput>) -> Result<Vec<AuctionGql>, String> {
        let filters = filters.unwrap_or_default().into_domain()?;
        let auctions = self.store.list_auctions(filters).await.map_err(|e| e.client_message())?;
        Ok(auctions.iter().map(AuctionGql::from).collect())
    }

    /// `listMyBids(user)` (spec.md §4.4).
    async fn my_bids(&self, user_id: String) -> Result<Vec<MyBidGql>, String> {
        let user_id = parse_uuid_id("userId", &user_id)?;
        let summaries = self.store.list_my_bids(user_id).await.map_err(|e| e.client_message())?;
        Ok(summaries.iter().map(MyBidGql::from).collect())
    }

    /// Wallet lookup backing `user_status` computations on the client side.
    async fn wallet(&self, user_id: String) -> Result<WalletGql, String> {
        let user_id = parse_uuid_id("userId", &user_id)?;
        let wallet = self.store.get_wallet(user_id).await.map_err(|e| e.client_message())?;
        Ok(WalletGql::from(&wallet))
    }
}

#[derive(InputObject)]
pub struct CreateAuctionInputGql {
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub condition: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub starting_price: String,
    pub buy_now_price: Option<String>,
}

#[derive(InputObject, Default)]
pub struct UpdateAuctionInputGql {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub condition: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub starting_price: Option<String>,
    pub buy_now_price: Option<String>,
}

pub struct MutationRoot {
    store: Arc<dyn AuctionStore>,
}

#[Object]
impl MutationRoot {
    /// `createAuction(owner, product_fields, timing, starting_price,
    /// buy_now_price?)` (spec.md §4.4): created in DRAFT.
    async fn create_auction(&self, input: CreateAuctionInputGql) -> Result<AuctionGql, String> {
        let owner_id = parse_uuid_id("ownerId", &input.owner_id)?;
        let domain_input = CreateAuctionInput {
            owner_id,
            title: input.title,
            description: input.description,
            image_url: input.image_url,
            category: input.category,
            condition: input.condition,
            start_time: parse_timestamp("startTime", &input.start_time)?,
            end_time: parse_timestamp("endTime", &input.end_time)?,
            starting_price: parse_decimal("startingPrice", &input.starting_price)?,
            buy_now_price: input.buy_now_price.as_deref().map(|v| parse_decimal("buyNowPrice", v)).transpose()?,
        };
        let auction = self.store.create_auction(domain_input).await.map_err(|e| e.client_message())?;
        Ok(AuctionGql::from(&auction))
    }

    /// `updateAuction(id, owner, fields)`, permitted only while DRAFT and
    /// caller owns the product (spec.md §4.4).
    async fn update_auction(
        &self,
        auction_id: String,
        owner_id: String,
        input: UpdateAuctionInputGql,
    ) -> Result<AuctionGql, String> {
        let auction_id = parse_uuid_id("auctionId", &auction_id)?;
        let owner_id = parse_uuid_id("ownerId", &owner_id)?;
        let fields = UpdateAuctionFields {
            title: input.title,
            description: input.description,
            image_url: input.image_url,
            category: input.category,
            condition: input.condition,
            start_time: input.start_time.as_deref().map(|v| parse_timestamp("startTime", v)).transpose()?,
            end_time: input.end_time.as_deref().map(|v| parse_timestamp("endTime", v)).transpose()?,
            starting_price: input.starting_price.as_deref().map(|v| parse_decimal("startingPrice", v)).transpose()?,
            buy_now_price: input.buy_now_price.as_deref().map(|v| parse_decimal("buyNowPrice", v)).transpose()?,
        };
        let auction = self
            .store
            .update_auction(auction_id, owner_id, fields)
            .await
            .map_err(|e| e.client_message())?;
        Ok(AuctionGql::from(&auction))
    }

    /// `deleteAuction(id, owner)` (spec.md §4.4).
    async fn delete_auction(&self, auction_id: String, owner_id: String) -> Result<bool, String> {
        let auction_id = parse_uuid_id("auctionId", &auction_id)?;
        let owner_id = parse_uuid_id("ownerId", &owner_id)?;
        self.store.delete_auction(auction_id, owner_id).await.map_err(|e| e.client_message())?;
        Ok(true)
    }
}
