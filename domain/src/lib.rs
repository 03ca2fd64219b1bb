pub mod config;
pub mod entities;
pub mod errors;
pub mod frames;
pub mod ids;
pub mod money;
pub mod rules;
pub mod username;

pub use config::Settings;
pub use entities::{
    Auction, AuctionFilters, AuctionOrderBy, AuctionStatus, BidTransaction, MyBidSummary, Product,
    User, UserBidStatus, Wallet, WalletTransaction, WalletTransactionType, WithdrawalRequest,
    WithdrawalStatus, DEFAULT_PRODUCT_CATEGORY, DEFAULT_PRODUCT_CONDITION,
};
pub use errors::ArbitrationError;
pub use frames::{AmountField, BidderInfo, ClientFrame, ServerFrame};
pub use ids::{AuctionId, BidId, ProductId, UserId, WalletId, WalletTransactionId, WithdrawalRequestId};
pub use rules::{decide_closure, plan_bid, plan_buy_now, validate_bid_preconditions, BidPlan, Refund, WalletTransition};
pub use username::mask_username;
