//! Pure business rules for the Bid Arbitration Core and Auction Closer
//! (spec.md §4.1, §4.2).
//!
//! Nothing in this module touches I/O. `storage::pg` and `storage::memory`
//! both acquire their locks/rows first, then call these functions to decide
//! *what* to write, and finally apply the result inside their own
//! transaction mechanics. This is the "ORM-embedded business rules
//! extracted into pure transactional procedures against a storage
//! interface" split called for in spec.md §9.

use jiff::Timestamp;
use rust_decimal::Decimal;

use crate::entities::{Auction, AuctionStatus};
use crate::errors::ArbitrationError;
use crate::ids::UserId;
use crate::money::is_valid_bid_amount;

/// What has to happen to wallets for a winning bid to take effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletTransition {
    /// The bidder already held the winning position and is raising their
    /// own bid. Per spec.md §9's resolution of the source's inconsistent
    /// handling of this case: no self-refund, a single ledger entry moves
    /// only the delta from balance to held.
    SameBidderRaise { delta: Decimal },
    /// A new winner (auction had none, or had a different winner). The
    /// prior winner, if any, is refunded in full before the new winner's
    /// funds are held.
    NewWinner {
        refund: Option<Refund>,
        hold_amount: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refund {
    pub prior_winner_id: UserId,
    pub amount: Decimal,
}

/// Full plan for a committed bid: the wallet transition plus the new
/// auction state to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidPlan {
    pub transition: WalletTransition,
    pub new_price: Decimal,
}

fn compute_transition(
    current_winner: Option<UserId>,
    current_price: Decimal,
    bidder: UserId,
) -> WalletTransition {
    match current_winner {
        Some(winner) if winner == bidder => WalletTransition::SameBidderRaise {
            delta: current_price,
        },
        Some(winner) => WalletTransition::NewWinner {
            refund: Some(Refund {
                prior_winner_id: winner,
                amount: current_price,
            }),
            hold_amount: current_price,
        },
        None => WalletTransition::NewWinner {
            refund: None,
            hold_amount: current_price,
        },
    }
}

/// `compute_transition` above is parameterized on the *amount newly held*,
/// not the bid price, so both callers (raise-by-delta vs. fresh hold) share
/// one code path. This helper fixes up the `delta`/`hold_amount` field to
/// the right value once the new price is known.
fn with_new_amount(transition: WalletTransition, new_amount: Decimal) -> WalletTransition {
    match transition {
        WalletTransition::SameBidderRaise { .. } => WalletTransition::SameBidderRaise {
            delta: new_amount,
        },
        WalletTransition::NewWinner { refund, .. } => WalletTransition::NewWinner {
            refund,
            hold_amount: new_amount,
        },
    }
}

/// Preconditions 1-5 of `placeBid` (spec.md §4.1). Precondition 6 (wallet
/// balance) is checked separately by the caller once it has locked and read
/// the wallet row, since this function has no wallet access.
pub fn validate_bid_preconditions(
    auction: &Auction,
    owner_id: UserId,
    bidder: UserId,
    amount: Decimal,
    now: Timestamp,
) -> Result<(), ArbitrationError> {
    if !is_valid_bid_amount(amount) {
        return Err(ArbitrationError::Validation(
            "bid amount must be positive and have at most two decimal places".to_string(),
        ));
    }
    if auction.status != AuctionStatus::Active {
        return Err(ArbitrationError::Precondition(
            "auction is not active".to_string(),
        ));
    }
    if now >= auction.end_time {
        return Err(ArbitrationError::Precondition(
            "auction has ended".to_string(),
        ));
    }
    if bidder == owner_id {
        return Err(ArbitrationError::Precondition(
            "owner cannot bid on their own auction".to_string(),
        ));
    }
    if amount <= auction.current_price {
        return Err(ArbitrationError::Validation(format!(
            "bid must exceed current price {}",
            auction.current_price
        )));
    }
    Ok(())
}

/// Precondition 6 plus plan computation, once the bidder's wallet balance is
/// known. Call after `validate_bid_preconditions` succeeds and the wallet
/// row has been locked and read.
pub fn plan_bid(
    auction: &Auction,
    bidder: UserId,
    amount: Decimal,
    wallet_balance: Decimal,
) -> Result<BidPlan, ArbitrationError> {
    if wallet_balance < amount {
        return Err(ArbitrationError::InsufficientFunds {
            balance: wallet_balance,
            required: amount,
        });
    }

    let transition = compute_transition(auction.winner_id, auction.current_price, bidder);
    let amount_to_hold = match &transition {
        WalletTransition::SameBidderRaise { .. } => amount - auction.current_price,
        WalletTransition::NewWinner { .. } => amount,
    };

    Ok(BidPlan {
        transition: with_new_amount(transition, amount_to_hold),
        new_price: amount,
    })
}

/// Preconditions + plan for `buyNow` (spec.md §4.1 "Buy-Now variant").
pub fn plan_buy_now(
    auction: &Auction,
    owner_id: UserId,
    buyer: UserId,
    wallet_balance: Decimal,
) -> Result<BidPlan, ArbitrationError> {
    if auction.status != AuctionStatus::Active {
        return Err(ArbitrationError::Precondition(
            "auction is not active".to_string(),
        ));
    }
    let Some(buy_now_price) = auction.buy_now_price else {
        return Err(ArbitrationError::Precondition(
            "auction has no buy-now price".to_string(),
        ));
    };
    if buyer == owner_id {
        return Err(ArbitrationError::Precondition(
            "owner cannot buy their own auction".to_string(),
        ));
    }
    if wallet_balance < buy_now_price {
        return Err(ArbitrationError::InsufficientFunds {
            balance: wallet_balance,
            required: buy_now_price,
        });
    }

    let transition = compute_transition(auction.winner_id, auction.current_price, buyer);
    let amount_to_hold = match &transition {
        WalletTransition::SameBidderRaise { .. } => buy_now_price - auction.current_price,
        WalletTransition::NewWinner { .. } => buy_now_price,
    };

    Ok(BidPlan {
        transition: with_new_amount(transition, amount_to_hold),
        new_price: buy_now_price,
    })
}

/// Auction Closer decision (spec.md §4.2): `None` means the auction is not
/// (yet) a candidate for closure.
pub fn decide_closure(auction: &Auction, now: Timestamp) -> Option<AuctionStatus> {
    if auction.status != AuctionStatus::Active || now < auction.end_time {
        return None;
    }
    if auction.current_price > auction.starting_price {
        Some(AuctionStatus::Finished)
    } else {
        Some(AuctionStatus::Expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{AuctionId, ProductId};
    use std::str::FromStr;

    fn auction(status: AuctionStatus, current: &str, starting: &str, winner: Option<UserId>) -> Auction {
        Auction {
            id: AuctionId::new(),
            product_id: ProductId::new(),
            status,
            start_time: Timestamp::from_str("2026-01-01T00:00:00Z").unwrap(),
            end_time: Timestamp::from_str("2026-01-02T00:00:00Z").unwrap(),
            starting_price: Decimal::from_str(starting).unwrap(),
            current_price: Decimal::from_str(current).unwrap(),
            buy_now_price: Some(Decimal::from_str("500.00").unwrap()),
            winner_id: winner,
            created_at: Timestamp::from_str("2025-12-31T00:00:00Z").unwrap(),
        }
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn rejects_bid_at_or_below_current_price() {
        let owner = UserId::new();
        let bidder = UserId::new();
        let a = auction(AuctionStatus::Active, "50.00", "10.00", None);
        let now = Timestamp::from_str("2026-01-01T12:00:00Z").unwrap();
        let err = validate_bid_preconditions(&a, owner, bidder, d("50.00"), now).unwrap_err();
        assert!(matches!(err, ArbitrationError::Validation(_)));
    }

    #[test]
    fn accepts_bid_strictly_above_current_price() {
        let owner = UserId::new();
        let bidder = UserId::new();
        let a = auction(AuctionStatus::Active, "50.00", "10.00", None);
        let now = Timestamp::from_str("2026-01-01T12:00:00Z").unwrap();
        assert!(validate_bid_preconditions(&a, owner, bidder, d("50.01"), now).is_ok());
    }

    #[test]
    fn rejects_owner_bidding_on_own_auction() {
        let owner = UserId::new();
        let a = auction(AuctionStatus::Active, "50.00", "10.00", None);
        let now = Timestamp::from_str("2026-01-01T12:00:00Z").unwrap();
        let err = validate_bid_preconditions(&a, owner, owner, d("60.00"), now).unwrap_err();
        assert!(matches!(err, ArbitrationError::Precondition(_)));
    }

    #[test]
    fn rejects_bid_at_or_after_end_time() {
        let owner = UserId::new();
        let bidder = UserId::new();
        let a = auction(AuctionStatus::Active, "50.00", "10.00", None);
        let now = Timestamp::from_str("2026-01-02T00:00:00Z").unwrap();
        let err = validate_bid_preconditions(&a, owner, bidder, d("60.00"), now).unwrap_err();
        assert!(matches!(err, ArbitrationError::Precondition(_)));
    }

    #[test]
    fn plan_refunds_prior_winner_and_holds_full_amount() {
        let prior_winner = UserId::new();
        let new_bidder = UserId::new();
        let a = auction(AuctionStatus::Active, "50.00", "10.00", Some(prior_winner));
        let plan = plan_bid(&a, new_bidder, d("100.00"), d("500.00")).unwrap();
        assert_eq!(plan.new_price, d("100.00"));
        match plan.transition {
            WalletTransition::NewWinner { refund, hold_amount } => {
                let refund = refund.expect("expected a refund");
                assert_eq!(refund.prior_winner_id, prior_winner);
                assert_eq!(refund.amount, d("50.00"));
                assert_eq!(hold_amount, d("100.00"));
            }
            other => panic!("expected NewWinner, got {other:?}"),
        }
    }

    #[test]
    fn plan_for_self_raise_holds_only_the_delta() {
        let bidder = UserId::new();
        let a = auction(AuctionStatus::Active, "50.00", "10.00", Some(bidder));
        let plan = plan_bid(&a, bidder, d("80.00"), d("500.00")).unwrap();
        match plan.transition {
            WalletTransition::SameBidderRaise { delta } => assert_eq!(delta, d("30.00")),
            other => panic!("expected SameBidderRaise, got {other:?}"),
        }
    }

    #[test]
    fn plan_rejects_insufficient_funds() {
        let bidder = UserId::new();
        let a = auction(AuctionStatus::Active, "50.00", "10.00", None);
        let err = plan_bid(&a, bidder, d("100.00"), d("10.00")).unwrap_err();
        assert!(matches!(err, ArbitrationError::InsufficientFunds { .. }));
    }

    #[test]
    fn closure_finishes_auction_with_qualifying_bids() {
        let a = auction(AuctionStatus::Active, "80.00", "10.00", Some(UserId::new()));
        let now = Timestamp::from_str("2026-01-02T00:00:01Z").unwrap();
        assert_eq!(decide_closure(&a, now), Some(AuctionStatus::Finished));
    }

    #[test]
    fn closure_expires_auction_without_qualifying_bids() {
        let a = auction(AuctionStatus::Active, "10.00", "10.00", None);
        let now = Timestamp::from_str("2026-01-02T00:00:01Z").unwrap();
        assert_eq!(decide_closure(&a, now), Some(AuctionStatus::Expired));
    }

    #[test]
    fn closure_is_noop_before_end_time() {
        let a = auction(AuctionStatus::Active, "80.00", "10.00", Some(UserId::new()));
        let now = Timestamp::from_str("2026-01-01T12:00:00Z").unwrap();
        assert_eq!(decide_closure(&a, now), None);
    }

    #[test]
    fn closure_is_noop_for_terminal_auctions() {
        let a = auction(AuctionStatus::Finished, "80.00", "10.00", Some(UserId::new()));
        let now = Timestamp::from_str("2026-01-02T00:00:01Z").unwrap();
        assert_eq!(decide_closure(&a, now), None);
    }
}
