//! Fixed-point money handling.
//!
//! Everything financial is `rust_decimal::Decimal`; floating point never
//! touches a balance or a bid amount anywhere in this crate (spec.md §3).
//! Auction prices are scale (12,2), wallet balances are scale (14,2)
//! (spec.md §6.1).

use rust_decimal::Decimal;

pub const AUCTION_PRICE_SCALE: u32 = 2;
pub const AUCTION_PRICE_MAX_DIGITS: u32 = 12;
pub const WALLET_BALANCE_MAX_DIGITS: u32 = 14;

/// `true` if `amount` fits in scale-2, `max_digits`-digit fixed point and is
/// not negative-zero-weird (rust_decimal normalizes sign on zero already).
fn fits_fixed_point(amount: Decimal, max_digits: u32) -> bool {
    if amount.scale() > AUCTION_PRICE_SCALE {
        // More fractional digits than the wire format allows (e.g. 1.005).
        return false;
    }
    let digits = amount.trunc().to_string().trim_start_matches('-').len() as u32;
    digits <= max_digits
}

/// Precondition 1 of `placeBid`/`buyNow`: amount must be positive and
/// representable as fixed-point(12,2).
pub fn is_valid_bid_amount(amount: Decimal) -> bool {
    amount > Decimal::ZERO && fits_fixed_point(amount, AUCTION_PRICE_MAX_DIGITS)
}

/// Same check against the wallet's wider (14,2) scale, used when validating
/// deposits/withdrawals rather than bid amounts.
pub fn is_valid_wallet_amount(amount: Decimal) -> bool {
    amount >= Decimal::ZERO && fits_fixed_point(amount, WALLET_BALANCE_MAX_DIGITS)
}

/// Renders a decimal the way the wire protocol wants it: a plain string with
/// exactly two fractional digits, no thousands separators (spec.md §6.1:
/// "Decimal values are serialized as strings to preserve precision").
pub fn format_amount(amount: Decimal) -> String {
    amount.round_dp(AUCTION_PRICE_SCALE).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn rejects_zero_and_negative() {
        assert!(!is_valid_bid_amount(Decimal::ZERO));
        assert!(!is_valid_bid_amount(d("-5.00")));
    }

    #[test]
    fn rejects_too_many_fractional_digits() {
        assert!(!is_valid_bid_amount(d("10.005")));
    }

    #[test]
    fn rejects_too_many_integer_digits_for_scale() {
        // 13 integer digits, over the (12,2) limit.
        assert!(!is_valid_bid_amount(d("1000000000000.00")));
    }

    #[test]
    fn accepts_well_formed_amount() {
        assert!(is_valid_bid_amount(d("50.00")));
        assert!(is_valid_bid_amount(d("50")));
    }

    #[test]
    fn formats_with_two_fractional_digits() {
        assert_eq!(format_amount(d("50")), "50.00");
        assert_eq!(format_amount(d("50.5")), "50.50");
    }
}
