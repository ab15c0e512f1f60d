//! Monetary helpers.
//!
//! All monetary amounts are [`Decimal`]s. JSON serializes them as floats
//! (the boundary the front-end expects); SQLite stores their canonical
//! string form. Currency-level rounding is two decimal places.

use rust_decimal::Decimal;

/// Round to currency precision (2 decimal places, banker's rounding off).
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(
        2,
        rust_decimal::RoundingStrategy::MidpointAwayFromZero,
    )
}

/// The invariant-bearing total: `subtotal + tax + shipping - discount`.
pub fn grand_total(
    subtotal: Decimal,
    tax_amount: Decimal,
    shipping_cost: Decimal,
    discount: Decimal,
) -> Decimal {
    round_money(subtotal + tax_amount + shipping_cost - discount)
}

#[cfg(test)]
mod test {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn grand_total_formula() {
        assert_eq!(
            grand_total(dec!(100000), dec!(11000), dec!(5000), dec!(1000)),
            dec!(115000)
        );
        assert_eq!(
            grand_total(dec!(10.005), dec!(0), dec!(0), dec!(0)),
            dec!(10.01)
        );
    }

    #[test]
    fn round_money_two_places() {
        assert_eq!(round_money(dec!(1.005)), dec!(1.01));
        assert_eq!(round_money(dec!(1.004)), dec!(1.00));
        assert_eq!(round_money(dec!(5000)), dec!(5000));
    }
}
