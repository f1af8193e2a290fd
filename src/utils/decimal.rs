//! Decimal arithmetic utilities for financial calculations.

use rust_decimal::prelude::*;

/// Decimal places kept for volatile-asset amounts (TON, debt, AMM reserve X).
pub const ASSET_SCALE: u32 = 9;

/// Decimal places kept for stable-unit values (USDT, collateral).
pub const VALUE_SCALE: u32 = 6;

/// Minutes in a (non-leap) year, used to pro-rate annualized rates.
pub const MINUTES_PER_YEAR: u32 = 365 * 24 * 60;

/// Round toward negative infinity at the given number of decimal places.
pub fn floor_dp(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp_with_strategy(decimals, RoundingStrategy::ToNegativeInfinity)
}

/// Floor an asset amount to [`ASSET_SCALE`].
pub fn floor_asset(value: Decimal) -> Decimal {
    floor_dp(value, ASSET_SCALE)
}

/// Floor a stable-unit value to [`VALUE_SCALE`].
pub fn floor_value(value: Decimal) -> Decimal {
    floor_dp(value, VALUE_SCALE)
}

/// Safe division that returns zero if divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

/// Square root; negative inputs map to zero (reserves are never negative).
pub fn sqrt(value: Decimal) -> Decimal {
    value.sqrt().unwrap_or(Decimal::ZERO)
}

/// Relative distance `|a - b| / |b|`, zero when `b` is zero.
pub fn relative_diff(a: Decimal, b: Decimal) -> Decimal {
    safe_div((a - b).abs(), b.abs())
}

/// Fraction of a year covered by `period_minutes`.
pub fn year_fraction(period_minutes: u32) -> Decimal {
    Decimal::from(period_minutes) / Decimal::from(MINUTES_PER_YEAR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_floor_dp_rounds_toward_negative_infinity() {
        assert_eq!(floor_dp(dec!(1.2345679), 6), dec!(1.234567));
        assert_eq!(floor_dp(dec!(-1.2345671), 6), dec!(-1.234568));
        assert_eq!(floor_value(dec!(10.9999999)), dec!(10.999999));
        assert_eq!(floor_asset(dec!(0.0000000019)), dec!(0.000000001));
    }

    #[test]
    fn test_sqrt() {
        assert_eq!(sqrt(dec!(0)), dec!(0));
        assert!((sqrt(dec!(27225000000)) - dec!(165000)).abs() < dec!(0.000000001));
        assert_eq!(sqrt(dec!(-4)), dec!(0));
    }

    #[test]
    fn test_relative_diff() {
        assert_eq!(relative_diff(dec!(110), dec!(100)), dec!(0.1));
        assert_eq!(relative_diff(dec!(90), dec!(100)), dec!(0.1));
        assert_eq!(relative_diff(dec!(5), dec!(0)), dec!(0));
    }

    #[test]
    fn test_year_fraction() {
        assert_eq!(year_fraction(525_600), dec!(1));
        assert_eq!(year_fraction(0), dec!(0));
    }
}
