//! Owned strategy state and the ideal-allocation math derived from it.

use crate::strategy::{AmmPosition, LendingPosition, UnusedFunds};
use crate::utils::decimal::safe_div;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Everything the rebalancer moves value between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyState {
    pub amm: AmmPosition,
    pub lending: LendingPosition,
    pub funds: UnusedFunds,
}

/// Target allocation for the current total value and price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IdealSetup {
    pub amm_reserve_y: Decimal,
    pub lending_collateral: Decimal,
    pub borrow_amount: Decimal,
}

/// Current minus ideal for each target quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Deviations {
    pub amm_reserve_y: Decimal,
    pub lending_collateral: Decimal,
    pub borrow_amount: Decimal,
}

impl StrategyState {
    /// Total value in USDT: lending net value, AMM value and unused funds.
    pub fn total_value(&self, price: Decimal) -> Decimal {
        self.lending.position_value(price) + self.amm.estimate_value(price) + self.funds.value(price)
    }

    /// AMM reserve Y at `price`.
    pub fn amm_reserve_y(&self, price: Decimal) -> Decimal {
        self.amm.reserves_at(price).1
    }

    pub fn ideal_setup(&self, price: Decimal, ideal_ratio: Decimal) -> IdealSetup {
        let total_value = self.total_value(price);
        let amm_reserve_y = total_value * ideal_ratio;

        IdealSetup {
            amm_reserve_y,
            lending_collateral: total_value - amm_reserve_y,
            borrow_amount: safe_div(amm_reserve_y, price),
        }
    }

    pub fn deviations(&self, price: Decimal, ideal: &IdealSetup) -> Deviations {
        Deviations {
            amm_reserve_y: self.amm_reserve_y(price) - ideal.amm_reserve_y,
            lending_collateral: self.lending.collateral - ideal.lending_collateral,
            borrow_amount: self.lending.debt - ideal.borrow_amount,
        }
    }

    /// Relative AMM reserve Y deviation, `|deviation| / current`.
    ///
    /// An empty pool that should hold liquidity is infinitely off target and
    /// reported as `Decimal::MAX`.
    pub fn amm_deviation_ratio(&self, price: Decimal, ideal: &IdealSetup) -> Decimal {
        let current = self.amm_reserve_y(price);
        let deviation = (current - ideal.amm_reserve_y).abs();

        if current == Decimal::ZERO {
            if deviation == Decimal::ZERO {
                Decimal::ZERO
            } else {
                Decimal::MAX
            }
        } else {
            deviation / current
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn seed_state() -> StrategyState {
        StrategyState {
            amm: AmmPosition::new(dec!(165000), dec!(330000), dec!(0.1)),
            lending: LendingPosition::new(dec!(670000), dec!(165000), dec!(1.5), dec!(0.05), dec!(0.03)),
            funds: UnusedFunds::default(),
        }
    }

    #[test]
    fn test_seed_state_is_on_target() {
        let state = seed_state();
        let total = state.total_value(dec!(2));
        assert!((total - dec!(1000000)).abs() < dec!(0.000001));

        let ideal = state.ideal_setup(dec!(2), dec!(0.33));
        assert!((ideal.amm_reserve_y - dec!(330000)).abs() < dec!(0.000001));
        assert!((ideal.lending_collateral - dec!(670000)).abs() < dec!(0.000001));
        assert!((ideal.borrow_amount - dec!(165000)).abs() < dec!(0.000001));

        let deviations = state.deviations(dec!(2), &ideal);
        assert!(deviations.amm_reserve_y.abs() < dec!(0.000001));
        assert!(state.amm_deviation_ratio(dec!(2), &ideal) < dec!(0.000001));
    }

    #[test]
    fn test_unused_funds_count_towards_total() {
        let mut state = seed_state();
        state.funds = UnusedFunds::new(dec!(10), dec!(5));
        let total = state.total_value(dec!(2));
        assert!((total - dec!(1000025)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_empty_pool_deviation() {
        let mut state = seed_state();
        state.amm.set_reserves(dec!(0), dec!(0));
        let ideal = state.ideal_setup(dec!(2), dec!(0.33));
        assert_eq!(state.amm_deviation_ratio(dec!(2), &ideal), Decimal::MAX);
    }
}
