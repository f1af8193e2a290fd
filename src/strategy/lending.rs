//! Collateralized lending position.
//!
//! Collateral is held in the stable unit, debt in the volatile asset. The
//! position is solvent while `debt * price <= collateral / liquidation_threshold`.

use crate::strategy::StrategyError;
use crate::utils::decimal::{floor_asset, floor_value, safe_div, year_fraction};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LendingPosition {
    /// Pledged collateral (stable unit)
    pub collateral: Decimal,
    /// Outstanding borrow (volatile asset units)
    pub debt: Decimal,
    /// Collateral-to-debt-value ratio below which the position is liquidated
    pub liquidation_threshold: Decimal,
    /// Annualized borrow rate applied to `debt`
    pub borrow_interest_rate: Decimal,
    /// Annualized supply rate applied to `collateral`
    pub supply_interest_rate: Decimal,
}

impl LendingPosition {
    pub fn new(
        collateral: Decimal,
        debt: Decimal,
        liquidation_threshold: Decimal,
        borrow_interest_rate: Decimal,
        supply_interest_rate: Decimal,
    ) -> Self {
        Self {
            collateral,
            debt,
            liquidation_threshold,
            borrow_interest_rate,
            supply_interest_rate,
        }
    }

    /// Debt marked to the stable unit.
    pub fn debt_value(&self, price: Decimal) -> Decimal {
        self.debt * price
    }

    /// Net value of the position: collateral minus debt value.
    pub fn position_value(&self, price: Decimal) -> Decimal {
        self.collateral - self.debt_value(price)
    }

    /// Largest debt value the collateral supports.
    pub fn liquidation_boundary(&self) -> Decimal {
        safe_div(self.collateral, self.liquidation_threshold)
    }

    pub fn is_liquidatable(&self, price: Decimal) -> bool {
        self.debt_value(price) > self.liquidation_boundary()
    }

    /// Debt value relative to the liquidation boundary (1.0 at liquidation).
    pub fn utilization(&self, price: Decimal) -> Decimal {
        safe_div(
            self.debt_value(price) * self.liquidation_threshold,
            self.collateral,
        )
    }

    /// Grow debt and collateral by one period of interest, each compounding
    /// on its previous value and floored to its scale.
    ///
    /// Returns [`StrategyError::Insolvency`] if the position is liquidatable
    /// afterwards.
    pub fn accrue_interest(
        &mut self,
        price: Decimal,
        period_minutes: u32,
    ) -> Result<(), StrategyError> {
        let fraction = year_fraction(period_minutes);

        self.debt = floor_asset(self.debt * (Decimal::ONE + self.borrow_interest_rate * fraction));
        self.collateral =
            floor_value(self.collateral * (Decimal::ONE + self.supply_interest_rate * fraction));

        if self.is_liquidatable(price) {
            let debt_value = self.debt_value(price);
            let liquidation_boundary = self.liquidation_boundary();
            error!(
                %price,
                %debt_value,
                %liquidation_boundary,
                "Lending position became liquidatable"
            );
            return Err(StrategyError::Insolvency {
                debt_value,
                liquidation_boundary,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn seed_position() -> LendingPosition {
        LendingPosition::new(dec!(670000), dec!(165000), dec!(1.5), dec!(0.05), dec!(0.03))
    }

    #[test]
    fn test_values() {
        let lending = seed_position();

        assert_eq!(lending.debt_value(dec!(2)), dec!(330000));
        assert_eq!(lending.position_value(dec!(2)), dec!(340000));
        assert!(!lending.is_liquidatable(dec!(2)));
        // 330000 * 1.5 / 670000
        let utilization = lending.utilization(dec!(2));
        assert!(utilization > dec!(0.7388) && utilization < dec!(0.7389));
    }

    #[test]
    fn test_liquidation_boundary() {
        let lending = seed_position();
        // 670000 / 1.5 / 165000 = 2.7070...
        assert!(!lending.is_liquidatable(dec!(2.70)));
        assert!(lending.is_liquidatable(dec!(2.71)));
        assert!(lending.utilization(dec!(2.71)) > Decimal::ONE);
    }

    #[test]
    fn test_accrue_interest_compounds_and_floors() {
        let mut lending = seed_position();
        lending.accrue_interest(dec!(2), 5).unwrap();

        // 165000 * 0.05 * 5 / 525600 = 0.0784817351...
        assert_eq!(lending.debt, dec!(165000.078481735));
        // 670000 * 0.03 * 5 / 525600 = 0.1912100456...
        assert_eq!(lending.collateral, dec!(670000.191210));

        let (debt, collateral) = (lending.debt, lending.collateral);
        lending.accrue_interest(dec!(2), 5).unwrap();
        assert!(lending.debt > debt);
        assert!(lending.collateral > collateral);
    }

    #[test]
    fn test_zero_rates_leave_position_unchanged() {
        let mut lending =
            LendingPosition::new(dec!(1000), dec!(10), dec!(1.5), dec!(0), dec!(0));
        lending.accrue_interest(dec!(2), 60).unwrap();
        assert_eq!(lending.debt, dec!(10));
        assert_eq!(lending.collateral, dec!(1000));
    }

    #[test]
    fn test_accrue_interest_detects_insolvency() {
        let mut lending = seed_position();
        let err = lending.accrue_interest(dec!(3), 5).unwrap_err();

        match err {
            StrategyError::Insolvency {
                debt_value,
                liquidation_boundary,
            } => {
                assert!(debt_value > liquidation_boundary);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
