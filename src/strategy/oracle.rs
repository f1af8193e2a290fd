//! Single-value price oracle shared by both positions.

use crate::strategy::StrategyError;
use rust_decimal::Decimal;

/// Holds the current market price. No history is kept.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceOracle {
    price: Decimal,
}

impl PriceOracle {
    /// Create an oracle at the given price.
    pub fn new(price: Decimal) -> Result<Self, StrategyError> {
        ensure_positive(price)?;
        Ok(Self { price })
    }

    /// Current price.
    pub fn price(&self) -> Decimal {
        self.price
    }

    /// Replace the current price. Non-positive prices are rejected and the
    /// stored price is left untouched.
    pub fn set_price(&mut self, price: Decimal) -> Result<(), StrategyError> {
        ensure_positive(price)?;
        self.price = price;
        Ok(())
    }
}

pub(crate) fn ensure_positive(price: Decimal) -> Result<(), StrategyError> {
    if price <= Decimal::ZERO {
        return Err(StrategyError::InvalidPrice(price));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_set_price() {
        let mut oracle = PriceOracle::new(dec!(2.00)).unwrap();
        oracle.set_price(dec!(2.5)).unwrap();
        assert_eq!(oracle.price(), dec!(2.5));
    }

    #[test]
    fn test_rejects_non_positive_price() {
        assert!(PriceOracle::new(dec!(0)).is_err());

        let mut oracle = PriceOracle::new(dec!(2)).unwrap();
        assert_eq!(
            oracle.set_price(dec!(-1)),
            Err(StrategyError::InvalidPrice(dec!(-1)))
        );
        assert_eq!(oracle.price(), dec!(2));
    }
}
