//! Constant-product AMM position.
//!
//! Only the anchor reserves are stored. Reserves at any other price are
//! derived from `k = reserve_x_base * reserve_y_base`:
//!
//! ```text
//! reserve_x(p) = sqrt(k / p)
//! reserve_y(p) = p * reserve_x(p)
//! ```

use crate::utils::decimal::{sqrt, year_fraction};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmmPosition {
    reserve_x_base: Decimal,
    reserve_y_base: Decimal,
    /// Annualized yield paid on the position value
    pub supply_interest_rate: Decimal,
}

impl AmmPosition {
    /// Create a position anchored at the given reserves.
    pub fn new(reserve_x: Decimal, reserve_y: Decimal, supply_interest_rate: Decimal) -> Self {
        Self {
            reserve_x_base: reserve_x,
            reserve_y_base: reserve_y,
            supply_interest_rate,
        }
    }

    /// Anchor reserves as last written.
    pub fn anchor(&self) -> (Decimal, Decimal) {
        (self.reserve_x_base, self.reserve_y_base)
    }

    /// The constant-product invariant of the current anchor.
    pub fn invariant(&self) -> Decimal {
        self.reserve_x_base * self.reserve_y_base
    }

    /// Reserves `(x, y)` implied by the invariant at `price`.
    pub fn reserves_at(&self, price: Decimal) -> (Decimal, Decimal) {
        if price <= Decimal::ZERO {
            return (Decimal::ZERO, Decimal::ZERO);
        }
        let reserve_x = sqrt(self.invariant() / price);
        (reserve_x, reserve_x * price)
    }

    /// Mark-to-market value in the stable unit.
    pub fn estimate_value(&self, price: Decimal) -> Decimal {
        let (reserve_x, reserve_y) = self.reserves_at(price);
        reserve_x * price + reserve_y
    }

    /// Simple (non-compounding) yield for one period. Nothing is credited
    /// back into the pool.
    pub fn generate_yield(&self, price: Decimal, period_minutes: u32) -> Decimal {
        self.estimate_value(price) * self.supply_interest_rate * year_fraction(period_minutes)
    }

    /// Overwrite the anchor, redefining `k`. Callers pass reserves computed
    /// at the current price.
    pub fn set_reserves(&mut self, reserve_x: Decimal, reserve_y: Decimal) {
        self.reserve_x_base = reserve_x.max(Decimal::ZERO);
        self.reserve_y_base = reserve_y.max(Decimal::ZERO);
    }
}
