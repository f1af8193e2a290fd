//! Per-tick status snapshot consumed by reporters.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Point-in-time view of the strategy. Field order is the reporting order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyStatus {
    pub price: Decimal,
    pub lending_total_value: Decimal,
    pub lending_collateral: Decimal,
    pub lending_debt: Decimal,
    pub lending_debt_value: Decimal,
    pub lending_utilization: Decimal,
    pub amm_value: Decimal,
    pub amm_reserve_x: Decimal,
    pub amm_reserve_y: Decimal,
    pub total_value: Decimal,
    pub unused_ton: Decimal,
    pub unused_usdt: Decimal,
    pub ideal_lending_collateral: Decimal,
    pub ideal_borrow_amount: Decimal,
    pub ideal_amm_reserve_y: Decimal,
    pub deviation_lending_collateral: Decimal,
    pub deviation_borrow_amount: Decimal,
    pub deviation_amm_reserve_y: Decimal,
    pub last_rebalance_price: Decimal,
    pub total_rebalances: u64,
}

impl StrategyStatus {
    /// Column names matching [`StrategyStatus::csv_row`].
    pub const CSV_HEADER: &'static str = "price,lending_total_value,lending_collateral,lending_debt,\
lending_debt_value,lending_utilization,amm_value,amm_reserve_x,amm_reserve_y,total_value,\
unused_ton,unused_usdt,ideal_lending_collateral,ideal_borrow_amount,ideal_amm_reserve_y,\
deviation_lending_collateral,deviation_borrow_amount,deviation_amm_reserve_y,\
last_rebalance_price,total_rebalances";

    /// Comma-separated values in header order.
    pub fn csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            self.price,
            self.lending_total_value,
            self.lending_collateral,
            self.lending_debt,
            self.lending_debt_value,
            self.lending_utilization,
            self.amm_value,
            self.amm_reserve_x,
            self.amm_reserve_y,
            self.total_value,
            self.unused_ton,
            self.unused_usdt,
            self.ideal_lending_collateral,
            self.ideal_borrow_amount,
            self.ideal_amm_reserve_y,
            self.deviation_lending_collateral,
            self.deviation_borrow_amount,
            self.deviation_amm_reserve_y,
            self.last_rebalance_price,
            self.total_rebalances,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_csv_row_matches_header() {
        let status = StrategyStatus {
            price: dec!(2),
            lending_total_value: dec!(340000),
            lending_collateral: dec!(670000),
            lending_debt: dec!(165000),
            lending_debt_value: dec!(330000),
            lending_utilization: dec!(0.7388),
            amm_value: dec!(660000),
            amm_reserve_x: dec!(165000),
            amm_reserve_y: dec!(330000),
            total_value: dec!(1000000),
            unused_ton: dec!(0),
            unused_usdt: dec!(0),
            ideal_lending_collateral: dec!(670000),
            ideal_borrow_amount: dec!(165000),
            ideal_amm_reserve_y: dec!(330000),
            deviation_lending_collateral: dec!(0),
            deviation_borrow_amount: dec!(0),
            deviation_amm_reserve_y: dec!(0),
            last_rebalance_price: dec!(2),
            total_rebalances: 3,
        };

        let header_columns = StrategyStatus::CSV_HEADER.split(',').count();
        let row = status.csv_row();
        assert_eq!(header_columns, 20);
        assert_eq!(row.split(',').count(), header_columns);
        assert!(row.starts_with("2,340000,670000,165000"));
        assert!(row.ends_with(",2,3"));
    }
}
