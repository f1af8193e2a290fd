//! Strategy engine: per-tick update and rebalance driver.

use crate::config::StrategyConfig;
use crate::strategy::oracle::ensure_positive;
use crate::strategy::rebalancer::{self, RebalanceContext};
use crate::strategy::{
    AmmPosition, Deviations, IdealSetup, LendingPosition, PriceOracle, StrategyError,
    StrategyState, StrategyStatus, UnusedFunds,
};
use crate::utils::decimal::floor_value;
use rust_decimal::Decimal;
use tracing::{debug, info};

/// A leveraged LP strategy: an AMM position funded partly by TON borrowed
/// against USDT collateral, kept near `ideal_ratio` by rebalancing.
#[derive(Debug, Clone)]
pub struct Strategy {
    oracle: PriceOracle,
    state: StrategyState,

    ideal_ratio: Decimal,
    swap_fee: Decimal,
    interest_period_minutes: u32,
    rebalance_threshold: Decimal,
    liquidity_add_threshold: Decimal,

    total_rebalances: u64,
    last_rebalance_price: Decimal,
    total_amm_yield: Decimal,
}

impl Strategy {
    /// Split `initial_capital` into the AMM and lending seeds.
    ///
    /// The lending side pledges `capital * (1 - ideal_ratio)` and borrows
    /// `capital * ideal_ratio / price` TON, which is paired with
    /// `capital * ideal_ratio` USDT in the AMM.
    pub fn new(config: &StrategyConfig) -> Result<Self, StrategyError> {
        config
            .validate()
            .map_err(|e| StrategyError::InvalidConfig(e.to_string()))?;

        let price = config.initial_price;
        let oracle = PriceOracle::new(price)?;

        let amm_reserve_y = config.initial_capital * config.ideal_ratio;
        let collateral = config.initial_capital - amm_reserve_y;
        let borrowed = amm_reserve_y / price;

        let state = StrategyState {
            amm: AmmPosition::new(borrowed, amm_reserve_y, config.amm_supply_interest_rate),
            lending: LendingPosition::new(
                collateral,
                borrowed,
                config.liquidation_threshold,
                config.borrow_interest_rate,
                config.lending_supply_interest_rate,
            ),
            funds: UnusedFunds::default(),
        };

        info!(
            capital = %config.initial_capital,
            %price,
            %collateral,
            %borrowed,
            %amm_reserve_y,
            "Strategy initialized"
        );

        Ok(Self {
            oracle,
            state,
            ideal_ratio: config.ideal_ratio,
            swap_fee: config.swap_fee,
            interest_period_minutes: config.interest_period_minutes,
            rebalance_threshold: config.rebalance_threshold,
            liquidity_add_threshold: config.liquidity_add_threshold,
            total_rebalances: 0,
            last_rebalance_price: price,
            total_amm_yield: Decimal::ZERO,
        })
    }

    /// Advance one tick: move the oracle, accrue one interest period on both
    /// positions and rebalance if the AMM drifted past the threshold.
    ///
    /// A non-positive price is rejected before any state changes. Insolvency
    /// and internal inconsistencies are fatal for the run.
    pub fn next_price(&mut self, price: Decimal) -> Result<StrategyStatus, StrategyError> {
        ensure_positive(price)?;
        self.oracle.set_price(price)?;

        self.state
            .lending
            .accrue_interest(price, self.interest_period_minutes)?;

        let amm_yield = floor_value(
            self.state
                .amm
                .generate_yield(price, self.interest_period_minutes),
        );
        self.state.funds.usdt += amm_yield;
        self.total_amm_yield += amm_yield;

        self.rebalance()?;

        Ok(self.status())
    }

    /// Whether the AMM reserve Y deviation exceeds the rebalance threshold.
    pub fn needs_rebalance(&self) -> bool {
        let price = self.price();
        let ideal = self.ideal_setup();
        self.state.amm_deviation_ratio(price, &ideal) > self.rebalance_threshold
    }

    /// Run the six-step rebalance if needed. Returns `false` without touching
    /// any state when the strategy is within threshold.
    pub fn rebalance(&mut self) -> Result<bool, StrategyError> {
        if !self.needs_rebalance() {
            return Ok(false);
        }

        let price = self.price();
        let value_before = self.total_value();
        let ctx = RebalanceContext {
            price,
            ideal_ratio: self.ideal_ratio,
            swap_fee: self.swap_fee,
            liquidity_add_threshold: self.liquidity_add_threshold,
        };

        debug!(
            %price,
            deviation = %self.deviations().amm_reserve_y,
            "AMM deviation above threshold, rebalancing"
        );

        self.state = rebalancer::rebalance(self.state.clone(), &ctx)?;
        self.total_rebalances += 1;
        self.last_rebalance_price = price;

        info!(
            %price,
            value_before = %value_before,
            value_after = %self.total_value(),
            rebalances = self.total_rebalances,
            "Rebalance complete"
        );

        Ok(true)
    }

    pub fn price(&self) -> Decimal {
        self.oracle.price()
    }

    pub fn state(&self) -> &StrategyState {
        &self.state
    }

    pub fn total_value(&self) -> Decimal {
        self.state.total_value(self.price())
    }

    pub fn ideal_setup(&self) -> IdealSetup {
        self.state.ideal_setup(self.price(), self.ideal_ratio)
    }

    pub fn deviations(&self) -> Deviations {
        self.state.deviations(self.price(), &self.ideal_setup())
    }

    pub fn total_rebalances(&self) -> u64 {
        self.total_rebalances
    }

    pub fn last_rebalance_price(&self) -> Decimal {
        self.last_rebalance_price
    }

    /// USDT credited from AMM yield since construction.
    pub fn total_amm_yield(&self) -> Decimal {
        self.total_amm_yield
    }

    /// Value lost to swap fees since construction.
    pub fn total_swap_fees(&self) -> Decimal {
        self.state.funds.swap_fees_paid
    }

    /// Snapshot of every reported quantity at the current price.
    pub fn status(&self) -> StrategyStatus {
        let price = self.price();
        let lending = &self.state.lending;
        let (amm_reserve_x, amm_reserve_y) = self.state.amm.reserves_at(price);
        let ideal = self.ideal_setup();
        let deviations = self.state.deviations(price, &ideal);

        StrategyStatus {
            price,
            lending_total_value: lending.position_value(price),
            lending_collateral: lending.collateral,
            lending_debt: lending.debt,
            lending_debt_value: lending.debt_value(price),
            lending_utilization: lending.utilization(price),
            amm_value: self.state.amm.estimate_value(price),
            amm_reserve_x,
            amm_reserve_y,
            total_value: self.state.total_value(price),
            unused_ton: self.state.funds.ton,
            unused_usdt: self.state.funds.usdt,
            ideal_lending_collateral: ideal.lending_collateral,
            ideal_borrow_amount: ideal.borrow_amount,
            ideal_amm_reserve_y: ideal.amm_reserve_y,
            deviation_lending_collateral: deviations.lending_collateral,
            deviation_borrow_amount: deviations.borrow_amount,
            deviation_amm_reserve_y: deviations.amm_reserve_y,
            last_rebalance_price: self.last_rebalance_price,
            total_rebalances: self.total_rebalances,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::rebalancer::VALUE_EPSILON;
    use rust_decimal_macros::dec;

    fn test_config() -> StrategyConfig {
        StrategyConfig {
            initial_capital: dec!(1000000),
            ideal_ratio: dec!(0.33),
            amm_supply_interest_rate: dec!(0.1),
            borrow_interest_rate: dec!(0.05),
            lending_supply_interest_rate: dec!(0.03),
            liquidation_threshold: dec!(1.5),
            initial_price: dec!(2.00),
            swap_fee: dec!(0.003),
            interest_period_minutes: 5,
            rebalance_threshold: dec!(0.1),
            liquidity_add_threshold: dec!(0.05),
        }
    }

    fn close(a: Decimal, b: Decimal) -> bool {
        (a - b).abs() < dec!(0.000001)
    }

    #[test]
    fn test_initial_split() {
        let strategy = Strategy::new(&test_config()).unwrap();
        let state = strategy.state();

        assert_eq!(state.lending.collateral, dec!(670000));
        assert_eq!(state.lending.debt, dec!(165000));
        assert_eq!(state.amm.anchor(), (dec!(165000), dec!(330000)));

        let status = strategy.status();
        assert!(close(status.amm_reserve_x, dec!(165000)));
        assert!(close(status.amm_reserve_y, dec!(330000)));
        assert!(close(status.total_value, dec!(1000000)));
        assert!(close(status.ideal_lending_collateral, dec!(670000)));
        assert!(close(status.ideal_borrow_amount, dec!(165000)));
        assert_eq!(status.total_rebalances, 0);
        assert_eq!(status.last_rebalance_price, dec!(2));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = test_config();
        config.ideal_ratio = dec!(0);
        assert!(matches!(
            Strategy::new(&config),
            Err(StrategyError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_non_positive_price_leaves_state_untouched() {
        let mut strategy = Strategy::new(&test_config()).unwrap();
        let before = strategy.status();

        assert_eq!(
            strategy.next_price(dec!(0)),
            Err(StrategyError::InvalidPrice(dec!(0)))
        );
        assert!(strategy.next_price(dec!(-2.5)).is_err());

        assert_eq!(strategy.status(), before);
        assert_eq!(strategy.state().lending.debt, dec!(165000));
    }

    #[test]
    fn test_constant_price_accrues_without_rebalancing() {
        let mut strategy = Strategy::new(&test_config()).unwrap();
        let mut last = strategy.status();

        for _ in 0..50 {
            let status = strategy.next_price(dec!(2.00)).unwrap();
            assert!(status.lending_collateral > last.lending_collateral);
            assert!(status.lending_debt > last.lending_debt);
            assert!(status.unused_usdt > last.unused_usdt);
            last = status;
        }

        assert_eq!(strategy.total_rebalances(), 0);
        assert!(strategy.total_amm_yield() > Decimal::ZERO);
    }

    #[test]
    fn test_amm_yield_is_floored_to_value_scale() {
        let mut strategy = Strategy::new(&test_config()).unwrap();

        for _ in 0..3 {
            strategy.next_price(dec!(2.00)).unwrap();
        }

        // 660000 * 0.1 * 5 / 525600 = 0.62785388... per tick
        assert_eq!(strategy.total_amm_yield(), dec!(1.883559));
        assert_eq!(
            strategy.total_amm_yield(),
            floor_value(strategy.total_amm_yield())
        );
        assert_eq!(strategy.state().funds.usdt, dec!(1.883559));
    }

    #[test]
    fn test_rebalance_is_noop_within_threshold() {
        let mut strategy = Strategy::new(&test_config()).unwrap();
        strategy.next_price(dec!(2.05)).unwrap();
        let before = strategy.status();

        assert!(!strategy.needs_rebalance());
        assert!(!strategy.rebalance().unwrap());
        assert_eq!(strategy.status(), before);
        assert_eq!(strategy.total_rebalances(), 0);
    }

    #[test]
    fn test_price_jump_triggers_single_rebalance() {
        let mut strategy = Strategy::new(&test_config()).unwrap();
        let value_at_start = strategy.total_value();

        let status = strategy.next_price(dec!(2.50)).unwrap();

        assert_eq!(status.total_rebalances, 1);
        assert_eq!(status.last_rebalance_price, dec!(2.50));
        // The jump itself costs value (impermanent loss plus the short TON
        // leg); yield and interest for one tick are a few USDT at most.
        assert!(status.total_value <= value_at_start + dec!(10));
        assert!(
            (status.deviation_amm_reserve_y / status.amm_reserve_y).abs() <= dec!(0.1)
        );

        // Holding the new price does not trigger again
        let status = strategy.next_price(dec!(2.50)).unwrap();
        assert_eq!(status.total_rebalances, 1);
    }

    #[test]
    fn test_rebalance_never_creates_value() {
        let mut strategy = Strategy::new(&test_config()).unwrap();

        for price in [dec!(2.5), dec!(1.9), dec!(1.5), dec!(1.8), dec!(2.2), dec!(2.6)] {
            strategy.oracle.set_price(price).unwrap();
            let value_before = strategy.total_value();
            let rebalanced = strategy.rebalance().unwrap();

            assert!(strategy.total_value() <= value_before + VALUE_EPSILON);
            if rebalanced {
                assert!(!strategy.needs_rebalance());
            }
        }

        assert!(strategy.total_rebalances() >= 4);
        assert!(strategy.total_swap_fees() > Decimal::ZERO);
    }

    #[test]
    fn test_runaway_price_is_insolvent() {
        let mut config = test_config();
        config.rebalance_threshold = dec!(10); // never rebalance

        let mut strategy = Strategy::new(&config).unwrap();
        let err = strategy.next_price(dec!(3.00)).unwrap_err();

        assert!(err.is_fatal());
        assert!(matches!(err, StrategyError::Insolvency { .. }));
    }

    #[test]
    fn test_identical_inputs_are_deterministic() {
        let prices = [dec!(2.01), dec!(2.3), dec!(2.61), dec!(2.2), dec!(1.7), dec!(1.95)];

        let run = || {
            let mut strategy = Strategy::new(&test_config()).unwrap();
            prices
                .iter()
                .map(|p| strategy.next_price(*p).unwrap())
                .collect::<Vec<_>>()
        };

        assert_eq!(run(), run());
    }
}
