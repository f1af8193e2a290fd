//! Configuration management for the LP farmer.
//!
//! Loads settings from environment variables and config files.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Strategy parameters
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Backtest driver settings
    #[serde(default)]
    pub backtest: BacktestSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Starting capital in USDT
    #[serde(default = "default_initial_capital")]
    pub initial_capital: Decimal,
    /// Fraction of total value held as AMM reserve Y (0.0-1.0, exclusive)
    #[serde(default = "default_ideal_ratio")]
    pub ideal_ratio: Decimal,
    /// Annualized yield on AMM position value
    #[serde(default = "default_amm_supply_interest_rate")]
    pub amm_supply_interest_rate: Decimal,
    /// Annualized interest on TON debt
    #[serde(default = "default_borrow_interest_rate")]
    pub borrow_interest_rate: Decimal,
    /// Annualized interest on USDT collateral
    #[serde(default = "default_lending_supply_interest_rate")]
    pub lending_supply_interest_rate: Decimal,
    /// Collateral / debt value ratio at which the lending position is liquidated (> 1)
    #[serde(default = "default_liquidation_threshold")]
    pub liquidation_threshold: Decimal,
    /// TON price at construction
    #[serde(default = "default_initial_price")]
    pub initial_price: Decimal,
    /// Proportional fee charged on swap output (0.0-1.0, exclusive of 1)
    #[serde(default = "default_swap_fee")]
    pub swap_fee: Decimal,
    /// Minutes of interest accrued per tick; should match the price series spacing
    #[serde(default = "default_interest_period_minutes")]
    pub interest_period_minutes: u32,
    /// Relative AMM reserve Y deviation that triggers a rebalance
    #[serde(default = "default_rebalance_threshold")]
    pub rebalance_threshold: Decimal,
    /// Relative AMM reserve Y shortfall that makes a rebalance add liquidity
    #[serde(default = "default_liquidity_add_threshold")]
    pub liquidity_add_threshold: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestSettings {
    /// Keep every per-tick snapshot (needed for CSV export)
    #[serde(default = "default_record_snapshots")]
    pub record_snapshots: bool,
    /// Log progress every N ticks
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
}

// Default value functions
fn default_initial_capital() -> Decimal {
    Decimal::new(1_000_000, 0) // 1M USDT
}

fn default_ideal_ratio() -> Decimal {
    Decimal::new(33, 2) // 0.33
}

fn default_amm_supply_interest_rate() -> Decimal {
    Decimal::new(10, 2) // 10% APY
}

fn default_borrow_interest_rate() -> Decimal {
    Decimal::new(5, 2) // 5% APR
}

fn default_lending_supply_interest_rate() -> Decimal {
    Decimal::new(3, 2) // 3% APY
}

fn default_liquidation_threshold() -> Decimal {
    Decimal::new(15, 1) // 1.5
}

fn default_initial_price() -> Decimal {
    Decimal::new(2, 0)
}

fn default_swap_fee() -> Decimal {
    Decimal::new(3, 3) // 0.003 (0.3%)
}

fn default_interest_period_minutes() -> u32 {
    5 // Matches 5-minute candles
}

fn default_rebalance_threshold() -> Decimal {
    Decimal::new(10, 2) // 0.10
}

fn default_liquidity_add_threshold() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

fn default_record_snapshots() -> bool {
    true
}

fn default_progress_interval() -> usize {
    10_000
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("LPF"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        self.strategy.validate()?;

        anyhow::ensure!(
            self.backtest.progress_interval > 0,
            "progress_interval must be positive"
        );

        Ok(())
    }
}

impl StrategyConfig {
    /// Validate strategy parameters.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.initial_capital > Decimal::ZERO,
            "initial_capital must be positive"
        );

        anyhow::ensure!(
            self.ideal_ratio > Decimal::ZERO && self.ideal_ratio < Decimal::ONE,
            "ideal_ratio must be between 0 and 1 (exclusive)"
        );

        anyhow::ensure!(
            self.amm_supply_interest_rate >= Decimal::ZERO
                && self.borrow_interest_rate >= Decimal::ZERO
                && self.lending_supply_interest_rate >= Decimal::ZERO,
            "interest rates must be non-negative"
        );

        anyhow::ensure!(
            self.liquidation_threshold > Decimal::ONE,
            "liquidation_threshold must be greater than 1"
        );

        anyhow::ensure!(
            self.initial_price > Decimal::ZERO,
            "initial_price must be positive"
        );

        anyhow::ensure!(
            self.swap_fee >= Decimal::ZERO && self.swap_fee < Decimal::ONE,
            "swap_fee must be in [0, 1)"
        );

        anyhow::ensure!(
            self.interest_period_minutes > 0,
            "interest_period_minutes must be positive"
        );

        anyhow::ensure!(
            self.rebalance_threshold > Decimal::ZERO
                && self.liquidity_add_threshold >= Decimal::ZERO,
            "rebalance thresholds must be positive"
        );

        Ok(())
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            initial_capital: default_initial_capital(),
            ideal_ratio: default_ideal_ratio(),
            amm_supply_interest_rate: default_amm_supply_interest_rate(),
            borrow_interest_rate: default_borrow_interest_rate(),
            lending_supply_interest_rate: default_lending_supply_interest_rate(),
            liquidation_threshold: default_liquidation_threshold(),
            initial_price: default_initial_price(),
            swap_fee: default_swap_fee(),
            interest_period_minutes: default_interest_period_minutes(),
            rebalance_threshold: default_rebalance_threshold(),
            liquidity_add_threshold: default_liquidity_add_threshold(),
        }
    }
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            record_snapshots: default_record_snapshots(),
            progress_interval: default_progress_interval(),
        }
    }
}
