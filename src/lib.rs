//! # LP Farmer
//!
//! Simulation of a leveraged liquidity-provision strategy on a TON/USDT
//! constant-product pool, with the TON side borrowed against USDT
//! collateral in a lending market.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `strategy`: AMM, lending and unused-funds positions plus the rebalancer
//! - `backtest`: Historical replay, metrics and parameter sweeps
//! - `utils`: Shared utilities and decimal arithmetic

pub mod backtest;
pub mod config;
pub mod strategy;
pub mod utils;

pub use config::Config;
