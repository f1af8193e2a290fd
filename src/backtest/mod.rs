//! Backtesting module for the leveraged LP strategy.
//!
//! This module provides:
//! - Historical price loading (CSV and JSON import)
//! - Tick-by-tick simulation engine
//! - Parameter sweep for optimization
//! - Performance metrics calculation
//!
//! # Example
//!
//! ```rust,ignore
//! use lp_farmer::backtest::{BacktestEngine, PriceSeries, SeriesFormat};
//! use lp_farmer::config::{BacktestSettings, StrategyConfig};
//!
//! let series = PriceSeries::load("data/ton_usdt_5m.csv", SeriesFormat::Csv)?;
//! let engine = BacktestEngine::new(series, StrategyConfig::default(), BacktestSettings::default());
//!
//! let result = engine.run(None, None)?;
//! println!("Return: {:.2}%", result.metrics.total_return_pct);
//! ```

mod data;
mod engine;
mod metrics;
mod runner;

pub use data::{PriceSeries, PriceSource, PriceTick, SeriesFormat};
pub use engine::{BacktestEngine, BacktestResult, SnapshotRecord};
pub use metrics::{BacktestMetrics, EquityPoint, RunTotals};
pub use runner::{ParameterSpace, SweepResults, SweepRunner};
