//! Performance metrics calculation for backtesting.
//!
//! Provides Sharpe ratio, Sortino ratio, drawdown analysis, and more.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// A point on the equity curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub total_value: Decimal,
    pub drawdown: Decimal,
    pub total_rebalances: u64,
}

impl EquityPoint {
    /// Create a new equity point.
    pub fn new(
        timestamp: DateTime<Utc>,
        price: Decimal,
        total_value: Decimal,
        total_rebalances: u64,
        peak_value: Decimal,
    ) -> Self {
        let drawdown = if peak_value > Decimal::ZERO {
            ((peak_value - total_value) / peak_value).max(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };

        Self {
            timestamp,
            price,
            total_value,
            drawdown,
            total_rebalances,
        }
    }
}

/// Strategy-level totals fed into [`BacktestMetrics::calculate`].
#[derive(Debug, Clone, Default)]
pub struct RunTotals {
    pub amm_yield: Decimal,
    pub swap_fees: Decimal,
    pub rebalances: u64,
    pub ticks_processed: usize,
}

/// Comprehensive backtest performance metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestMetrics {
    // Returns
    /// Total absolute return (final - initial)
    pub total_return: Decimal,
    /// Total return as percentage
    pub total_return_pct: Decimal,
    /// Annualized return percentage
    pub annualized_return: Decimal,
    /// Price change of TON over the run, as percentage
    pub price_change_pct: Decimal,

    // Risk
    /// Maximum drawdown (fraction)
    pub max_drawdown: Decimal,
    /// Duration of maximum drawdown in hours
    pub max_drawdown_duration_hours: i64,
    /// Annualized volatility (std dev of returns)
    pub volatility: Decimal,

    // Risk-adjusted
    /// Sharpe ratio (assuming 0 risk-free rate)
    pub sharpe_ratio: Decimal,
    /// Sortino ratio (downside deviation only)
    pub sortino_ratio: Decimal,
    /// Calmar ratio (return / max drawdown)
    pub calmar_ratio: Decimal,

    // Strategy-specific
    /// USDT earned from AMM yield
    pub total_amm_yield: Decimal,
    /// Value lost to swap fees while rebalancing
    pub total_swap_fees: Decimal,
    /// Number of rebalances executed
    pub total_rebalances: u64,
    /// Price ticks fed into the strategy
    pub ticks_processed: usize,

    // Time
    /// Backtest duration in days
    pub duration_days: f64,
}

impl BacktestMetrics {
    /// Calculate metrics from the equity curve and strategy totals.
    pub fn calculate(
        equity_curve: &[EquityPoint],
        initial_capital: Decimal,
        totals: &RunTotals,
    ) -> Self {
        if equity_curve.is_empty() {
            return Self::empty();
        }

        let first = &equity_curve[0];
        let last = &equity_curve[equity_curve.len() - 1];

        // Duration
        let duration = last.timestamp - first.timestamp;
        let duration_days = duration.num_seconds() as f64 / 86400.0;
        let duration_years = duration_days / 365.0;

        // Returns
        let total_return = last.total_value - initial_capital;
        let total_return_pct = if initial_capital > Decimal::ZERO {
            total_return / initial_capital * dec!(100)
        } else {
            Decimal::ZERO
        };

        let annualized_return = if duration_years > 0.0 {
            let factor = 1.0 + total_return_pct.to_f64().unwrap_or(0.0) / 100.0;
            let annualized = factor.max(0.0).powf(1.0 / duration_years) - 1.0;
            Decimal::from_f64(annualized * 100.0).unwrap_or(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };

        let price_change_pct = if first.price > Decimal::ZERO {
            (last.price - first.price) / first.price * dec!(100)
        } else {
            Decimal::ZERO
        };

        // Drawdown
        let (max_drawdown, max_dd_duration) = calculate_max_drawdown(equity_curve);

        // Returns for volatility calculation
        let returns = calculate_period_returns(equity_curve);
        let volatility = calculate_volatility(&returns, duration_years);

        // Risk-adjusted metrics
        let sharpe_ratio = calculate_sharpe(&returns, duration_years);
        let sortino_ratio = calculate_sortino(&returns, duration_years);
        let calmar_ratio = if max_drawdown > Decimal::ZERO {
            annualized_return / (max_drawdown * dec!(100))
        } else {
            Decimal::ZERO
        };

        Self {
            total_return,
            total_return_pct,
            annualized_return,
            price_change_pct,
            max_drawdown,
            max_drawdown_duration_hours: max_dd_duration,
            volatility,
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            total_amm_yield: totals.amm_yield,
            total_swap_fees: totals.swap_fees,
            total_rebalances: totals.rebalances,
            ticks_processed: totals.ticks_processed,
            duration_days,
        }
    }

    /// Create empty metrics (for error cases).
    pub fn empty() -> Self {
        Self {
            total_return: Decimal::ZERO,
            total_return_pct: Decimal::ZERO,
            annualized_return: Decimal::ZERO,
            price_change_pct: Decimal::ZERO,
            max_drawdown: Decimal::ZERO,
            max_drawdown_duration_hours: 0,
            volatility: Decimal::ZERO,
            sharpe_ratio: Decimal::ZERO,
            sortino_ratio: Decimal::ZERO,
            calmar_ratio: Decimal::ZERO,
            total_amm_yield: Decimal::ZERO,
            total_swap_fees: Decimal::ZERO,
            total_rebalances: 0,
            ticks_processed: 0,
            duration_days: 0.0,
        }
    }

    /// Format metrics as a summary string.
    pub fn summary(&self) -> String {
        format!(
            r#"═══════════════════════════════════════════════
BACKTEST RESULTS ({:.1} days)
═══════════════════════════════════════════════
RETURNS
  Total Return:      ${:.2} ({:.2}%)
  Annualized:        {:.2}%
  TON Price Change:  {:.2}%

RISK
  Max Drawdown:      {:.2}%
  Volatility:        {:.2}%

RISK-ADJUSTED
  Sharpe Ratio:      {:.3}
  Sortino Ratio:     {:.3}
  Calmar Ratio:      {:.3}

STRATEGY
  AMM Yield:         ${:.2}
  Swap Fees:         ${:.2}
  Rebalances:        {}
  Ticks:             {}
═══════════════════════════════════════════════"#,
            self.duration_days,
            self.total_return,
            self.total_return_pct,
            self.annualized_return,
            self.price_change_pct,
            self.max_drawdown * dec!(100),
            self.volatility * dec!(100),
            self.sharpe_ratio,
            self.sortino_ratio,
            self.calmar_ratio,
            self.total_amm_yield,
            self.total_swap_fees,
            self.total_rebalances,
            self.ticks_processed,
        )
    }
}

/// Calculate period returns from equity curve.
fn calculate_period_returns(equity_curve: &[EquityPoint]) -> Vec<Decimal> {
    if equity_curve.len() < 2 {
        return vec![];
    }

    equity_curve
        .windows(2)
        .map(|w| {
            let prev = &w[0];
            let curr = &w[1];
            if prev.total_value > Decimal::ZERO {
                (curr.total_value - prev.total_value) / prev.total_value
            } else {
                Decimal::ZERO
            }
        })
        .collect()
}

/// Calculate maximum drawdown and its duration.
fn calculate_max_drawdown(equity_curve: &[EquityPoint]) -> (Decimal, i64) {
    if equity_curve.is_empty() {
        return (Decimal::ZERO, 0);
    }

    let mut peak = equity_curve[0].total_value;
    let mut max_dd = Decimal::ZERO;
    let mut max_dd_start: Option<DateTime<Utc>> = None;
    let mut max_dd_duration: i64 = 0;
    let mut current_dd_start: Option<DateTime<Utc>> = None;

    for point in equity_curve {
        if point.total_value > peak {
            peak = point.total_value;
            current_dd_start = None;
        } else if peak > Decimal::ZERO {
            let dd = (peak - point.total_value) / peak;
            if current_dd_start.is_none() && dd > Decimal::ZERO {
                current_dd_start = Some(point.timestamp);
            }
            if dd > max_dd {
                max_dd = dd;
                max_dd_start = current_dd_start;
            }
        }

        if let Some(start) = max_dd_start {
            let duration = (point.timestamp - start).num_hours();
            if duration > max_dd_duration {
                max_dd_duration = duration;
            }
        }
    }

    (max_dd, max_dd_duration)
}

fn to_f64_returns(returns: &[Decimal]) -> Vec<f64> {
    returns.iter().map(|r| r.to_f64().unwrap_or(0.0)).collect()
}

/// Calculate annualized volatility from returns.
fn calculate_volatility(returns: &[Decimal], duration_years: f64) -> Decimal {
    if returns.len() < 2 || duration_years <= 0.0 {
        return Decimal::ZERO;
    }

    let returns = to_f64_returns(returns);
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    // Annualize: multiply by sqrt(periods_per_year)
    let periods_per_year = n / duration_years;
    let annualized = std_dev * periods_per_year.sqrt();

    Decimal::from_f64(annualized).unwrap_or(Decimal::ZERO)
}

/// Calculate Sharpe ratio (assuming 0 risk-free rate).
fn calculate_sharpe(returns: &[Decimal], duration_years: f64) -> Decimal {
    if returns.is_empty() || duration_years <= 0.0 {
        return Decimal::ZERO;
    }

    let returns = to_f64_returns(returns);
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    if std_dev < 1e-10 {
        return Decimal::ZERO;
    }

    // Annualize
    let periods_per_year = n / duration_years;
    let annualized_return = mean * periods_per_year;
    let annualized_std = std_dev * periods_per_year.sqrt();

    Decimal::from_f64(annualized_return / annualized_std).unwrap_or(Decimal::ZERO)
}

/// Calculate Sortino ratio (downside deviation only).
fn calculate_sortino(returns: &[Decimal], duration_years: f64) -> Decimal {
    if returns.is_empty() || duration_years <= 0.0 {
        return Decimal::ZERO;
    }

    let returns = to_f64_returns(returns);
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;

    // Downside deviation (negative returns only)
    let downside: Vec<f64> = returns.iter().filter(|&&r| r < 0.0).cloned().collect();

    if downside.is_empty() {
        // No negative returns = infinite Sortino (cap at a large value)
        return dec!(100);
    }

    let downside_variance = downside.iter().map(|r| r.powi(2)).sum::<f64>() / downside.len() as f64;
    let downside_deviation = downside_variance.sqrt();

    if downside_deviation < 1e-10 {
        return dec!(100);
    }

    // Annualize
    let periods_per_year = n / duration_years;
    let annualized_return = mean * periods_per_year;
    let annualized_dd = downside_deviation * periods_per_year.sqrt();

    Decimal::from_f64(annualized_return / annualized_dd).unwrap_or(Decimal::ZERO)
}
