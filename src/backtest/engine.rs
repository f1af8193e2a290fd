//! Backtesting simulation engine.
//!
//! Replays a historical price series through the strategy.

use crate::backtest::metrics::{BacktestMetrics, EquityPoint, RunTotals};
use crate::backtest::{PriceSource, PriceTick};
use crate::config::{BacktestSettings, StrategyConfig};
use crate::strategy::{Strategy, StrategyStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Strategy status observed after a tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub timestamp: DateTime<Utc>,
    pub status: StrategyStatus,
}

/// Complete result of a backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub config: StrategyConfig,
    pub metrics: BacktestMetrics,
    pub equity_curve: Vec<EquityPoint>,
    pub snapshots: Vec<SnapshotRecord>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub ticks_processed: usize,
    /// Reason the run stopped early, if a fatal strategy error occurred
    pub termination: Option<String>,
}

impl BacktestResult {
    /// Whether every loaded tick was processed.
    pub fn completed(&self) -> bool {
        self.termination.is_none()
    }

    /// Export per-tick strategy snapshots to CSV.
    pub fn snapshots_to_csv(&self, path: &str) -> Result<()> {
        use std::io::Write;
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path))?;
        writeln!(file, "timestamp,{}", StrategyStatus::CSV_HEADER)?;

        for record in &self.snapshots {
            writeln!(
                file,
                "{},{}",
                record.timestamp.to_rfc3339(),
                record.status.csv_row()
            )?;
        }

        Ok(())
    }

    /// Export equity curve to CSV.
    pub fn equity_to_csv(&self, path: &str) -> Result<()> {
        use std::io::Write;
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path))?;
        writeln!(file, "timestamp,price,total_value,drawdown,total_rebalances")?;

        for point in &self.equity_curve {
            writeln!(
                file,
                "{},{},{},{},{}",
                point.timestamp.to_rfc3339(),
                point.price,
                point.total_value,
                point.drawdown,
                point.total_rebalances,
            )?;
        }

        Ok(())
    }

    /// Get a summary string.
    pub fn summary(&self) -> String {
        let outcome = match &self.termination {
            Some(reason) => format!("TERMINATED: {}", reason),
            None => "Completed".to_string(),
        };

        format!(
            "{}\n\nBacktest Period: {} to {}\nTicks: {}\nOutcome: {}",
            self.metrics.summary(),
            self.start_time.format("%Y-%m-%d %H:%M"),
            self.end_time.format("%Y-%m-%d %H:%M"),
            self.ticks_processed,
            outcome,
        )
    }
}

/// The backtesting simulation engine.
pub struct BacktestEngine<S: PriceSource> {
    source: S,
    config: StrategyConfig,
    settings: BacktestSettings,
}

impl<S: PriceSource> BacktestEngine<S> {
    /// Create a new backtest engine.
    pub fn new(source: S, config: StrategyConfig, settings: BacktestSettings) -> Self {
        Self {
            source,
            config,
            settings,
        }
    }

    /// Run the backtest over the ticks in `[start, end]`.
    ///
    /// A fatal strategy error stops the run; the ticks processed so far are
    /// still reported and the error is kept in `termination`.
    pub fn run(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<BacktestResult> {
        let ticks = self
            .source
            .load_ticks(start, end)
            .context("Failed to load price ticks")?;
        if ticks.is_empty() {
            anyhow::bail!("No data available for the specified time range");
        }
        ensure_increasing(&ticks)?;

        let first = ticks[0].timestamp;
        let last = ticks[ticks.len() - 1].timestamp;
        info!(
            ticks = ticks.len(),
            from = %first.format("%Y-%m-%d %H:%M"),
            to = %last.format("%Y-%m-%d %H:%M"),
            "Starting backtest"
        );

        // The strategy opens its positions at the first observed price
        let mut config = self.config.clone();
        if config.initial_price != ticks[0].price {
            info!(
                configured = %config.initial_price,
                first_tick = %ticks[0].price,
                "Seeding strategy at first tick price"
            );
            config.initial_price = ticks[0].price;
        }

        let mut strategy = Strategy::new(&config)?;
        let mut peak_value = strategy.total_value();
        let mut equity_curve = Vec::with_capacity(ticks.len());
        let mut snapshots = Vec::new();
        let mut ticks_processed = 0;
        let mut termination = None;
        let mut end_time = first;

        for (i, tick) in ticks.iter().enumerate() {
            let status = match strategy.next_price(tick.price) {
                Ok(status) => status,
                Err(e) if e.is_fatal() => {
                    error!(
                        timestamp = %tick.timestamp,
                        price = %tick.price,
                        error = %e,
                        "Strategy failed, stopping backtest"
                    );
                    termination = Some(format!("{} at {}", e, tick.timestamp.to_rfc3339()));
                    break;
                }
                Err(e) => {
                    warn!(timestamp = %tick.timestamp, error = %e, "Tick rejected");
                    continue;
                }
            };

            ticks_processed += 1;
            end_time = tick.timestamp;

            if status.total_value > peak_value {
                peak_value = status.total_value;
            }
            equity_curve.push(EquityPoint::new(
                tick.timestamp,
                status.price,
                status.total_value,
                status.total_rebalances,
                peak_value,
            ));

            if i > 0 && i % self.settings.progress_interval.max(1) == 0 {
                debug!(
                    "Progress: {}/{} ({:.1}%), Value: ${:.2}, Rebalances: {}",
                    i,
                    ticks.len(),
                    (i as f64 / ticks.len() as f64) * 100.0,
                    status.total_value,
                    status.total_rebalances
                );
            }

            if self.settings.record_snapshots {
                snapshots.push(SnapshotRecord {
                    timestamp: tick.timestamp,
                    status,
                });
            }
        }

        let totals = RunTotals {
            amm_yield: strategy.total_amm_yield(),
            swap_fees: strategy.total_swap_fees(),
            rebalances: strategy.total_rebalances(),
            ticks_processed,
        };
        let metrics =
            BacktestMetrics::calculate(&equity_curve, config.initial_capital, &totals);

        info!(
            final_value = %strategy.total_value(),
            rebalances = totals.rebalances,
            completed = termination.is_none(),
            "Backtest complete"
        );

        Ok(BacktestResult {
            config,
            metrics,
            equity_curve,
            snapshots,
            start_time: first,
            end_time,
            ticks_processed,
            termination,
        })
    }
}

fn ensure_increasing(ticks: &[PriceTick]) -> Result<()> {
    for pair in ticks.windows(2) {
        anyhow::ensure!(
            pair[1].timestamp > pair[0].timestamp,
            "Timestamps must be strictly increasing: {} follows {}",
            pair[1].timestamp,
            pair[0].timestamp
        );
    }
    Ok(())
}
