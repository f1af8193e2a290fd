//! Parameter sweep runner for backtesting optimization.
//!
//! Allows testing multiple strategy configurations in parallel.

use crate::backtest::{BacktestEngine, BacktestResult, PriceSource};
use crate::config::{BacktestSettings, StrategyConfig};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Defines the parameter space to explore during optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpace {
    pub ideal_ratio: Vec<Decimal>,
    pub swap_fee: Vec<Decimal>,
    pub liquidation_threshold: Vec<Decimal>,
    pub rebalance_threshold: Vec<Decimal>,
}

impl Default for ParameterSpace {
    fn default() -> Self {
        Self {
            ideal_ratio: vec![dec!(0.25), dec!(0.33), dec!(0.40), dec!(0.50)],
            swap_fee: vec![dec!(0.001), dec!(0.003)],
            liquidation_threshold: vec![dec!(1.2), dec!(1.5), dec!(2.0)],
            rebalance_threshold: vec![dec!(0.05), dec!(0.10), dec!(0.20)],
        }
    }
}

impl ParameterSpace {
    /// Create a minimal parameter space for quick testing.
    pub fn minimal() -> Self {
        Self {
            ideal_ratio: vec![dec!(0.33)],
            swap_fee: vec![dec!(0.003)],
            liquidation_threshold: vec![dec!(1.5)],
            rebalance_threshold: vec![dec!(0.10)],
        }
    }

    /// Count total number of combinations.
    pub fn combination_count(&self) -> usize {
        self.ideal_ratio.len()
            * self.swap_fee.len()
            * self.liquidation_threshold.len()
            * self.rebalance_threshold.len()
    }

    /// Generate all config combinations.
    pub fn generate_configs(&self, base_config: &StrategyConfig) -> Vec<StrategyConfig> {
        let mut configs = Vec::with_capacity(self.combination_count());

        for &ideal_ratio in &self.ideal_ratio {
            for &swap_fee in &self.swap_fee {
                for &liquidation_threshold in &self.liquidation_threshold {
                    for &rebalance_threshold in &self.rebalance_threshold {
                        let mut config = base_config.clone();
                        config.ideal_ratio = ideal_ratio;
                        config.swap_fee = swap_fee;
                        config.liquidation_threshold = liquidation_threshold;
                        config.rebalance_threshold = rebalance_threshold;
                        configs.push(config);
                    }
                }
            }
        }

        configs
    }

    /// Describe a config's parameter values.
    pub fn describe_config(config: &StrategyConfig) -> String {
        format!(
            "ratio={:.0}% fee={:.2}% liq={} rebal={:.0}%",
            config.ideal_ratio * dec!(100),
            config.swap_fee * dec!(100),
            config.liquidation_threshold,
            config.rebalance_threshold * dec!(100),
        )
    }
}

/// Results from a parameter sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResults {
    /// All individual run results
    pub runs: Vec<(StrategyConfig, BacktestResult)>,

    /// Best completed run by Sharpe ratio
    pub best_by_sharpe: Option<usize>,

    /// Best completed run by total return
    pub best_by_return: Option<usize>,

    /// Best completed run by Calmar ratio (return/drawdown)
    pub best_by_calmar: Option<usize>,

    /// Total combinations tested
    pub total_combinations: usize,

    /// Runs that processed every tick
    pub successful_runs: usize,

    /// Runs stopped by insolvency or an internal inconsistency
    pub terminated_runs: usize,

    /// Runs that could not start
    pub failed_runs: usize,
}

impl SweepResults {
    /// Rank runs and count outcomes.
    fn from_runs(
        runs: Vec<(StrategyConfig, BacktestResult)>,
        total_combinations: usize,
        failed_runs: usize,
    ) -> Self {
        let completed = || runs.iter().enumerate().filter(|(_, (_, r))| r.completed());

        let best_by_sharpe = completed()
            .max_by_key(|(_, (_, r))| r.metrics.sharpe_ratio)
            .map(|(i, _)| i);
        let best_by_return = completed()
            .max_by_key(|(_, (_, r))| r.metrics.total_return_pct)
            .map(|(i, _)| i);
        let best_by_calmar = completed()
            .max_by_key(|(_, (_, r))| r.metrics.calmar_ratio)
            .map(|(i, _)| i);

        let successful_runs = completed().count();
        let terminated_runs = runs.len() - successful_runs;

        Self {
            runs,
            best_by_sharpe,
            best_by_return,
            best_by_calmar,
            total_combinations,
            successful_runs,
            terminated_runs,
            failed_runs,
        }
    }

    /// Get the best result by Sharpe ratio.
    pub fn best_sharpe(&self) -> Option<&(StrategyConfig, BacktestResult)> {
        self.best_by_sharpe.map(|i| &self.runs[i])
    }

    /// Get the best result by total return.
    pub fn best_return(&self) -> Option<&(StrategyConfig, BacktestResult)> {
        self.best_by_return.map(|i| &self.runs[i])
    }

    /// Get the best result by Calmar ratio.
    pub fn best_calmar(&self) -> Option<&(StrategyConfig, BacktestResult)> {
        self.best_by_calmar.map(|i| &self.runs[i])
    }

    /// Export results to CSV.
    pub fn to_csv(&self, path: &str) -> Result<()> {
        use std::io::Write;
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path))?;

        // Header
        writeln!(
            file,
            "ideal_ratio,swap_fee,liquidation_threshold,rebalance_threshold,completed,ticks_processed,total_return_pct,sharpe_ratio,sortino_ratio,calmar_ratio,max_dd_pct,amm_yield,swap_fees,rebalances"
        )?;

        // Data rows
        for (config, result) in &self.runs {
            writeln!(
                file,
                "{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
                config.ideal_ratio,
                config.swap_fee,
                config.liquidation_threshold,
                config.rebalance_threshold,
                result.completed(),
                result.ticks_processed,
                result.metrics.total_return_pct,
                result.metrics.sharpe_ratio,
                result.metrics.sortino_ratio,
                result.metrics.calmar_ratio,
                result.metrics.max_drawdown * dec!(100),
                result.metrics.total_amm_yield,
                result.metrics.total_swap_fees,
                result.metrics.total_rebalances,
            )?;
        }

        Ok(())
    }

    /// Generate a summary comparison table.
    pub fn summary(&self) -> String {
        let mut s = String::new();

        s.push_str("═══════════════════════════════════════════════════════════════\n");
        s.push_str("PARAMETER SWEEP RESULTS\n");
        s.push_str("═══════════════════════════════════════════════════════════════\n");
        s.push_str(&format!(
            "Total: {} | Completed: {} | Terminated: {} | Failed: {}\n\n",
            self.total_combinations, self.successful_runs, self.terminated_runs, self.failed_runs
        ));

        if let Some((config, result)) = self.best_sharpe() {
            s.push_str("BEST BY SHARPE RATIO:\n");
            s.push_str(&format!("  Config: {}\n", ParameterSpace::describe_config(config)));
            s.push_str(&format!(
                "  Sharpe: {:.3} | Return: {:.2}% | MaxDD: {:.2}%\n\n",
                result.metrics.sharpe_ratio,
                result.metrics.total_return_pct,
                result.metrics.max_drawdown * dec!(100)
            ));
        }

        if let Some((config, result)) = self.best_return() {
            s.push_str("BEST BY RETURN:\n");
            s.push_str(&format!("  Config: {}\n", ParameterSpace::describe_config(config)));
            s.push_str(&format!(
                "  Return: {:.2}% | Sharpe: {:.3} | Rebalances: {}\n\n",
                result.metrics.total_return_pct,
                result.metrics.sharpe_ratio,
                result.metrics.total_rebalances
            ));
        }

        if let Some((config, result)) = self.best_calmar() {
            s.push_str("BEST BY CALMAR RATIO:\n");
            s.push_str(&format!("  Config: {}\n", ParameterSpace::describe_config(config)));
            s.push_str(&format!(
                "  Calmar: {:.3} | Return: {:.2}% | MaxDD: {:.2}%\n",
                result.metrics.calmar_ratio,
                result.metrics.total_return_pct,
                result.metrics.max_drawdown * dec!(100)
            ));
        }

        s.push_str("═══════════════════════════════════════════════════════════════\n");

        s
    }
}

/// Parameter sweep runner for parallel backtesting.
pub struct SweepRunner {
    parameter_space: ParameterSpace,
    base_config: StrategyConfig,
    settings: BacktestSettings,
    parallelism: usize,
}

impl SweepRunner {
    /// Create a new sweep runner.
    pub fn new(
        parameter_space: ParameterSpace,
        base_config: StrategyConfig,
        settings: BacktestSettings,
        parallelism: usize,
    ) -> Self {
        Self {
            parameter_space,
            base_config,
            settings,
            parallelism: parallelism.max(1),
        }
    }

    /// Run the parameter sweep.
    ///
    /// Each combination runs on the blocking pool with its own strategy;
    /// at most `parallelism` runs are in flight.
    pub async fn run<S: PriceSource + Send + Sync + 'static>(
        &self,
        source: S,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<SweepResults> {
        let configs = self.parameter_space.generate_configs(&self.base_config);
        let total_combinations = configs.len();

        info!(
            "Starting parameter sweep with {} combinations, parallelism={}",
            total_combinations, self.parallelism
        );

        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let source = Arc::new(source);

        let mut handles = Vec::with_capacity(configs.len());

        for (i, config) in configs.into_iter().enumerate() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .context("Sweep semaphore closed")?;
            let source = source.clone();
            let settings = self.settings.clone();

            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;

                info!(
                    "[{}/{}] Testing: {}",
                    i + 1,
                    total_combinations,
                    ParameterSpace::describe_config(&config)
                );

                let engine = BacktestEngine::new(source, config.clone(), settings);

                match engine.run(start, end) {
                    Ok(result) => {
                        info!(
                            "[{}/{}] Complete: Sharpe={:.3} Return={:.2}% Rebalances={}",
                            i + 1,
                            total_combinations,
                            result.metrics.sharpe_ratio,
                            result.metrics.total_return_pct,
                            result.metrics.total_rebalances
                        );
                        Some((config, result))
                    }
                    Err(e) => {
                        warn!("[{}/{}] Failed: {:#}", i + 1, total_combinations, e);
                        None
                    }
                }
            });

            handles.push(handle);
        }

        // Collect results
        let mut runs = Vec::new();
        let mut failed_runs = 0;

        for handle in handles {
            match handle.await {
                Ok(Some(run)) => runs.push(run),
                Ok(None) => failed_runs += 1,
                Err(e) => {
                    warn!("Task panicked: {}", e);
                    failed_runs += 1;
                }
            }
        }

        Ok(SweepResults::from_runs(runs, total_combinations, failed_runs))
    }
}
