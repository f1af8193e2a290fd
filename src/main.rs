//! LP Farmer - Main Entry Point
//!
//! Backtests and parameter sweeps for the leveraged LP strategy.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use lp_farmer::backtest::{
    BacktestEngine, ParameterSpace, PriceSeries, PriceSource, SeriesFormat, SweepRunner,
};
use lp_farmer::config::Config;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::Path;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// LP Farmer CLI
#[derive(Parser)]
#[command(name = "lp-farmer")]
#[command(version, about = "Leveraged TON/USDT liquidity provision simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a backtest simulation on historical prices
    Backtest {
        #[command(flatten)]
        data: DataArgs,

        /// Output directory for results
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Run a parameter sweep optimization
    Sweep {
        #[command(flatten)]
        data: DataArgs,

        /// Number of parallel backtests
        #[arg(short, long, default_value = "4")]
        parallelism: usize,

        /// Output directory for results
        #[arg(short, long)]
        output: Option<String>,

        /// Use minimal parameter space (faster, for testing)
        #[arg(long)]
        minimal: bool,
    },
}

#[derive(clap::Args)]
struct DataArgs {
    /// Path to the price file
    #[arg(short, long)]
    data: String,

    /// Price file format (guessed from the extension when omitted)
    #[arg(short, long, value_enum)]
    format: Option<DataFormat>,

    /// Start date (YYYY-MM-DD)
    #[arg(short, long)]
    start: Option<String>,

    /// End date (YYYY-MM-DD, inclusive)
    #[arg(short, long)]
    end: Option<String>,

    /// Initial capital in USDT (overrides configuration)
    #[arg(short = 'c', long)]
    capital: Option<Decimal>,
}

#[derive(Clone, Copy, ValueEnum)]
enum DataFormat {
    Csv,
    Json,
}

impl From<DataFormat> for SeriesFormat {
    fn from(format: DataFormat) -> Self {
        match format {
            DataFormat::Csv => SeriesFormat::Csv,
            DataFormat::Json => SeriesFormat::Json,
        }
    }
}

/// Everything a run needs once arguments and configuration are resolved.
struct RunInputs {
    config: Config,
    series: PriceSeries,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    init_logging()?;

    match cli.command {
        Commands::Backtest { data, output } => run_backtest(data, output.as_deref()),
        Commands::Sweep {
            data,
            parallelism,
            output,
            minimal,
        } => run_sweep(data, parallelism, output.as_deref(), minimal).await,
    }
}

fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // File appender for detailed logs
    let file_appender = tracing_appender::rolling::hourly("logs", "lp-farmer.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(_guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("lp_farmer=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    let strategy = &config.strategy;
    info!("📋 Configuration:");
    info!("   Initial Capital: ${}", strategy.initial_capital);
    info!("   Initial Price: {}", strategy.initial_price);
    info!("   Ideal AMM Ratio: {:.0}%", strategy.ideal_ratio * dec!(100));
    info!("   Swap Fee: {:.2}%", strategy.swap_fee * dec!(100));
    info!("   Liquidation Threshold: {}", strategy.liquidation_threshold);
    info!(
        "   Rates: AMM {:.1}% | Borrow {:.1}% | Supply {:.1}%",
        strategy.amm_supply_interest_rate * dec!(100),
        strategy.borrow_interest_rate * dec!(100),
        strategy.lending_supply_interest_rate * dec!(100)
    );
    info!(
        "   Rebalance Threshold: {:.0}% (add liquidity above {:.0}%)",
        strategy.rebalance_threshold * dec!(100),
        strategy.liquidity_add_threshold * dec!(100)
    );
    info!(
        "   Interest Period: {} min",
        strategy.interest_period_minutes
    );
}

/// Load configuration and price data, applying CLI overrides.
fn prepare(args: DataArgs) -> Result<RunInputs> {
    let start = args
        .start
        .as_deref()
        .map(|s| parse_date(s, NaiveTime::MIN))
        .transpose()?;
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).context("Invalid end-of-day time")?;
    let end = args
        .end
        .as_deref()
        .map(|s| parse_date(s, end_of_day))
        .transpose()?;

    let mut config = Config::load()?;
    if let Some(capital) = args.capital {
        config.strategy.initial_capital = capital;
    }
    config.validate()?;
    log_config(&config);

    let path = Path::new(&args.data);
    let format = args
        .format
        .map(SeriesFormat::from)
        .unwrap_or_else(|| SeriesFormat::from_path(path));

    info!("📊 Loading data from: {}", args.data);
    let series = PriceSeries::load(path, format)?;

    if let Some((data_start, data_end)) = series.available_range() {
        info!(
            "   Data range: {} to {}",
            data_start.format("%Y-%m-%d %H:%M"),
            data_end.format("%Y-%m-%d %H:%M")
        );
    }
    info!("   Ticks: {}", series.len());

    Ok(RunInputs {
        config,
        series,
        start,
        end,
    })
}

fn parse_date(raw: &str, time: NaiveTime) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("Invalid date '{}': {}", raw, e))?;
    Ok(date.and_time(time).and_utc())
}

/// Run a single backtest.
fn run_backtest(args: DataArgs, output_dir: Option<&str>) -> Result<()> {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║              BACKTEST MODE                                 ║");
    info!("╚════════════════════════════════════════════════════════════╝");

    let inputs = prepare(args)?;

    let engine = BacktestEngine::new(
        inputs.series,
        inputs.config.strategy.clone(),
        inputs.config.backtest.clone(),
    );
    let result = engine.run(inputs.start, inputs.end)?;

    // Print results
    println!("\n{}", result.summary());

    // Save results if output directory specified
    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir))?;

        let equity_path = format!("{}/equity_curve.csv", dir);
        result.equity_to_csv(&equity_path)?;
        info!("📁 Equity curve saved to: {}", equity_path);

        if !result.snapshots.is_empty() {
            let snapshot_path = format!("{}/snapshots.csv", dir);
            result.snapshots_to_csv(&snapshot_path)?;
            info!("📁 Snapshots saved to: {}", snapshot_path);
        }
    }

    Ok(())
}

/// Run a parameter sweep optimization.
async fn run_sweep(
    args: DataArgs,
    parallelism: usize,
    output_dir: Option<&str>,
    minimal: bool,
) -> Result<()> {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!("║           PARAMETER SWEEP MODE                             ║");
    info!("╚════════════════════════════════════════════════════════════╝");

    let inputs = prepare(args)?;

    // Create parameter space
    let param_space = if minimal {
        info!("🔧 Using minimal parameter space (quick test)");
        ParameterSpace::minimal()
    } else {
        info!("🔧 Using full parameter space");
        ParameterSpace::default()
    };

    info!("   Combinations to test: {}", param_space.combination_count());
    info!("⚡ Parallelism: {}", parallelism);

    // Snapshots are not needed to rank runs
    let mut settings = inputs.config.backtest.clone();
    settings.record_snapshots = false;

    let runner = SweepRunner::new(
        param_space,
        inputs.config.strategy.clone(),
        settings,
        parallelism,
    );
    let results = runner.run(inputs.series, inputs.start, inputs.end).await?;

    // Print summary
    println!("\n{}", results.summary());

    // Save results if output directory specified
    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir))?;

        let results_path = format!("{}/sweep_results.csv", dir);
        results.to_csv(&results_path)?;
        info!("📁 Sweep results saved to: {}", results_path);
    }

    Ok(())
}
