//! Historical price loading for backtesting.
//!
//! Provides CSV and JSON import of `(timestamp, price)` series.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// One observation of the TON price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
}

impl PriceTick {
    pub fn new(timestamp: DateTime<Utc>, price: Decimal) -> Self {
        Self { timestamp, price }
    }
}

/// Trait for loading historical price data.
#[cfg_attr(test, mockall::automock)]
pub trait PriceSource {
    /// Load all ticks in the given time range (inclusive, open-ended when `None`).
    fn load_ticks(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<PriceTick>>;

    /// Get the available date range in the data.
    fn available_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)>;
}

/// Input format of a price file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriesFormat {
    Csv,
    Json,
}

impl SeriesFormat {
    /// Guess the format from a file extension, defaulting to CSV.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SeriesFormat::Json,
            _ => SeriesFormat::Csv,
        }
    }
}

/// In-memory price series, sorted and validated on load.
///
/// Expected CSV format (timestamp as RFC 3339 or unix seconds):
/// ```csv
/// timestamp,price
/// 2024-01-01T00:00:00Z,2.3012
/// 2024-01-01T00:05:00Z,2.3020
/// ```
///
/// JSON is either an array of `{"timestamp": ..., "price": ...}` objects or
/// downloaded candle pairs `[[open_time_ms, "price"], ...]`.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    ticks: Vec<PriceTick>,
}

impl PriceSeries {
    /// Load a series from a file.
    pub fn load<P: AsRef<Path>>(path: P, format: SeriesFormat) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read price file: {}", path.display()))?;

        match format {
            SeriesFormat::Csv => Self::from_csv_content(&content),
            SeriesFormat::Json => Self::from_json_content(&content),
        }
        .with_context(|| format!("Invalid price file: {}", path.display()))
    }

    /// Load a series from CSV content.
    pub fn from_csv_content(content: &str) -> Result<Self> {
        let mut ticks = Vec::new();

        for (line_num, line) in content.lines().enumerate() {
            // Skip header
            if line_num == 0 && line.starts_with("timestamp") {
                continue;
            }

            if line.trim().is_empty() {
                continue;
            }

            let tick = parse_csv_row(line)
                .with_context(|| format!("Failed to parse line {}: {}", line_num + 1, line))?;
            ticks.push(tick);
        }

        Self::from_ticks(ticks)
    }

    /// Load a series from JSON content.
    pub fn from_json_content(content: &str) -> Result<Self> {
        let rows: Vec<JsonRow> =
            serde_json::from_str(content).context("Failed to parse JSON price series")?;

        let ticks = rows
            .into_iter()
            .map(JsonRow::into_tick)
            .collect::<Result<Vec<_>>>()?;

        Self::from_ticks(ticks)
    }

    /// Build a series from ticks, which must be non-empty, positively priced
    /// and strictly increasing in time.
    pub fn from_ticks(ticks: Vec<PriceTick>) -> Result<Self> {
        if ticks.is_empty() {
            anyhow::bail!("Price series contains no data rows");
        }

        for (i, tick) in ticks.iter().enumerate() {
            anyhow::ensure!(
                tick.price > Decimal::ZERO,
                "Non-positive price {} at {}",
                tick.price,
                tick.timestamp
            );

            if i > 0 {
                let prev = &ticks[i - 1];
                anyhow::ensure!(
                    tick.timestamp > prev.timestamp,
                    "Timestamps must be strictly increasing: {} follows {}",
                    tick.timestamp,
                    prev.timestamp
                );
            }
        }

        Ok(Self { ticks })
    }

    pub fn ticks(&self) -> &[PriceTick] {
        &self.ticks
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}

impl PriceSource for PriceSeries {
    fn load_ticks(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<PriceTick>> {
        let filtered = self
            .ticks
            .iter()
            .filter(|t| start.map_or(true, |s| t.timestamp >= s))
            .filter(|t| end.map_or(true, |e| t.timestamp <= e))
            .copied()
            .collect();

        Ok(filtered)
    }

    fn available_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.ticks.first(), self.ticks.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        }
    }
}

impl<T: PriceSource + ?Sized> PriceSource for Arc<T> {
    fn load_ticks(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<PriceTick>> {
        (**self).load_ticks(start, end)
    }

    fn available_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        (**self).available_range()
    }
}

fn parse_csv_row(line: &str) -> Result<PriceTick> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 2 {
        anyhow::bail!("Expected 2 columns (timestamp,price), got {}", parts.len());
    }

    let timestamp = parse_timestamp(parts[0].trim())?;
    let price = parts[1]
        .trim()
        .parse::<Decimal>()
        .with_context(|| format!("Invalid price: {}", parts[1]))?;

    Ok(PriceTick { timestamp, price })
}

/// Parse an RFC 3339 timestamp or integer unix seconds.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(secs) = raw.parse::<i64>() {
        return Utc
            .timestamp_opt(secs, 0)
            .single()
            .with_context(|| format!("Timestamp out of range: {}", raw));
    }

    raw.parse::<DateTime<Utc>>()
        .with_context(|| format!("Invalid timestamp: {}", raw))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonRow {
    Record {
        timestamp: String,
        price: Decimal,
    },
    /// `[open_time_ms, price, ...]` as returned by candle endpoints
    Candle(Vec<serde_json::Value>),
}

impl JsonRow {
    fn into_tick(self) -> Result<PriceTick> {
        match self {
            JsonRow::Record { timestamp, price } => Ok(PriceTick {
                timestamp: parse_timestamp(&timestamp)?,
                price,
            }),
            JsonRow::Candle(values) => {
                anyhow::ensure!(values.len() >= 2, "Candle row needs [time_ms, price]");

                let millis = values[0]
                    .as_i64()
                    .with_context(|| format!("Invalid candle time: {}", values[0]))?;
                let timestamp = Utc
                    .timestamp_millis_opt(millis)
                    .single()
                    .with_context(|| format!("Candle time out of range: {}", millis))?;

                let price = match &values[1] {
                    serde_json::Value::String(s) => s.parse::<Decimal>(),
                    other => other.to_string().parse::<Decimal>(),
                }
                .with_context(|| format!("Invalid candle price: {}", values[1]))?;

                Ok(PriceTick { timestamp, price })
            }
        }
    }
}
