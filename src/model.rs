//! Canonical data model shared by every exchange source

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A normalized trade, staged per source until the next rollup.
///
/// Every source adapter maps its native payload into this shape. Invariant:
/// `amount > 0`, `price > 0`, price carries 2 decimal places, `created_at`
/// is epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Source-native trade identifier (synthesized when the source has none)
    pub external_key: String,
    pub amount: Decimal,
    pub price: Decimal,
    /// Epoch milliseconds, source-reported or adapter-stamped
    pub created_at: i64,
}

/// A consolidated trade in the aggregated series, tagged with its source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateTrade {
    pub source_id: i64,
    pub amount: f64,
    pub price: f64,
    pub created_at: i64,
}

/// Per-source bucketed VWAP series: `(created_at of latest trade in bucket, VWAP)`.
#[derive(Debug, Clone, Serialize)]
pub struct SourceSeries {
    pub key: String,
    pub values: Vec<(i64, f64)>,
}

/// Windowed statistics over the aggregated series.
///
/// Empty windows yield `null` for the price statistics and zero volume
/// rather than an error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStats {
    pub time_period: i64,
    pub time: i64,
    pub transactions: Vec<SourceSeries>,
    pub std_deviation: Option<f64>,
    pub vwap: Option<f64>,
    pub max: Option<f64>,
    pub min: Option<f64>,
    pub volume: f64,
}
