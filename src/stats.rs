//! Windowed statistics over the aggregated series
//!
//! Answers `query(time, time_period)` with per-source 15-minute bucket VWAP
//! series plus whole-window VWAP, population standard deviation, min/max and
//! volume. Empty windows return sentinels, never an error.

use crate::error::{AggregatorError, Result};
use crate::model::{SourceSeries, WindowStats};
use crate::storage::aggregate::AggregateStore;
use chrono::Utc;

pub struct StatsEngine {
    store: AggregateStore,
}

impl StatsEngine {
    pub fn new(store: AggregateStore) -> Self {
        Self { store }
    }

    /// Compute statistics over `[time - time_period, time]` (epoch ms).
    pub async fn query(&self, time: i64, time_period: i64) -> Result<WindowStats> {
        let start = time - time_period;

        let buckets = self.store.bucket_vwaps(start, time).await?;
        let mut transactions: Vec<SourceSeries> = Vec::new();
        for bucket in buckets {
            match transactions
                .iter()
                .position(|series| series.key == bucket.source)
            {
                Some(i) => transactions[i].values.push((bucket.created_at, bucket.vwap)),
                None => transactions.push(SourceSeries {
                    key: bucket.source,
                    values: vec![(bucket.created_at, bucket.vwap)],
                }),
            }
        }

        let now = Utc::now().timestamp_millis();

        // The unweighted mean centers the dispersion; it is not returned.
        let Some(avg_price) = self.store.avg_price(start, time).await? else {
            return Ok(WindowStats {
                time_period,
                time: now,
                transactions,
                std_deviation: None,
                vwap: None,
                max: None,
                min: None,
                volume: 0.0,
            });
        };

        let summary = self.store.price_summary(start, time, avg_price).await?;
        let std_deviation = if summary.sample_count > 0 {
            let numerator = summary.dev_numerator.unwrap_or(0.0);
            Some((numerator / summary.sample_count as f64).sqrt())
        } else {
            None
        };

        Ok(WindowStats {
            time_period,
            time: now,
            transactions,
            std_deviation,
            vwap: summary.vwap,
            max: summary.max_price,
            min: summary.min_price,
            volume: summary.volume.unwrap_or(0.0),
        })
    }
}

/// Validate caller-supplied window parameters, which arrive as numeric
/// strings. Returns `(time, time_period)` in epoch milliseconds.
pub fn parse_window(time: &str, time_period: &str) -> Result<(i64, i64)> {
    let time: i64 = time
        .parse()
        .map_err(|_| AggregatorError::InvalidQuery(format!("time is not numeric: {time}")))?;
    let time_period: i64 = time_period.parse().map_err(|_| {
        AggregatorError::InvalidQuery(format!("timePeriod is not numeric: {time_period}"))
    })?;

    if time < 0 || time_period < 0 {
        return Err(AggregatorError::InvalidQuery(
            "time and timePeriod must be non-negative".to_string(),
        ));
    }

    Ok((time, time_period))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AggregateTrade;
    use crate::storage::aggregate::BUCKET_MS;
    use crate::storage::Database;

    async fn insert(
        store: &AggregateStore,
        source_id: i64,
        rows: &[(f64, f64, i64)],
    ) {
        let rows: Vec<AggregateTrade> = rows
            .iter()
            .map(|&(amount, price, created_at)| AggregateTrade {
                source_id,
                amount,
                price,
                created_at,
            })
            .collect();
        store.insert_rows(&rows).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_window_returns_sentinels() {
        let db = Database::connect_in_memory().await.unwrap();
        let engine = StatsEngine::new(db.aggregates());

        let stats = engine.query(1_000_000, 10_000).await.unwrap();
        assert!(stats.transactions.is_empty());
        assert!(stats.std_deviation.is_none());
        assert!(stats.vwap.is_none());
        assert!(stats.max.is_none());
        assert!(stats.min.is_none());
        assert_eq!(stats.volume, 0.0);
        assert_eq!(stats.time_period, 10_000);
    }

    #[tokio::test]
    async fn test_bucket_vwap_within_one_bucket() {
        let db = Database::connect_in_memory().await.unwrap();
        let aggregates = db.aggregates();
        let source_id = aggregates.ensure_source("bitstamp").await.unwrap();

        // both trades fall into the same 15-minute bucket
        let t0 = BUCKET_MS * 100;
        insert(
            &aggregates,
            source_id,
            &[(1.0, 100.0, t0), (3.0, 110.0, t0 + 1000)],
        )
        .await;

        let engine = StatsEngine::new(aggregates);
        let stats = engine.query(t0 + 2000, 10_000).await.unwrap();

        assert_eq!(stats.transactions.len(), 1);
        let series = &stats.transactions[0];
        assert_eq!(series.key, "bitstamp");
        assert_eq!(series.values, vec![(t0 + 1000, 107.5)]);

        assert_eq!(stats.vwap, Some(107.5));
        assert_eq!(stats.max, Some(110.0));
        assert_eq!(stats.min, Some(100.0));
        assert_eq!(stats.volume, 4.0);
    }

    #[tokio::test]
    async fn test_population_standard_deviation() {
        let db = Database::connect_in_memory().await.unwrap();
        let aggregates = db.aggregates();
        let source_id = aggregates.ensure_source("kraken").await.unwrap();

        let t0 = BUCKET_MS * 200;
        insert(&aggregates, source_id, &[(1.0, 100.0, t0), (1.0, 200.0, t0 + 500)]).await;

        let engine = StatsEngine::new(aggregates);
        let stats = engine.query(t0 + 1000, 5_000).await.unwrap();

        // avg 150, population std dev sqrt(((-50)^2 + 50^2) / 2) = 50
        assert_eq!(stats.std_deviation, Some(50.0));
        assert_eq!(stats.vwap, Some(150.0));
        assert_eq!(stats.volume, 2.0);
    }

    #[tokio::test]
    async fn test_buckets_split_per_source_and_interval() {
        let db = Database::connect_in_memory().await.unwrap();
        let aggregates = db.aggregates();
        let bitstamp = aggregates.ensure_source("bitstamp").await.unwrap();
        let kraken = aggregates.ensure_source("kraken").await.unwrap();

        let t0 = BUCKET_MS * 50;
        // bitstamp: one trade in each of two adjacent buckets
        insert(
            &aggregates,
            bitstamp,
            &[(1.0, 100.0, t0), (1.0, 120.0, t0 + BUCKET_MS)],
        )
        .await;
        // kraken: one trade in the first bucket
        insert(&aggregates, kraken, &[(2.0, 105.0, t0 + 100)]).await;

        let engine = StatsEngine::new(aggregates);
        let stats = engine.query(t0 + 2 * BUCKET_MS, 3 * BUCKET_MS).await.unwrap();

        assert_eq!(stats.transactions.len(), 2);
        let bitstamp_series = stats
            .transactions
            .iter()
            .find(|s| s.key == "bitstamp")
            .unwrap();
        assert_eq!(
            bitstamp_series.values,
            vec![(t0, 100.0), (t0 + BUCKET_MS, 120.0)]
        );
        let kraken_series = stats
            .transactions
            .iter()
            .find(|s| s.key == "kraken")
            .unwrap();
        assert_eq!(kraken_series.values, vec![(t0 + 100, 105.0)]);
    }

    #[tokio::test]
    async fn test_window_excludes_outside_rows() {
        let db = Database::connect_in_memory().await.unwrap();
        let aggregates = db.aggregates();
        let source_id = aggregates.ensure_source("bitfinex").await.unwrap();

        let t0 = BUCKET_MS * 10;
        insert(
            &aggregates,
            source_id,
            &[(1.0, 100.0, t0), (1.0, 500.0, t0 - 60_000)],
        )
        .await;

        let engine = StatsEngine::new(aggregates);
        let stats = engine.query(t0 + 1000, 10_000).await.unwrap();

        assert_eq!(stats.max, Some(100.0));
        assert_eq!(stats.volume, 1.0);
    }

    #[test]
    fn test_parse_window_accepts_numeric_strings() {
        let (time, period) = parse_window("1700000000000", "3600000").unwrap();
        assert_eq!(time, 1_700_000_000_000);
        assert_eq!(period, 3_600_000);
    }

    #[test]
    fn test_parse_window_rejects_bad_input() {
        assert!(parse_window("not-a-number", "1000").is_err());
        assert!(parse_window("1000", "").is_err());
        assert!(parse_window("-5", "1000").is_err());
    }

    #[test]
    fn test_window_stats_serializes_sentinels_as_null() {
        let stats = WindowStats {
            time_period: 1000,
            time: 2000,
            transactions: Vec::new(),
            std_deviation: None,
            vwap: None,
            max: None,
            min: None,
            volume: 0.0,
        };

        let json = serde_json::to_value(&stats).unwrap();
        assert!(json["vwap"].is_null());
        assert!(json["stdDeviation"].is_null());
        assert_eq!(json["timePeriod"], 1000);
        assert_eq!(json["volume"], 0.0);
    }
}
