//! Source registry and aggregated trade series
//!
//! The aggregated series is append-only: only the rollup scheduler writes,
//! the statistics engine reads. Sources are registered lazily the first
//! time they are consolidated.

use crate::error::Result;
use crate::model::AggregateTrade;
use sqlx::sqlite::SqlitePool;

/// 15-minute statistics bucket width, in milliseconds
pub const BUCKET_MS: i64 = 900_000;

/// One per-source bucket VWAP row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BucketVwap {
    pub source: String,
    pub created_at: i64,
    pub vwap: f64,
}

/// Whole-window price aggregates. `NULL` columns mean an empty window.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PriceSummary {
    pub max_price: Option<f64>,
    pub min_price: Option<f64>,
    pub volume: Option<f64>,
    pub vwap: Option<f64>,
    pub dev_numerator: Option<f64>,
    pub sample_count: i64,
}

#[derive(Clone)]
pub struct AggregateStore {
    pool: SqlitePool,
}

impl AggregateStore {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Look up the stable id for a source name, registering it when absent.
    /// Idempotent; a concurrent duplicate insert is ignored.
    pub async fn ensure_source(&self, name: &str) -> Result<i64> {
        sqlx::query("INSERT OR IGNORE INTO sources (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?;

        let source_id: i64 = sqlx::query_scalar("SELECT source_id FROM sources WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;

        Ok(source_id)
    }

    /// Append a batch of consolidated trades to the aggregated series.
    pub async fn insert_rows(&self, rows: &[AggregateTrade]) -> Result<()> {
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO aggregated_trades (source_id, amount, price, created_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(row.source_id)
            .bind(row.amount)
            .bind(row.price)
            .bind(row.created_at)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    /// Per-source VWAP series over 15-minute buckets within the window.
    /// Each row carries the latest trade timestamp seen in its bucket.
    pub async fn bucket_vwaps(&self, start: i64, end: i64) -> Result<Vec<BucketVwap>> {
        let select = format!(
            r#"
            SELECT s.name AS source,
                   MAX(a.created_at) AS created_at,
                   SUM(a.amount * a.price) / SUM(a.amount) AS vwap
            FROM aggregated_trades a
            INNER JOIN sources s ON a.source_id = s.source_id
            WHERE a.created_at BETWEEN ? AND ?
            GROUP BY a.source_id, a.created_at / {BUCKET_MS}
            "#
        );

        let rows = sqlx::query_as::<_, BucketVwap>(&select)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// Unweighted mean price over the window; `None` when empty.
    pub async fn avg_price(&self, start: i64, end: i64) -> Result<Option<f64>> {
        let avg: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(price) FROM aggregated_trades WHERE created_at BETWEEN ? AND ?",
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(avg)
    }

    /// Max/min/volume/VWAP plus the std-deviation numerator centered on
    /// `avg_price`. Bind order follows parameter positions in the statement.
    pub async fn price_summary(&self, start: i64, end: i64, avg_price: f64) -> Result<PriceSummary> {
        let summary = sqlx::query_as::<_, PriceSummary>(
            r#"
            SELECT MAX(price) AS max_price,
                   MIN(price) AS min_price,
                   SUM(amount) AS volume,
                   SUM(price * amount) / SUM(amount) AS vwap,
                   SUM((price - ?) * (price - ?)) AS dev_numerator,
                   COUNT(price) AS sample_count
            FROM aggregated_trades
            WHERE created_at BETWEEN ? AND ?
            "#,
        )
        .bind(avg_price)
        .bind(avg_price)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;

        Ok(summary)
    }
}
