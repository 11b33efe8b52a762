//! Per-source staging tables
//!
//! Append-only holding area for normalized trades awaiting the next rollup.
//! Poll overlap is deduplicated here: `external_key` is unique per table and
//! appends use `INSERT OR IGNORE`.

use crate::error::Result;
use crate::model::Trade;
use crate::sources::Exchange;
use rust_decimal::prelude::ToPrimitive;
use sqlx::sqlite::SqlitePool;

/// One staged row, tagged with its synthetic table key.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StagedRow {
    pub staging_key: i64,
    pub external_key: String,
    pub amount: f64,
    pub price: f64,
    pub created_at: i64,
}

#[derive(Clone)]
pub struct StagingStore {
    pool: SqlitePool,
}

impl StagingStore {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one normalized trade to the source's staging table.
    pub async fn append(&self, exchange: Exchange, trade: &Trade) -> Result<()> {
        let insert = format!(
            r#"
            INSERT OR IGNORE INTO {} (external_key, amount, price, created_at)
            VALUES (?, ?, ?, ?)
            "#,
            exchange.staging_table()
        );

        sqlx::query(&insert)
            .bind(&trade.external_key)
            .bind(trade.amount.to_f64().unwrap_or_default())
            .bind(trade.price.to_f64().unwrap_or_default())
            .bind(trade.created_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Read every currently staged row for the source.
    ///
    /// Together with [`clear`](Self::clear) this forms the rollup drain.
    /// The two steps are separate statements, so a trade appended between
    /// them is lost; see the rollup scheduler for the contract.
    pub async fn fetch_all(&self, exchange: Exchange) -> Result<Vec<StagedRow>> {
        let select = format!(
            r#"
            SELECT staging_key, external_key, amount, price, created_at
            FROM {}
            "#,
            exchange.staging_table()
        );

        let rows = sqlx::query_as::<_, StagedRow>(&select)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    /// Delete every staged row for the source and compact storage.
    pub async fn clear(&self, exchange: Exchange) -> Result<u64> {
        let delete = format!("DELETE FROM {}", exchange.staging_table());

        let result = sqlx::query(&delete).execute(&self.pool).await?;
        sqlx::query("VACUUM").execute(&self.pool).await?;

        Ok(result.rows_affected())
    }
}
