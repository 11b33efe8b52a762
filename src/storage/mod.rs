//! SQLite persistence layer
//!
//! One pool shared by every component: source adapters append to per-source
//! staging tables, the rollup scheduler moves staged rows into the
//! aggregated series, the statistics engine reads it.

pub mod aggregate;
pub mod staging;


use crate::error::Result;
use crate::sources::Exchange;
use aggregate::AggregateStore;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use staging::StagingStore;
use std::path::Path;

/// Database handle owning the connection pool and schema setup.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to SQLite database (creates if not exists)
    pub async fn connect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", path.as_ref().display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// In-memory database for tests. A single connection keeps every
    /// statement on the same in-memory instance.
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Create staging, source and aggregate tables when absent
    async fn run_migrations(&self) -> Result<()> {
        for exchange in Exchange::ALL {
            let create = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    staging_key INTEGER PRIMARY KEY AUTOINCREMENT,
                    external_key TEXT NOT NULL UNIQUE,
                    amount REAL NOT NULL,
                    price REAL NOT NULL,
                    created_at INTEGER NOT NULL
                )
                "#,
                exchange.staging_table()
            );
            sqlx::query(&create).execute(&self.pool).await?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                source_id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS aggregated_trades (
                aggregated_trade_key INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id INTEGER NOT NULL REFERENCES sources(source_id),
                amount REAL NOT NULL,
                price REAL NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Index for windowed statistics queries
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_aggregated_created_at
            ON aggregated_trades(created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub fn staging(&self) -> StagingStore {
        StagingStore::new(self.pool.clone())
    }

    pub fn aggregates(&self) -> AggregateStore {
        AggregateStore::new(self.pool.clone())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
