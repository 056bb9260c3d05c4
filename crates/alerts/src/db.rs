//! SQLite storage for tracked pairs.

use chrono::{DateTime, Utc};
use pricewatch_core::{OwnerId, PriceRange, TrackedPair};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Pair not found: {owner} {symbol}")]
    PairNotFound { owner: OwnerId, symbol: String },
}

type PairRow = (i64, String, String, Option<f64>, Option<f64>, String);

/// Database connection for tracked pairs.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to the SQLite database at the given URL, creating it if needed.
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        // Every in-memory connection is its own database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tracked_pairs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner INTEGER NOT NULL,
                base TEXT NOT NULL,
                quote TEXT NOT NULL,
                min_price REAL,
                max_price REAL,
                created_at TEXT NOT NULL,
                UNIQUE(owner, base, quote)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Load every tracked pair, oldest first.
    pub async fn load_pairs(&self) -> Result<Vec<TrackedPair>, DbError> {
        let rows = sqlx::query_as::<_, PairRow>(
            "SELECT owner, base, quote, min_price, max_price, created_at FROM tracked_pairs ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_pair).collect())
    }

    /// Insert a pair, or overwrite the range of an existing one.
    pub async fn upsert_pair(&self, pair: &TrackedPair) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO tracked_pairs (owner, base, quote, min_price, max_price, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(owner, base, quote) DO UPDATE SET
                min_price = excluded.min_price,
                max_price = excluded.max_price
            "#,
        )
        .bind(pair.owner)
        .bind(&pair.base)
        .bind(&pair.quote)
        .bind(pair.range.min())
        .bind(pair.range.max())
        .bind(pair.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Update the range of a stored pair.
    pub async fn update_range(
        &self,
        owner: OwnerId,
        base: &str,
        quote: &str,
        range: PriceRange,
    ) -> Result<(), DbError> {
        let result = sqlx::query(
            "UPDATE tracked_pairs SET min_price = ?, max_price = ? WHERE owner = ? AND base = ? AND quote = ?",
        )
        .bind(range.min())
        .bind(range.max())
        .bind(owner)
        .bind(base.to_uppercase())
        .bind(quote.to_uppercase())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::PairNotFound {
                owner,
                symbol: pricewatch_core::symbol(base, quote),
            });
        }
        Ok(())
    }

    /// Delete a pair. Returns whether a row was removed.
    pub async fn delete_pair(&self, owner: OwnerId, base: &str, quote: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM tracked_pairs WHERE owner = ? AND base = ? AND quote = ?")
            .bind(owner)
            .bind(base.to_uppercase())
            .bind(quote.to_uppercase())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_pair((owner, base, quote, min_price, max_price, created_at): PairRow) -> TrackedPair {
    let range = PriceRange::new(min_price, max_price).unwrap_or_else(|e| {
        warn!(owner, base = %base, quote = %quote, error = %e, "Stored range is invalid, clearing it");
        PriceRange::UNBOUNDED
    });
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    TrackedPair {
        owner,
        base,
        quote,
        range,
        created_at,
    }
}
