//! Schema creation and calendar seeding.
//!
//! All statements are idempotent, so `shelf init` can be re-run safely.
//! The table set mirrors the warehouse shape of the pipeline: a staging
//! landing zone, the SCD Type 2 `books` table, the append-only `cdc_events`
//! log, per-date `daily_summary` facts, the `exchange_rates` table, and a
//! `dim_date` calendar that every batch date must resolve against.

use anyhow::Result;
use chrono::{Datelike, Duration, NaiveDate};

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS batches (
            batch_id TEXT PRIMARY KEY,
            target_date TEXT NOT NULL,
            processed INTEGER NOT NULL DEFAULT 0,
            processed_at INTEGER,
            added INTEGER NOT NULL DEFAULT 0,
            removed INTEGER NOT NULL DEFAULT 0,
            price_changes INTEGER NOT NULL DEFAULT 0,
            stock_changes INTEGER NOT NULL DEFAULT 0,
            total_processed INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS staging_books (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            batch_id TEXT NOT NULL,
            scraped_date TEXT NOT NULL,
            title TEXT NOT NULL,
            price TEXT NOT NULL,
            availability TEXT NOT NULL,
            in_stock INTEGER NOT NULL,
            processed INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (batch_id) REFERENCES batches(batch_id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS books (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            book_key TEXT NOT NULL,
            title TEXT NOT NULL,
            price_gbp TEXT NOT NULL,
            price_usd TEXT NOT NULL,
            price_eur TEXT NOT NULL,
            availability TEXT NOT NULL,
            in_stock INTEGER NOT NULL,
            valid_from TEXT NOT NULL,
            valid_to TEXT,
            is_current INTEGER NOT NULL DEFAULT 1,
            change_type TEXT NOT NULL
                CHECK (change_type IN ('NEW', 'PRICE_CHANGE', 'STOCK_CHANGE', 'BOTH')),
            previous_price TEXT,
            previous_availability TEXT,
            batch_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            CHECK (is_current IN (0, 1)),
            CHECK ((is_current = 1 AND valid_to IS NULL)
                OR (is_current = 0 AND valid_to IS NOT NULL))
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cdc_events (
            id TEXT PRIMARY KEY,
            event_type TEXT NOT NULL
                CHECK (event_type IN ('ADDED', 'PRICE_CHANGE', 'STOCK_CHANGE', 'REMOVED')),
            book_key TEXT NOT NULL,
            title TEXT NOT NULL,
            old_price TEXT,
            new_price TEXT,
            price_change_amount TEXT,
            price_change_pct TEXT,
            old_availability TEXT,
            new_availability TEXT,
            detected_date TEXT NOT NULL,
            batch_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (batch_id) REFERENCES batches(batch_id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS daily_summary (
            summary_date TEXT PRIMARY KEY,
            total_books_scraped INTEGER NOT NULL,
            books_in_stock INTEGER NOT NULL,
            books_out_of_stock INTEGER NOT NULL,
            new_books INTEGER NOT NULL,
            removed_books INTEGER NOT NULL,
            price_changes INTEGER NOT NULL,
            stock_changes INTEGER NOT NULL,
            total_value_gbp TEXT NOT NULL,
            total_value_usd TEXT NOT NULL,
            total_value_eur TEXT NOT NULL,
            avg_price_gbp TEXT NOT NULL,
            avg_price_usd TEXT NOT NULL,
            avg_price_eur TEXT NOT NULL,
            batch_id TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS exchange_rates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            from_currency TEXT NOT NULL,
            to_currency TEXT NOT NULL,
            rate TEXT NOT NULL,
            effective_date TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE (from_currency, to_currency, effective_date)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dim_date (
            date TEXT PRIMARY KEY,
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            day INTEGER NOT NULL,
            day_of_week INTEGER NOT NULL,
            is_weekend INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // One open version per entity, enforced at the storage layer.
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_books_current
         ON books(book_key) WHERE is_current = 1",
    )
    .execute(&pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_books_key ON books(book_key)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_date ON cdc_events(detected_date)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_type ON cdc_events(event_type)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_staging_batch ON staging_books(batch_id)")
        .execute(&pool)
        .await?;

    seed_dim_date(&pool, config.calendar.start, config.calendar.end).await?;

    pool.close().await;
    Ok(())
}

/// Fill `dim_date` for the configured range. Existing rows are left alone,
/// so widening the range later only appends.
async fn seed_dim_date(pool: &sqlx::SqlitePool, start: NaiveDate, end: NaiveDate) -> Result<()> {
    let mut tx = pool.begin().await?;

    let mut date = start;
    while date <= end {
        let weekday = date.weekday();
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO dim_date (date, year, month, day, day_of_week, is_weekend)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(date.format("%Y-%m-%d").to_string())
        .bind(date.year())
        .bind(date.month() as i64)
        .bind(date.day() as i64)
        .bind(weekday.number_from_monday() as i64)
        .bind(matches!(weekday, chrono::Weekday::Sat | chrono::Weekday::Sun) as i64)
        .execute(&mut *tx)
        .await?;
        date += Duration::days(1);
    }

    tx.commit().await?;
    Ok(())
}
