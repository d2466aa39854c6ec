//! Daily summary rollup.
//!
//! Recomputes the full [`DailySummary`] row for a date from the current
//! snapshot plus the per-batch change counters, and upserts it. Recomputing
//! from the same state always yields the same row, so replaying a batch date
//! is harmless.
//!
//! Monetary fields follow the source semantics: inventory value and average
//! price are taken over in-stock current versions only.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{Row, SqliteConnection};

use crate::error::Result;
use crate::models::{ChangeCounts, DailySummary};
use crate::rates::round_money;
use crate::store::{parse_date, parse_decimal};

/// Build the summary row for `date` from the current snapshot visible on
/// `conn` (normally mid-transaction, after the batch's writes).
pub async fn compute_summary(
    conn: &mut SqliteConnection,
    date: NaiveDate,
    counts: &ChangeCounts,
    batch_id: &str,
) -> Result<DailySummary> {
    let rows = sqlx::query(
        "SELECT price_gbp, price_usd, price_eur, in_stock FROM books WHERE is_current = 1",
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut in_stock_count: i64 = 0;
    let mut out_of_stock_count: i64 = 0;
    let mut total_gbp = Decimal::ZERO;
    let mut total_usd = Decimal::ZERO;
    let mut total_eur = Decimal::ZERO;

    for row in &rows {
        let in_stock: i64 = row.get("in_stock");
        if in_stock == 0 {
            out_of_stock_count += 1;
            continue;
        }
        in_stock_count += 1;
        total_gbp += parse_decimal(&row.get::<String, _>("price_gbp"))?;
        total_usd += parse_decimal(&row.get::<String, _>("price_usd"))?;
        total_eur += parse_decimal(&row.get::<String, _>("price_eur"))?;
    }

    let avg = |total: Decimal| {
        if in_stock_count > 0 {
            round_money(total / Decimal::from(in_stock_count))
        } else {
            Decimal::ZERO
        }
    };

    Ok(DailySummary {
        summary_date: date,
        total_books_scraped: counts.total_processed as i64,
        books_in_stock: in_stock_count,
        books_out_of_stock: out_of_stock_count,
        new_books: counts.added as i64,
        removed_books: counts.removed as i64,
        price_changes: counts.price_changes as i64,
        stock_changes: counts.stock_changes as i64,
        total_value_gbp: round_money(total_gbp),
        total_value_usd: round_money(total_usd),
        total_value_eur: round_money(total_eur),
        avg_price_gbp: avg(total_gbp),
        avg_price_usd: avg(total_usd),
        avg_price_eur: avg(total_eur),
        batch_id: batch_id.to_string(),
    })
}

/// Replace the summary row for its date.
pub async fn upsert_summary(conn: &mut SqliteConnection, summary: &DailySummary) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO daily_summary (
            summary_date, total_books_scraped, books_in_stock, books_out_of_stock,
            new_books, removed_books, price_changes, stock_changes,
            total_value_gbp, total_value_usd, total_value_eur,
            avg_price_gbp, avg_price_usd, avg_price_eur,
            batch_id, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(summary_date) DO UPDATE SET
            total_books_scraped = excluded.total_books_scraped,
            books_in_stock = excluded.books_in_stock,
            books_out_of_stock = excluded.books_out_of_stock,
            new_books = excluded.new_books,
            removed_books = excluded.removed_books,
            price_changes = excluded.price_changes,
            stock_changes = excluded.stock_changes,
            total_value_gbp = excluded.total_value_gbp,
            total_value_usd = excluded.total_value_usd,
            total_value_eur = excluded.total_value_eur,
            avg_price_gbp = excluded.avg_price_gbp,
            avg_price_usd = excluded.avg_price_usd,
            avg_price_eur = excluded.avg_price_eur,
            batch_id = excluded.batch_id,
            created_at = excluded.created_at
        "#,
    )
    .bind(summary.summary_date.format("%Y-%m-%d").to_string())
    .bind(summary.total_books_scraped)
    .bind(summary.books_in_stock)
    .bind(summary.books_out_of_stock)
    .bind(summary.new_books)
    .bind(summary.removed_books)
    .bind(summary.price_changes)
    .bind(summary.stock_changes)
    .bind(summary.total_value_gbp.to_string())
    .bind(summary.total_value_usd.to_string())
    .bind(summary.total_value_eur.to_string())
    .bind(summary.avg_price_gbp.to_string())
    .bind(summary.avg_price_usd.to_string())
    .bind(summary.avg_price_eur.to_string())
    .bind(&summary.batch_id)
    .bind(chrono::Utc::now().timestamp())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Fetch the summary row for a date, if one exists.
pub async fn load_summary(
    pool: &sqlx::SqlitePool,
    date: NaiveDate,
) -> Result<Option<DailySummary>> {
    let row = sqlx::query("SELECT * FROM daily_summary WHERE summary_date = ?")
        .bind(date.format("%Y-%m-%d").to_string())
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(DailySummary {
        summary_date: parse_date(&row.get::<String, _>("summary_date"))?,
        total_books_scraped: row.get("total_books_scraped"),
        books_in_stock: row.get("books_in_stock"),
        books_out_of_stock: row.get("books_out_of_stock"),
        new_books: row.get("new_books"),
        removed_books: row.get("removed_books"),
        price_changes: row.get("price_changes"),
        stock_changes: row.get("stock_changes"),
        total_value_gbp: parse_decimal(&row.get::<String, _>("total_value_gbp"))?,
        total_value_usd: parse_decimal(&row.get::<String, _>("total_value_usd"))?,
        total_value_eur: parse_decimal(&row.get::<String, _>("total_value_eur"))?,
        avg_price_gbp: parse_decimal(&row.get::<String, _>("avg_price_gbp"))?,
        avg_price_usd: parse_decimal(&row.get::<String, _>("avg_price_usd"))?,
        avg_price_eur: parse_decimal(&row.get::<String, _>("avg_price_eur"))?,
        batch_id: row.get("batch_id"),
    }))
}
