//! Snapshot store and per-batch orchestration.
//!
//! Coordinates the full CDC flow for one batch: precondition checks
//! (duplicate batch, calendar), the pure reconcile pass, then a single
//! transaction that closes superseded versions, inserts new ones, appends
//! change events, upserts the daily summary, and marks the batch processed.
//! Either the whole transaction commits or none of it does.
//!
//! The SCD guards live here: closing a version that is not open and creating
//! a version while one is open are both refused, backed by a partial unique
//! index on `books(book_key) WHERE is_current = 1`.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::str::FromStr;

use crate::aggregate;
use crate::error::{PipelineError, Result};
use crate::models::{
    BookVersion, ChangeCounts, ChangeEvent, ChangeType, DailySummary, SnapshotBatch, Validity,
};
use crate::rates;
use crate::reconcile;

/// How a batch run ended.
#[derive(Debug)]
pub enum BatchOutcome {
    /// The batch was applied; counts and the recomputed summary.
    Applied {
        counts: ChangeCounts,
        summary: DailySummary,
    },
    /// The batch id was already processed; nothing was touched.
    Duplicate,
}

/// Process one batch end to end. Reprocessing a known batch id is a no-op.
pub async fn process_batch(pool: &SqlitePool, batch: &SnapshotBatch) -> Result<BatchOutcome> {
    if is_batch_processed(pool, &batch.batch_id).await? {
        return Ok(BatchOutcome::Duplicate);
    }
    if !date_in_dimension(pool, batch.target_date).await? {
        return Err(PipelineError::MissingDateDimension(batch.target_date));
    }

    let current = get_all_current(pool).await?;
    let rate_table = rates::load_rate_table(pool).await?;
    let outcome = reconcile::reconcile(&current, batch, &rate_table)?;

    let mut tx = pool.begin().await?;

    insert_batch_row(&mut tx, batch, &outcome.counts).await?;
    stage_books(&mut tx, batch).await?;

    for key in &outcome.closed_keys {
        close_version(&mut tx, key, batch.target_date).await?;
    }
    for version in &outcome.new_versions {
        create_version(&mut tx, version).await?;
    }
    for event in &outcome.events {
        record_event(&mut tx, event).await?;
    }

    let summary =
        aggregate::compute_summary(&mut tx, batch.target_date, &outcome.counts, &batch.batch_id)
            .await?;
    aggregate::upsert_summary(&mut tx, &summary).await?;

    tx.commit().await?;

    Ok(BatchOutcome::Applied {
        counts: outcome.counts,
        summary,
    })
}

/// The open version for a key, if any.
pub async fn get_current(pool: &SqlitePool, book_key: &str) -> Result<Option<BookVersion>> {
    let row = sqlx::query("SELECT * FROM books WHERE book_key = ? AND is_current = 1")
        .bind(book_key)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(version_from_row).transpose()
}

/// All open versions, the "current snapshot" the reconciler diffs against.
pub async fn get_all_current(pool: &SqlitePool) -> Result<Vec<BookVersion>> {
    let rows = sqlx::query("SELECT * FROM books WHERE is_current = 1 ORDER BY title")
        .fetch_all(pool)
        .await?;
    rows.iter().map(version_from_row).collect()
}

/// Close the open version of `book_key`, setting `valid_to = as_of - 1 day`,
/// clamped to `valid_from` so a same-date supersede keeps the interval valid.
/// Refuses if no open version exists: closed rows are immutable.
pub async fn close_version(
    conn: &mut SqliteConnection,
    book_key: &str,
    as_of: NaiveDate,
) -> Result<()> {
    let valid_to = as_of - Duration::days(1);
    // MAX on ISO-8601 date text compares correctly.
    let result = sqlx::query(
        "UPDATE books SET valid_to = MAX(valid_from, ?), is_current = 0 \
         WHERE book_key = ? AND is_current = 1",
    )
    .bind(valid_to.format("%Y-%m-%d").to_string())
    .bind(book_key)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(PipelineError::ClosedRecordMutation {
            book_key: book_key.to_string(),
        });
    }
    Ok(())
}

/// Insert a new open version. Refuses if one is already open for the key;
/// the caller must close it first.
pub async fn create_version(conn: &mut SqliteConnection, version: &BookVersion) -> Result<()> {
    let open_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM books WHERE book_key = ? AND is_current = 1")
            .bind(&version.book_key)
            .fetch_one(&mut *conn)
            .await?;
    if open_count > 0 {
        return Err(PipelineError::OpenVersionExists {
            book_key: version.book_key.clone(),
        });
    }

    sqlx::query(
        r#"
        INSERT INTO books (
            book_key, title, price_gbp, price_usd, price_eur,
            availability, in_stock, valid_from, valid_to, is_current,
            change_type, previous_price, previous_availability, batch_id, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, 1, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&version.book_key)
    .bind(&version.title)
    .bind(version.price.gbp.to_string())
    .bind(version.price.usd.to_string())
    .bind(version.price.eur.to_string())
    .bind(&version.availability)
    .bind(version.in_stock as i64)
    .bind(version.validity.valid_from().format("%Y-%m-%d").to_string())
    .bind(version.change_type.as_str())
    .bind(version.previous_price.map(|p| p.to_string()))
    .bind(&version.previous_availability)
    .bind(&version.batch_id)
    .bind(chrono::Utc::now().timestamp())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Append one change event. Insert-only: nothing ever updates or deletes
/// rows of `cdc_events`.
pub async fn record_event(conn: &mut SqliteConnection, event: &ChangeEvent) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO cdc_events (
            id, event_type, book_key, title,
            old_price, new_price, price_change_amount, price_change_pct,
            old_availability, new_availability, detected_date, batch_id, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&event.event_id)
    .bind(event.event_type.as_str())
    .bind(&event.book_key)
    .bind(&event.title)
    .bind(event.old_price.map(|p| p.to_string()))
    .bind(event.new_price.map(|p| p.to_string()))
    .bind(event.price_change_amount.map(|p| p.to_string()))
    .bind(event.price_change_pct.map(|p| p.to_string()))
    .bind(&event.old_availability)
    .bind(&event.new_availability)
    .bind(event.detected_date.format("%Y-%m-%d").to_string())
    .bind(&event.batch_id)
    .bind(chrono::Utc::now().timestamp())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn is_batch_processed(pool: &SqlitePool, batch_id: &str) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM batches WHERE batch_id = ? AND processed = 1")
            .bind(batch_id)
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}

pub async fn date_in_dimension(pool: &SqlitePool, date: NaiveDate) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dim_date WHERE date = ?")
        .bind(date.format("%Y-%m-%d").to_string())
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

async fn insert_batch_row(
    conn: &mut SqliteConnection,
    batch: &SnapshotBatch,
    counts: &ChangeCounts,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO batches (
            batch_id, target_date, processed, processed_at,
            added, removed, price_changes, stock_changes, total_processed
        )
        VALUES (?, ?, 1, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&batch.batch_id)
    .bind(batch.target_date.format("%Y-%m-%d").to_string())
    .bind(chrono::Utc::now().timestamp())
    .bind(counts.added as i64)
    .bind(counts.removed as i64)
    .bind(counts.price_changes as i64)
    .bind(counts.stock_changes as i64)
    .bind(counts.total_processed as i64)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn stage_books(conn: &mut SqliteConnection, batch: &SnapshotBatch) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    for raw in &batch.books {
        sqlx::query(
            r#"
            INSERT INTO staging_books
                (batch_id, scraped_date, title, price, availability, in_stock, processed, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(&batch.batch_id)
        .bind(batch.target_date.format("%Y-%m-%d").to_string())
        .bind(&raw.title)
        .bind(raw.price.to_string())
        .bind(&raw.availability)
        .bind(raw.in_stock as i64)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub(crate) fn parse_decimal(text: &str) -> std::result::Result<Decimal, sqlx::Error> {
    Decimal::from_str(text)
        .map_err(|_| sqlx::Error::Decode(format!("invalid decimal '{}'", text).into()))
}

pub(crate) fn parse_date(text: &str) -> std::result::Result<NaiveDate, sqlx::Error> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| sqlx::Error::Decode(format!("invalid date '{}'", text).into()))
}

fn version_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<BookVersion> {
    let valid_from = parse_date(&row.get::<String, _>("valid_from"))?;
    let validity = match row.get::<Option<String>, _>("valid_to") {
        None => Validity::Current { valid_from },
        Some(text) => Validity::Closed {
            valid_from,
            valid_to: parse_date(&text)?,
        },
    };

    let change_type_text: String = row.get("change_type");
    let change_type = ChangeType::parse(&change_type_text).ok_or_else(|| {
        sqlx::Error::Decode(format!("invalid change_type '{}'", change_type_text).into())
    })?;

    Ok(BookVersion {
        book_key: row.get("book_key"),
        title: row.get("title"),
        price: crate::models::PriceSet {
            gbp: parse_decimal(&row.get::<String, _>("price_gbp"))?,
            usd: parse_decimal(&row.get::<String, _>("price_usd"))?,
            eur: parse_decimal(&row.get::<String, _>("price_eur"))?,
        },
        availability: row.get("availability"),
        in_stock: row.get::<i64, _>("in_stock") != 0,
        validity,
        change_type,
        previous_price: row
            .get::<Option<String>, _>("previous_price")
            .as_deref()
            .map(parse_decimal)
            .transpose()?,
        previous_availability: row.get("previous_availability"),
        batch_id: row.get("batch_id"),
    })
}

/// All versions of one entity, oldest first. Used by `shelf history`.
pub async fn get_history(pool: &SqlitePool, book_key: &str) -> Result<Vec<BookVersion>> {
    let rows = sqlx::query("SELECT * FROM books WHERE book_key = ? ORDER BY valid_from, id")
        .bind(book_key)
        .fetch_all(pool)
        .await?;
    rows.iter().map(version_from_row).collect()
}
