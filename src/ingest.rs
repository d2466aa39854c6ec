//! Snapshot-file ingestion.
//!
//! Reads a scraped snapshot (a JSON array of `{title, price, availability}`
//! records, where price is display text such as `"£51.77"`), parses it into
//! typed records, and hands the batch to the store for reconciliation.
//! Malformed records are skipped with a warning rather than failing the
//! batch. Supports `--dry-run` (classify without writing) and `--json`
//! (machine-readable result).

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::{Config, IngestConfig};
use crate::db;
use crate::models::{ChangeCounts, RawBook, SnapshotBatch};
use crate::rates;
use crate::reconcile;
use crate::store::{self, BatchOutcome};

/// One record of the raw snapshot file, as written by the scraper.
#[derive(Debug, Deserialize)]
struct RawRecord {
    title: String,
    price: String,
    availability: String,
}

/// Machine-readable result printed with `--json`.
#[derive(Debug, Serialize)]
struct IngestReport<'a> {
    status: &'a str,
    batch_id: &'a str,
    target_date: NaiveDate,
    records_read: usize,
    records_skipped: usize,
    #[serde(flatten)]
    counts: ChangeCounts,
}

/// Batch id in the shape `<prefix>_<YYYY-MM-DD>_<HHMMSS>`.
pub fn generate_batch_id(prefix: &str) -> String {
    format!("{}_{}", prefix, chrono::Utc::now().format("%Y-%m-%d_%H%M%S"))
}

/// Parse raw display-text records into typed books. Returns the parsed
/// books and how many records were skipped.
pub fn parse_raw_books(records: &[(String, String, String)], cfg: &IngestConfig) -> (Vec<RawBook>, usize) {
    let mut books = Vec::with_capacity(records.len());
    let mut skipped = 0;

    for (title, price_text, availability) in records {
        match parse_price(price_text, cfg) {
            Some(price) => books.push(RawBook {
                title: title.clone(),
                price,
                availability: availability.clone(),
                in_stock: availability.contains(&cfg.in_stock_marker),
            }),
            None => {
                println!("warning: skipping '{}': unparseable price '{}'", title, price_text);
                skipped += 1;
            }
        }
    }

    (books, skipped)
}

/// Strip display prefixes and parse the base-currency amount. Prices must
/// be strictly positive.
fn parse_price(text: &str, cfg: &IngestConfig) -> Option<Decimal> {
    let mut cleaned = text.trim();
    for prefix in &cfg.currency_prefixes {
        cleaned = cleaned.strip_prefix(prefix.as_str()).unwrap_or(cleaned);
    }
    let price = Decimal::from_str(cleaned.trim()).ok()?;
    if price <= Decimal::ZERO {
        return None;
    }
    Some(price)
}

pub async fn run_ingest(
    config: &Config,
    file: &Path,
    date: Option<String>,
    batch_id: Option<String>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read snapshot file: {}", file.display()))?;
    let records: Vec<RawRecord> = serde_json::from_str(&content)
        .with_context(|| "Failed to parse snapshot file (expected a JSON array of records)")?;

    let target_date = match date {
        Some(text) => NaiveDate::parse_from_str(&text, "%Y-%m-%d")
            .with_context(|| format!("invalid date: '{}' (expected YYYY-MM-DD)", text))?,
        None => chrono::Utc::now().date_naive(),
    };
    let batch_id = batch_id.unwrap_or_else(|| generate_batch_id("ingest"));

    let raw: Vec<(String, String, String)> = records
        .into_iter()
        .map(|r| (r.title, r.price, r.availability))
        .collect();
    let records_read = raw.len();
    let (books, records_skipped) = parse_raw_books(&raw, &config.ingest);

    let batch = SnapshotBatch {
        batch_id: batch_id.clone(),
        target_date,
        books,
    };

    let pool = db::connect(config).await?;

    if dry_run {
        let current = store::get_all_current(&pool).await?;
        let rate_table = rates::load_rate_table(&pool).await?;
        let outcome = reconcile::reconcile(&current, &batch, &rate_table)?;
        pool.close().await;

        if json {
            print_json("dry-run", &batch_id, target_date, records_read, records_skipped, &outcome.counts)?;
        } else {
            println!("ingest {} (dry-run)", file.display());
            println!("  batch id: {}", batch_id);
            println!("  target date: {}", target_date);
            print_counts(records_read, records_skipped, &outcome.counts);
            println!("  (no changes written)");
        }
        return Ok(());
    }

    let outcome = store::process_batch(&pool, &batch).await?;
    pool.close().await;

    match outcome {
        BatchOutcome::Duplicate => {
            let zero = ChangeCounts::default();
            if json {
                print_json("duplicate", &batch_id, target_date, records_read, records_skipped, &zero)?;
            } else {
                println!("ingest {}", file.display());
                println!("  batch id: {} already processed, nothing to do", batch_id);
            }
        }
        BatchOutcome::Applied { counts, summary } => {
            if json {
                print_json("ok", &batch_id, target_date, records_read, records_skipped, &counts)?;
            } else {
                println!("ingest {}", file.display());
                println!("  batch id: {}", batch_id);
                println!("  target date: {}", target_date);
                print_counts(records_read, records_skipped, &counts);
                println!(
                    "  summary: {} in stock, {} out of stock, inventory value £{}",
                    summary.books_in_stock, summary.books_out_of_stock, summary.total_value_gbp
                );
                println!("ok");
            }
        }
    }

    Ok(())
}

fn print_counts(records_read: usize, records_skipped: usize, counts: &ChangeCounts) {
    println!("  records read: {}", records_read);
    if records_skipped > 0 {
        println!("  records skipped: {}", records_skipped);
    }
    println!("  new books: {}", counts.added);
    println!("  removed books: {}", counts.removed);
    println!("  price changes: {}", counts.price_changes);
    println!("  stock changes: {}", counts.stock_changes);
    println!("  total processed: {}", counts.total_processed);
}

fn print_json(
    status: &str,
    batch_id: &str,
    target_date: NaiveDate,
    records_read: usize,
    records_skipped: usize,
    counts: &ChangeCounts,
) -> Result<()> {
    let report = IngestReport {
        status,
        batch_id,
        target_date,
        records_read,
        records_skipped,
        counts: *counts,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
