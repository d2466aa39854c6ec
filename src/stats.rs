//! Database statistics and health overview.
//!
//! Gives a quick picture of the store: version and event counts, batches
//! processed, rate coverage, and when the last batch ran. Used by
//! `shelf stats` to confirm that ingests are landing as expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_versions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
        .fetch_one(&pool)
        .await?;
    let current_versions: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM books WHERE is_current = 1")
            .fetch_one(&pool)
            .await?;
    let total_events: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cdc_events")
        .fetch_one(&pool)
        .await?;
    let total_batches: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM batches WHERE processed = 1")
            .fetch_one(&pool)
            .await?;
    let total_summaries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM daily_summary")
        .fetch_one(&pool)
        .await?;
    let total_rates: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM exchange_rates")
        .fetch_one(&pool)
        .await?;

    let last_batch: Option<(String, Option<i64>)> =
        sqlx::query("SELECT batch_id, processed_at FROM batches ORDER BY processed_at DESC LIMIT 1")
            .fetch_optional(&pool)
            .await?
            .map(|row| (row.get("batch_id"), row.get("processed_at")));

    let calendar: Option<(String, String)> =
        sqlx::query("SELECT MIN(date) AS lo, MAX(date) AS hi FROM dim_date")
            .fetch_optional(&pool)
            .await?
            .and_then(|row| {
                let lo: Option<String> = row.get("lo");
                let hi: Option<String> = row.get("hi");
                lo.zip(hi)
            });

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("shelfwatch — Database Stats");
    println!("===========================");
    println!();
    println!("  Database:        {}", config.db.path.display());
    println!("  Size:            {}", format_bytes(db_size));
    println!();
    println!("  Versions:        {} ({} current)", total_versions, current_versions);
    println!("  Change events:   {}", total_events);
    println!("  Batches:         {}", total_batches);
    println!("  Daily summaries: {}", total_summaries);
    println!("  Exchange rates:  {}", total_rates);
    match calendar {
        Some((lo, hi)) => println!("  Calendar:        {} .. {}", lo, hi),
        None => println!("  Calendar:        not seeded (run `shelf init`)"),
    }
    match last_batch {
        Some((id, Some(ts))) => println!("  Last batch:      {} ({})", id, format_ts_relative(ts)),
        Some((id, None)) => println!("  Last batch:      {}", id),
        None => println!("  Last batch:      never"),
    }
    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
