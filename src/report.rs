//! Read-side commands: daily summary, change-event listing, and per-title
//! version history.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use sqlx::Row;

use crate::aggregate;
use crate::config::Config;
use crate::db;
use crate::identity;
use crate::models::EventType;
use crate::store;

/// Run `shelf summary --date`: print the daily summary row for a date.
pub async fn run_summary(config: &Config, date: &str) -> Result<()> {
    let date = parse_date_arg(date)?;
    let pool = db::connect(config).await?;
    let summary = aggregate::load_summary(&pool, date).await?;
    pool.close().await;

    let Some(s) = summary else {
        println!("no summary for {}", date);
        return Ok(());
    };

    println!("Daily summary for {}", s.summary_date);
    println!("{}", "=".repeat(34));
    println!("  batch id:          {}", s.batch_id);
    println!("  books scraped:     {}", s.total_books_scraped);
    println!("  in stock:          {}", s.books_in_stock);
    println!("  out of stock:      {}", s.books_out_of_stock);
    println!("  new:               {}", s.new_books);
    println!("  removed:           {}", s.removed_books);
    println!("  price changes:     {}", s.price_changes);
    println!("  stock changes:     {}", s.stock_changes);
    println!(
        "  inventory value:   £{}  ${}  €{}",
        s.total_value_gbp, s.total_value_usd, s.total_value_eur
    );
    println!(
        "  average price:     £{}  ${}  €{}",
        s.avg_price_gbp, s.avg_price_usd, s.avg_price_eur
    );

    Ok(())
}

/// Run `shelf events`: list change events, optionally filtered by detection
/// date and event type.
pub async fn run_events(
    config: &Config,
    date: Option<String>,
    event_type: Option<String>,
) -> Result<()> {
    let date = date.as_deref().map(parse_date_arg).transpose()?;
    let event_type = match event_type.as_deref() {
        None => None,
        Some(text) => {
            let normalized = text.to_uppercase().replace('-', "_");
            match EventType::parse(&normalized) {
                Some(t) => Some(t),
                None => bail!(
                    "unknown event type: '{}'. Available: ADDED, PRICE_CHANGE, STOCK_CHANGE, REMOVED",
                    text
                ),
            }
        }
    };

    let mut sql = String::from(
        "SELECT event_type, title, old_price, new_price, price_change_amount, \
         price_change_pct, old_availability, new_availability, detected_date \
         FROM cdc_events WHERE 1 = 1",
    );
    if date.is_some() {
        sql.push_str(" AND detected_date = ?");
    }
    if event_type.is_some() {
        sql.push_str(" AND event_type = ?");
    }
    sql.push_str(" ORDER BY detected_date, created_at, id");

    let pool = db::connect(config).await?;
    let mut query = sqlx::query(&sql);
    if let Some(d) = date {
        query = query.bind(d.format("%Y-%m-%d").to_string());
    }
    if let Some(t) = event_type {
        query = query.bind(t.as_str());
    }
    let rows = query.fetch_all(&pool).await?;
    pool.close().await;

    if rows.is_empty() {
        println!("no events found");
        return Ok(());
    }

    println!(
        "{:<12} {:<14} {:<40} {}",
        "DATE", "TYPE", "TITLE", "CHANGE"
    );
    println!("{}", "-".repeat(90));
    for row in &rows {
        let event_type: String = row.get("event_type");
        let change = describe_change(row);
        let mut title: String = row.get("title");
        if title.chars().count() > 38 {
            title = title.chars().take(37).collect();
            title.push('…');
        }
        println!(
            "{:<12} {:<14} {:<40} {}",
            row.get::<String, _>("detected_date"),
            event_type,
            title,
            change
        );
    }

    Ok(())
}

fn describe_change(row: &sqlx::sqlite::SqliteRow) -> String {
    let old_price: Option<String> = row.get("old_price");
    let new_price: Option<String> = row.get("new_price");
    let amount: Option<String> = row.get("price_change_amount");
    let pct: Option<String> = row.get("price_change_pct");
    let old_avail: Option<String> = row.get("old_availability");
    let new_avail: Option<String> = row.get("new_availability");

    match row.get::<String, _>("event_type").as_str() {
        "ADDED" => format!("£{}", new_price.unwrap_or_default()),
        "REMOVED" => format!("was £{}", old_price.unwrap_or_default()),
        "PRICE_CHANGE" => format!(
            "£{} -> £{} ({}{}%)",
            old_price.unwrap_or_default(),
            new_price.unwrap_or_default(),
            amount.map(|a| format!("{} / ", a)).unwrap_or_default(),
            pct.unwrap_or_default()
        ),
        "STOCK_CHANGE" => format!(
            "'{}' -> '{}'",
            old_avail.unwrap_or_default(),
            new_avail.unwrap_or_default()
        ),
        other => other.to_string(),
    }
}

/// Run `shelf history`: print the SCD timeline for one title.
pub async fn run_history(config: &Config, title: &str) -> Result<()> {
    let key = identity::book_key(title);
    let pool = db::connect(config).await?;
    let versions = store::get_history(&pool, &key).await?;
    pool.close().await;

    if versions.is_empty() {
        println!("no history for '{}'", title);
        return Ok(());
    }

    println!("History for '{}'", versions[0].title);
    println!("  key: {}", key);
    println!();
    println!(
        "{:<12} {:<12} {:<14} {:>10} {:<8} {}",
        "FROM", "TO", "CHANGE", "PRICE", "STOCK", "AVAILABILITY"
    );
    println!("{}", "-".repeat(76));
    for v in &versions {
        let to = v
            .validity
            .valid_to()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "current".to_string());
        println!(
            "{:<12} {:<12} {:<14} {:>10} {:<8} {}",
            v.validity.valid_from().format("%Y-%m-%d"),
            to,
            v.change_type.as_str(),
            format!("£{}", v.price.gbp),
            if v.in_stock { "yes" } else { "no" },
            v.availability
        );
    }

    Ok(())
}

fn parse_date_arg(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .with_context(|| format!("invalid date: '{}' (expected YYYY-MM-DD)", text))
}
