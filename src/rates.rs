//! Exchange-rate lookup and maintenance.
//!
//! [`RateTable`] is a pure in-memory lookup: per currency pair it keeps the
//! rate series sorted by effective date and answers "most recent rate with
//! `effective_date <= date`" by binary search. The reconciler converts every
//! new version's base price through it, so absence of a rate aborts the
//! batch before any write happens.
//!
//! The `shelf rates` subcommands maintain the backing `exchange_rates` table.

use std::collections::HashMap;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::error::PipelineError;

/// Round a monetary amount to two decimal places, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// In-memory exchange-rate lookup, keyed by (from, to) currency pair.
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    // Each series is sorted ascending by effective date.
    series: HashMap<(String, String), Vec<(NaiveDate, Decimal)>>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one rate. Re-inserting the same effective date replaces the
    /// previous value.
    pub fn insert(&mut self, from: &str, to: &str, effective_date: NaiveDate, rate: Decimal) {
        let series = self
            .series
            .entry((from.to_string(), to.to_string()))
            .or_default();
        match series.binary_search_by_key(&effective_date, |&(d, _)| d) {
            Ok(pos) => series[pos].1 = rate,
            Err(pos) => series.insert(pos, (effective_date, rate)),
        }
    }

    /// Most recent rate with `effective_date <= date`, if any.
    pub fn lookup(&self, from: &str, to: &str, date: NaiveDate) -> Option<Decimal> {
        let series = self.series.get(&(from.to_string(), to.to_string()))?;
        let idx = series.partition_point(|&(d, _)| d <= date);
        if idx == 0 {
            None
        } else {
            Some(series[idx - 1].1)
        }
    }

    /// Convert an amount using the rate effective at `date`, rounded to two
    /// decimals. Identity conversion never consults the table.
    pub fn convert(
        &self,
        amount: Decimal,
        from: &str,
        to: &str,
        date: NaiveDate,
    ) -> std::result::Result<Decimal, PipelineError> {
        if from == to {
            return Ok(round_money(amount));
        }
        let rate = self
            .lookup(from, to, date)
            .ok_or_else(|| PipelineError::NoExchangeRate {
                from: from.to_string(),
                to: to.to_string(),
                date,
            })?;
        Ok(round_money(amount * rate))
    }
}

/// Load the full rate table from storage.
pub async fn load_rate_table(
    pool: &sqlx::SqlitePool,
) -> std::result::Result<RateTable, PipelineError> {
    let rows = sqlx::query(
        "SELECT from_currency, to_currency, rate, effective_date FROM exchange_rates",
    )
    .fetch_all(pool)
    .await?;

    let mut table = RateTable::new();
    for row in &rows {
        let from: String = row.get("from_currency");
        let to: String = row.get("to_currency");
        let rate_text: String = row.get("rate");
        let date_text: String = row.get("effective_date");
        // Rows are written by `rates add`, which validates both fields.
        let rate = Decimal::from_str(&rate_text)
            .map_err(|_| sqlx::Error::Decode(format!("bad rate '{}'", rate_text).into()))?;
        let date = NaiveDate::parse_from_str(&date_text, "%Y-%m-%d")
            .map_err(|_| sqlx::Error::Decode(format!("bad date '{}'", date_text).into()))?;
        table.insert(&from, &to, date, rate);
    }
    Ok(table)
}

/// Run `shelf rates add`: upsert one exchange rate.
pub async fn run_rates_add(
    config: &Config,
    from: &str,
    to: &str,
    rate: &str,
    effective: &str,
) -> Result<()> {
    let from = validate_currency(from)?;
    let to = validate_currency(to)?;
    let rate = Decimal::from_str(rate).with_context(|| format!("invalid rate: '{}'", rate))?;
    if rate <= Decimal::ZERO {
        bail!("rate must be positive, got {}", rate);
    }
    let effective = NaiveDate::parse_from_str(effective, "%Y-%m-%d")
        .with_context(|| format!("invalid date: '{}' (expected YYYY-MM-DD)", effective))?;

    let pool = db::connect(config).await?;
    sqlx::query(
        r#"
        INSERT INTO exchange_rates (from_currency, to_currency, rate, effective_date, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(from_currency, to_currency, effective_date)
        DO UPDATE SET rate = excluded.rate
        "#,
    )
    .bind(&from)
    .bind(&to)
    .bind(rate.to_string())
    .bind(effective.format("%Y-%m-%d").to_string())
    .bind(chrono::Utc::now().timestamp())
    .execute(&pool)
    .await?;

    println!("rate {}->{} = {} effective {}", from, to, rate, effective);
    pool.close().await;
    Ok(())
}

/// Run `shelf rates list`: print the rate table ordered by pair and date.
pub async fn run_rates_list(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let rows = sqlx::query(
        r#"
        SELECT from_currency, to_currency, rate, effective_date
        FROM exchange_rates
        ORDER BY from_currency, to_currency, effective_date
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if rows.is_empty() {
        println!("no exchange rates configured");
        println!("add one with: shelf rates add --from GBP --to USD --rate 1.27 --effective 2026-01-01");
    } else {
        println!("{:<6} {:<6} {:>12}   {}", "FROM", "TO", "RATE", "EFFECTIVE");
        println!("{}", "-".repeat(40));
        for row in &rows {
            println!(
                "{:<6} {:<6} {:>12}   {}",
                row.get::<String, _>("from_currency"),
                row.get::<String, _>("to_currency"),
                row.get::<String, _>("rate"),
                row.get::<String, _>("effective_date"),
            );
        }
    }

    pool.close().await;
    Ok(())
}

fn validate_currency(code: &str) -> Result<String> {
    let code = code.trim().to_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        bail!("invalid currency code: '{}' (expected 3 letters)", code);
    }
    Ok(code)
}
