//! Core data models used throughout shelfwatch.
//!
//! These types represent the scraped items, versioned snapshot rows, change
//! events, and summaries that flow through the reconciliation pipeline.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// Base currency of the scraped source prices.
pub const BASE_CURRENCY: &str = "GBP";

/// A single scraped item after raw-input parsing, before reconciliation.
#[derive(Debug, Clone)]
pub struct RawBook {
    pub title: String,
    /// Price in the base currency, already cleaned of display prefixes.
    pub price: Decimal,
    pub availability: String,
    pub in_stock: bool,
}

/// One run's worth of input, processed atomically under a single batch id.
#[derive(Debug, Clone)]
pub struct SnapshotBatch {
    pub batch_id: String,
    pub target_date: NaiveDate,
    pub books: Vec<RawBook>,
}

/// Validity interval of a version row.
///
/// A current version has no end date; a closed version always has one.
/// Modeling this as an enum keeps the invalid combinations (current with an
/// end date, closed without one) unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Current { valid_from: NaiveDate },
    Closed { valid_from: NaiveDate, valid_to: NaiveDate },
}

impl Validity {
    pub fn valid_from(&self) -> NaiveDate {
        match *self {
            Validity::Current { valid_from } => valid_from,
            Validity::Closed { valid_from, .. } => valid_from,
        }
    }

    pub fn valid_to(&self) -> Option<NaiveDate> {
        match *self {
            Validity::Current { .. } => None,
            Validity::Closed { valid_to, .. } => Some(valid_to),
        }
    }

    pub fn is_current(&self) -> bool {
        matches!(self, Validity::Current { .. })
    }
}

/// Why a version row was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    New,
    PriceChange,
    StockChange,
    /// Price and stock both differed from the previous version.
    Both,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::New => "NEW",
            ChangeType::PriceChange => "PRICE_CHANGE",
            ChangeType::StockChange => "STOCK_CHANGE",
            ChangeType::Both => "BOTH",
        }
    }

    pub fn parse(s: &str) -> Option<ChangeType> {
        match s {
            "NEW" => Some(ChangeType::New),
            "PRICE_CHANGE" => Some(ChangeType::PriceChange),
            "STOCK_CHANGE" => Some(ChangeType::StockChange),
            "BOTH" => Some(ChangeType::Both),
            _ => None,
        }
    }
}

/// Kind of a change event. A compound change logs two events (price and
/// stock separately), so there is no combined variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Added,
    PriceChange,
    StockChange,
    Removed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Added => "ADDED",
            EventType::PriceChange => "PRICE_CHANGE",
            EventType::StockChange => "STOCK_CHANGE",
            EventType::Removed => "REMOVED",
        }
    }

    pub fn parse(s: &str) -> Option<EventType> {
        match s {
            "ADDED" => Some(EventType::Added),
            "PRICE_CHANGE" => Some(EventType::PriceChange),
            "STOCK_CHANGE" => Some(EventType::StockChange),
            "REMOVED" => Some(EventType::Removed),
            _ => None,
        }
    }
}

/// Price of one version in the base currency plus derived conversions,
/// all rounded to two decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceSet {
    pub gbp: Decimal,
    pub usd: Decimal,
    pub eur: Decimal,
}

/// One SCD Type 2 row of the snapshot store.
#[derive(Debug, Clone)]
pub struct BookVersion {
    /// Content-derived key: SHA-256 of the normalized title.
    pub book_key: String,
    pub title: String,
    pub price: PriceSet,
    pub availability: String,
    pub in_stock: bool,
    pub validity: Validity,
    pub change_type: ChangeType,
    /// Base-currency price of the superseded version, for delta reporting.
    pub previous_price: Option<Decimal>,
    pub previous_availability: Option<String>,
    pub batch_id: String,
}

/// Immutable record of one detected change. Append-only: never updated or
/// deleted once written.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub book_key: String,
    pub title: String,
    pub old_price: Option<Decimal>,
    pub new_price: Option<Decimal>,
    /// Signed absolute delta, new minus old. Price events only.
    pub price_change_amount: Option<Decimal>,
    /// Signed percentage delta relative to the old price, two decimals.
    pub price_change_pct: Option<Decimal>,
    pub old_availability: Option<String>,
    pub new_availability: Option<String>,
    pub detected_date: NaiveDate,
    pub batch_id: String,
}

/// Per-batch change counters returned to the caller and folded into the
/// daily summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeCounts {
    pub added: u64,
    pub removed: u64,
    pub price_changes: u64,
    pub stock_changes: u64,
    pub total_processed: u64,
}

/// One row per calendar date, recomputed in full whenever a batch for that
/// date completes.
#[derive(Debug, Clone)]
pub struct DailySummary {
    pub summary_date: NaiveDate,
    pub total_books_scraped: i64,
    pub books_in_stock: i64,
    pub books_out_of_stock: i64,
    pub new_books: i64,
    pub removed_books: i64,
    pub price_changes: i64,
    pub stock_changes: i64,
    pub total_value_gbp: Decimal,
    pub total_value_usd: Decimal,
    pub total_value_eur: Decimal,
    pub avg_price_gbp: Decimal,
    pub avg_price_usd: Decimal,
    pub avg_price_eur: Decimal,
    pub batch_id: String,
}
