//! Pure batch reconciliation.
//!
//! [`reconcile`] diffs an incoming snapshot batch against the current
//! snapshot set and classifies every entity as added, changed, removed, or
//! unchanged. It takes everything it needs as arguments (current versions,
//! the batch, the rate table) and returns the versions to create, the keys
//! to close, and the events to log — it never touches storage, so the whole
//! CDC classification is testable without a database.
//!
//! A changed entity gets one new version. When price and stock both differ
//! the version is tagged BOTH but two events are logged, one PRICE_CHANGE
//! and one STOCK_CHANGE; the event log only carries single-kind rows.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::identity;
use crate::models::{
    BookVersion, ChangeCounts, ChangeEvent, ChangeType, EventType, PriceSet, SnapshotBatch,
    Validity, BASE_CURRENCY,
};
use crate::rates::{round_money, RateTable};

/// Result of diffing one batch against the current snapshot.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    /// Versions to insert, valid from the batch date.
    pub new_versions: Vec<BookVersion>,
    /// Keys whose open version must be closed with `valid_to = date - 1`,
    /// never earlier than the version's own `valid_from`.
    pub closed_keys: Vec<String>,
    /// Events to append, in detection order: added, changed, removed.
    pub events: Vec<ChangeEvent>,
    pub counts: ChangeCounts,
}

pub fn reconcile(
    current: &[BookVersion],
    batch: &SnapshotBatch,
    rates: &RateTable,
) -> Result<ReconcileOutcome> {
    let date = batch.target_date;

    let current_by_key: HashMap<&str, &BookVersion> = current
        .iter()
        .filter(|v| v.validity.is_current())
        .map(|v| (v.book_key.as_str(), v))
        .collect();

    let mut outcome = ReconcileOutcome::default();
    let mut seen: HashSet<String> = HashSet::new();

    for raw in &batch.books {
        let key = identity::book_key(&raw.title);
        // A batch can carry the same title twice (scrape artifacts); the
        // first occurrence wins.
        if !seen.insert(key.clone()) {
            continue;
        }

        let price = price_set(raw.price, rates, date)?;

        match current_by_key.get(key.as_str()) {
            None => {
                outcome.new_versions.push(BookVersion {
                    book_key: key.clone(),
                    title: raw.title.clone(),
                    price,
                    availability: raw.availability.clone(),
                    in_stock: raw.in_stock,
                    validity: Validity::Current { valid_from: date },
                    change_type: ChangeType::New,
                    previous_price: None,
                    previous_availability: None,
                    batch_id: batch.batch_id.clone(),
                });
                outcome.events.push(ChangeEvent {
                    event_id: Uuid::new_v4().to_string(),
                    event_type: EventType::Added,
                    book_key: key,
                    title: raw.title.clone(),
                    old_price: None,
                    new_price: Some(price.gbp),
                    price_change_amount: None,
                    price_change_pct: None,
                    old_availability: None,
                    new_availability: Some(raw.availability.clone()),
                    detected_date: date,
                    batch_id: batch.batch_id.clone(),
                });
            }
            Some(cur) => {
                let price_changed = cur.price.gbp != price.gbp;
                let stock_changed =
                    cur.in_stock != raw.in_stock || cur.availability != raw.availability;

                if !price_changed && !stock_changed {
                    continue;
                }
                // Superseding an open version requires the batch to be at or
                // after its valid_from; older batches would invert the row's
                // validity interval.
                if date < cur.validity.valid_from() {
                    return Err(PipelineError::BatchPredatesVersion {
                        book_key: key,
                        target_date: date,
                        valid_from: cur.validity.valid_from(),
                    });
                }

                let change_type = match (price_changed, stock_changed) {
                    (true, false) => ChangeType::PriceChange,
                    (false, true) => ChangeType::StockChange,
                    _ => ChangeType::Both,
                };

                outcome.closed_keys.push(key.clone());
                outcome.new_versions.push(BookVersion {
                    book_key: key.clone(),
                    title: raw.title.clone(),
                    price,
                    availability: raw.availability.clone(),
                    in_stock: raw.in_stock,
                    validity: Validity::Current { valid_from: date },
                    change_type,
                    previous_price: Some(cur.price.gbp),
                    previous_availability: Some(cur.availability.clone()),
                    batch_id: batch.batch_id.clone(),
                });

                if price_changed {
                    let (amount, pct) = price_delta(cur.price.gbp, price.gbp);
                    outcome.events.push(ChangeEvent {
                        event_id: Uuid::new_v4().to_string(),
                        event_type: EventType::PriceChange,
                        book_key: key.clone(),
                        title: raw.title.clone(),
                        old_price: Some(cur.price.gbp),
                        new_price: Some(price.gbp),
                        price_change_amount: Some(amount),
                        price_change_pct: pct,
                        old_availability: None,
                        new_availability: None,
                        detected_date: date,
                        batch_id: batch.batch_id.clone(),
                    });
                }
                if stock_changed {
                    outcome.events.push(ChangeEvent {
                        event_id: Uuid::new_v4().to_string(),
                        event_type: EventType::StockChange,
                        book_key: key.clone(),
                        title: raw.title.clone(),
                        old_price: None,
                        new_price: None,
                        price_change_amount: None,
                        price_change_pct: None,
                        old_availability: Some(cur.availability.clone()),
                        new_availability: Some(raw.availability.clone()),
                        detected_date: date,
                        batch_id: batch.batch_id.clone(),
                    });
                }
            }
        }
    }

    // Entities present in the store but absent from the batch are removed:
    // their open version is closed and no replacement is created.
    for version in current.iter().filter(|v| v.validity.is_current()) {
        if seen.contains(&version.book_key) {
            continue;
        }
        if date < version.validity.valid_from() {
            return Err(PipelineError::BatchPredatesVersion {
                book_key: version.book_key.clone(),
                target_date: date,
                valid_from: version.validity.valid_from(),
            });
        }
        outcome.closed_keys.push(version.book_key.clone());
        outcome.events.push(ChangeEvent {
            event_id: Uuid::new_v4().to_string(),
            event_type: EventType::Removed,
            book_key: version.book_key.clone(),
            title: version.title.clone(),
            old_price: Some(version.price.gbp),
            new_price: None,
            price_change_amount: None,
            price_change_pct: None,
            old_availability: Some(version.availability.clone()),
            new_availability: None,
            detected_date: date,
            batch_id: batch.batch_id.clone(),
        });
    }

    outcome.counts = count_events(&outcome.events, batch.books.len() as u64);
    Ok(outcome)
}

fn price_set(base: Decimal, rates: &RateTable, date: NaiveDate) -> Result<PriceSet> {
    let gbp = round_money(base);
    Ok(PriceSet {
        gbp,
        usd: rates.convert(gbp, BASE_CURRENCY, "USD", date)?,
        eur: rates.convert(gbp, BASE_CURRENCY, "EUR", date)?,
    })
}

fn price_delta(old: Decimal, new: Decimal) -> (Decimal, Option<Decimal>) {
    let amount = new - old;
    if old.is_zero() {
        return (amount, None);
    }
    let pct = round_money(amount / old * Decimal::from(100));
    (amount, Some(pct))
}

fn count_events(events: &[ChangeEvent], total_processed: u64) -> ChangeCounts {
    let mut counts = ChangeCounts {
        total_processed,
        ..ChangeCounts::default()
    };
    for event in events {
        match event.event_type {
            EventType::Added => counts.added += 1,
            EventType::Removed => counts.removed += 1,
            EventType::PriceChange => counts.price_changes += 1,
            EventType::StockChange => counts.stock_changes += 1,
        }
    }
    counts
}
