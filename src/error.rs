//! Typed failures of the reconciliation core.
//!
//! Every variant aborts the enclosing batch before or during the single
//! apply transaction, so no partial state is ever visible. Duplicate batches
//! are not an error: the store reports them as a zero-change outcome.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The target date has no calendar row. `shelf init` seeds the calendar.
    #[error("no dim_date entry for {0}; run `shelf init` to seed the calendar")]
    MissingDateDimension(NaiveDate),

    /// No exchange rate exists at or before the batch date.
    #[error("no exchange rate for {from}->{to} effective on or before {date}")]
    NoExchangeRate {
        from: String,
        to: String,
        date: NaiveDate,
    },

    /// Attempt to close a version that is not open. Closed rows are
    /// immutable; this must never fire in correct operation.
    #[error("version of {book_key} is already closed; closed rows are immutable")]
    ClosedRecordMutation { book_key: String },

    /// Attempt to create a version while an open one exists for the key.
    #[error("an open version already exists for {book_key}; close it first")]
    OpenVersionExists { book_key: String },

    /// The batch is dated before an open version it would supersede.
    /// Per-entity history must stay in date order; a same-date rescrape is
    /// allowed, an older one is not.
    #[error("batch dated {target_date} predates the open version of {book_key} (valid from {valid_from})")]
    BatchPredatesVersion {
        book_key: String,
        target_date: NaiveDate,
        valid_from: NaiveDate,
    },

    #[error("storage unavailable: {0}")]
    Storage(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
