//! # shelfwatch
//!
//! A local-first CDC pipeline tracking price and stock history of scraped
//! book snapshots.
//!
//! shelfwatch consumes dated snapshot files produced by a scraper, diffs
//! each batch against the current snapshot (SCD Type 2), appends a
//! change-event log, and rolls daily summaries — all atomically per batch
//! and idempotently per batch id.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────────┐
//! │  Snapshot    │──▶│  Reconciler  │──▶│    SQLite      │
//! │  JSON file   │   │  (pure diff) │   │ SCD2 + events │
//! └──────────────┘   └──────┬───────┘   └──────┬────────┘
//!                           │                  │
//!                    ┌──────▼───────┐   ┌──────▼────────┐
//!                    │  Rate table  │   │  Aggregator   │
//!                    │ (binary srch)│   │ daily summary │
//!                    └──────────────┘   └───────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! shelf init                                    # create database + calendar
//! shelf rates add --from GBP --to USD --rate 1.27 --effective 2026-01-01
//! shelf rates add --from GBP --to EUR --rate 1.17 --effective 2026-01-01
//! shelf ingest books.json --date 2026-01-01     # reconcile one batch
//! shelf summary --date 2026-01-01
//! shelf events --type price_change
//! shelf history "A Light in the Attic"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`identity`] | Content-derived entity keys |
//! | [`rates`] | Exchange-rate lookup and maintenance |
//! | [`reconcile`] | Pure CDC batch diff |
//! | [`store`] | Snapshot store and batch orchestration |
//! | [`aggregate`] | Daily summary rollup |
//! | [`ingest`] | Snapshot-file ingestion |
//! | [`report`] | Summary, event, and history queries |
//! | [`stats`] | Database overview |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations and calendar seeding |

pub mod aggregate;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod rates;
pub mod reconcile;
pub mod report;
pub mod stats;
pub mod store;
