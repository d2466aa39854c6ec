//! # shelfwatch CLI (`shelf`)
//!
//! The `shelf` binary drives the CDC pipeline: database initialization,
//! exchange-rate maintenance, snapshot ingestion, and reporting.
//!
//! ## Usage
//!
//! ```bash
//! shelf --config ./config/shelf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shelf init` | Create the SQLite database, schema, and date calendar |
//! | `shelf rates add` | Upsert one exchange rate |
//! | `shelf rates list` | Print the exchange-rate table |
//! | `shelf ingest <file>` | Reconcile one snapshot batch against the store |
//! | `shelf summary` | Show the daily summary for a date |
//! | `shelf events` | List change events |
//! | `shelf history <title>` | Show the version timeline of one book |
//! | `shelf stats` | Database overview |

mod aggregate;
mod config;
mod db;
mod error;
mod identity;
mod ingest;
mod migrate;
mod models;
mod rates;
mod reconcile;
mod report;
mod stats;
mod store;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// shelfwatch CLI — a local-first CDC pipeline tracking price and stock
/// history of scraped book snapshots.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/shelf.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "shelf",
    about = "shelfwatch — a local-first CDC pipeline for scraped price snapshots",
    version,
    long_about = "shelfwatch ingests dated snapshots of scraped items, reconciles them \
    against an SCD Type 2 snapshot store, appends an immutable change-event log, and \
    rolls up daily summary statistics. Each batch is processed atomically and \
    reprocessing a batch id is a safe no-op."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/shelf.toml`. Database path, calendar range,
    /// and ingest parsing settings are read from this file.
    #[arg(long, global = true, default_value = "./config/shelf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and seed the date calendar.
    ///
    /// Creates the SQLite database file and all required tables (books,
    /// staging_books, batches, cdc_events, daily_summary, exchange_rates,
    /// dim_date). This command is idempotent — running it multiple times
    /// is safe, and widening the calendar range only appends.
    Init,

    /// Manage exchange rates.
    ///
    /// Reconciliation converts every base-currency price into the derived
    /// currencies using the most recent rate at or before the batch date,
    /// and aborts if none exists.
    Rates {
        #[command(subcommand)]
        action: RatesAction,
    },

    /// Ingest one snapshot batch and reconcile it against the store.
    ///
    /// Reads a JSON array of `{title, price, availability}` records,
    /// classifies every entity as added, changed, removed, or unchanged,
    /// and applies the result in a single transaction. Ingesting a batch
    /// id that was already processed is a no-op.
    Ingest {
        /// Path to the snapshot JSON file.
        file: PathBuf,

        /// Target date of the snapshot (YYYY-MM-DD). Defaults to today (UTC).
        #[arg(long)]
        date: Option<String>,

        /// Batch identifier. Defaults to a generated `ingest_<date>_<time>` id.
        #[arg(long)]
        batch_id: Option<String>,

        /// Classify the batch and print counts without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Print the result as JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },

    /// Show the daily summary for a date.
    Summary {
        /// Summary date (YYYY-MM-DD).
        #[arg(long)]
        date: String,
    },

    /// List change events.
    Events {
        /// Only events detected on this date (YYYY-MM-DD).
        #[arg(long)]
        date: Option<String>,

        /// Only events of this type: added, price_change, stock_change, removed.
        #[arg(long = "type")]
        event_type: Option<String>,
    },

    /// Show the version timeline of one book.
    ///
    /// The title is normalized (case, whitespace) before the lookup, so it
    /// does not need to match the scraped text exactly.
    History {
        /// Book title.
        title: String,
    },

    /// Show database statistics.
    Stats,
}

/// Exchange-rate subcommands.
#[derive(Subcommand)]
enum RatesAction {
    /// Add or replace one exchange rate.
    Add {
        /// Source currency code (e.g. GBP).
        #[arg(long)]
        from: String,

        /// Target currency code (e.g. USD).
        #[arg(long)]
        to: String,

        /// Conversion rate (target per source unit).
        #[arg(long)]
        rate: String,

        /// First date the rate applies to (YYYY-MM-DD).
        #[arg(long)]
        effective: String,
    },

    /// List all configured rates.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Rates { action } => match action {
            RatesAction::Add {
                from,
                to,
                rate,
                effective,
            } => {
                rates::run_rates_add(&cfg, &from, &to, &rate, &effective).await?;
            }
            RatesAction::List => {
                rates::run_rates_list(&cfg).await?;
            }
        },
        Commands::Ingest {
            file,
            date,
            batch_id,
            dry_run,
            json,
        } => {
            ingest::run_ingest(&cfg, &file, date, batch_id, dry_run, json).await?;
        }
        Commands::Summary { date } => {
            report::run_summary(&cfg, &date).await?;
        }
        Commands::Events { date, event_type } => {
            report::run_events(&cfg, date, event_type).await?;
        }
        Commands::History { title } => {
            report::run_history(&cfg, &title).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
