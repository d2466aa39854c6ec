use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Range of dates seeded into `dim_date` by `shelf init`. Batches outside
/// this range are rejected before any mutation.
#[derive(Debug, Deserialize, Clone)]
pub struct CalendarConfig {
    #[serde(default = "default_calendar_start")]
    pub start: NaiveDate,
    #[serde(default = "default_calendar_end")]
    pub end: NaiveDate,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            start: default_calendar_start(),
            end: default_calendar_end(),
        }
    }
}

fn default_calendar_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

fn default_calendar_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 12, 31).unwrap()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Substring of the availability text that marks an item as in stock.
    #[serde(default = "default_in_stock_marker")]
    pub in_stock_marker: String,
    /// Display prefixes stripped from raw price text before parsing.
    /// Includes the double-encoded pound sign seen in scraped pages.
    #[serde(default = "default_currency_prefixes")]
    pub currency_prefixes: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            in_stock_marker: default_in_stock_marker(),
            currency_prefixes: default_currency_prefixes(),
        }
    }
}

fn default_in_stock_marker() -> String {
    "In stock".to_string()
}

fn default_currency_prefixes() -> Vec<String> {
    vec!["Â£".to_string(), "£".to_string()]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.calendar.start > config.calendar.end {
        anyhow::bail!(
            "calendar.start ({}) must not be after calendar.end ({})",
            config.calendar.start,
            config.calendar.end
        );
    }

    if config.ingest.in_stock_marker.is_empty() {
        anyhow::bail!("ingest.in_stock_marker must not be empty");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str("[db]\npath = \"data/shelf.sqlite\"\n").unwrap();
        assert_eq!(config.calendar.start, default_calendar_start());
        assert_eq!(config.calendar.end, default_calendar_end());
        assert_eq!(config.ingest.in_stock_marker, "In stock");
        assert_eq!(config.ingest.currency_prefixes.len(), 2);
    }

    #[test]
    fn test_calendar_range_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shelf.toml");
        std::fs::write(
            &path,
            "[db]\npath = \"x.sqlite\"\n[calendar]\nstart = \"2026-01-01\"\nend = \"2025-01-01\"\n",
        )
        .unwrap();
        assert!(load_config(&path).is_err());
    }
}
