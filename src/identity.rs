//! Content-derived entity identity.
//!
//! Scraped titles carry whitespace and casing noise between runs, so the
//! entity key is a SHA-256 hash of the normalized title: case-folded,
//! trimmed, with internal whitespace runs collapsed to single spaces. The
//! same book always maps to the same key regardless of scrape formatting.

use sha2::{Digest, Sha256};

/// Normalize a natural identifier for hashing.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Stable entity key for a scraped title.
pub fn book_key(title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_title(title).as_bytes());
    format!("{:x}", hasher.finalize())
}
