#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Government district crime statistics.
//!
//! The published table splits some police districts (Johor Bahru Selatan and
//! Utara, for example). [`reshape`] merges them into one canonical district,
//! sums `crimes` per `(district, category, date)`, and emits rows in the
//! sheet layout `state, district, category, date, crimes` with an empty
//! `state` column.

pub mod io;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Errors from the government statistics path.
#[derive(Debug, thiserror::Error)]
pub enum GovError {
    /// CSV parsing or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Downloading the input failed.
    #[error("Source error: {0}")]
    Source(#[from] safezone_source::SourceError),

    /// A blocking task panicked or was cancelled.
    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The input is missing required columns.
    #[error("missing required columns: {0:?}")]
    MissingColumns(Vec<String>),

    /// A data row could not be interpreted.
    #[error("invalid row {line}: {message}")]
    InvalidRow {
        /// 1-based line number in the input.
        line: u64,
        /// What was wrong.
        message: String,
    },
}

/// Columns the input must have.
pub const REQUIRED_COLUMNS: &[&str] = &["district", "category", "date", "crimes"];

/// Split police districts and the district they merge into.
pub const DISTRICT_RENAMES: &[(&str, &str)] = &[
    ("Johor Bahru Selatan", "Johor Bahru"),
    ("Johor Bahru Utara", "Johor Bahru"),
    ("Seberang Perai Selatan", "Seberang Perai"),
    ("Seberang Perai Tengah", "Seberang Perai"),
    ("Seberang Perai Utara", "Seberang Perai"),
    ("Klang Selatan", "Klang"),
    ("Klang Utara", "Klang"),
];

/// One input row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovRow {
    /// District as published.
    pub district: String,
    /// Crime category as published.
    pub category: String,
    /// Reporting date.
    pub date: NaiveDate,
    /// Number of crimes.
    pub crimes: u64,
}

/// One output row, in sheet column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovRecord {
    /// Always empty; the sheet fills it in later.
    pub state: String,
    /// Canonical district.
    pub district: String,
    /// Crime category.
    pub category: String,
    /// `YYYY-MM-DD`.
    pub date: String,
    /// Summed crime count.
    pub crimes: u64,
}

/// Exact-match district rename table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameTable(BTreeMap<String, String>);

impl RenameTable {
    /// Builds a table from `(from, to)` pairs.
    #[must_use]
    pub fn new<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        )
    }

    /// The canonical name for `district`.
    #[must_use]
    pub fn apply<'a>(&'a self, district: &'a str) -> &'a str {
        self.0.get(district).map_or(district, String::as_str)
    }
}

impl Default for RenameTable {
    fn default() -> Self {
        Self::new(DISTRICT_RENAMES.iter().copied())
    }
}

/// Renames districts, groups by `(district, category, date)`, and sums
/// `crimes`.
///
/// Output is sorted by district, then category, then date.
#[must_use]
pub fn reshape(rows: &[GovRow], renames: &RenameTable) -> Vec<GovRecord> {
    let mut totals: BTreeMap<(String, String, NaiveDate), u64> = BTreeMap::new();

    for row in rows {
        let key = (
            renames.apply(&row.district).to_string(),
            row.category.clone(),
            row.date,
        );
        let total = totals.entry(key).or_default();
        *total = total.checked_add(row.crimes).unwrap_or_else(|| {
            log::warn!(
                "Crime count overflow for {} / {} on {}; capping at u64::MAX",
                row.district,
                row.category,
                row.date
            );
            u64::MAX
        });
    }

    log::info!("Reshaped {} rows into {} records", rows.len(), totals.len());

    totals
        .into_iter()
        .map(|((district, category, date), crimes)| GovRecord {
            state: String::new(),
            district,
            category,
            date: date.format("%Y-%m-%d").to_string(),
            crimes,
        })
        .collect()
}
