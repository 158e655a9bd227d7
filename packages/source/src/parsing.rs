//! Row validation at the ingestion boundary.
//!
//! Sheet cells are hand-entered and arrive in several date formats. Rows
//! that cannot produce a [`RawReport`] are rejected here with a reason and
//! never reach the controller.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use safezone_report_models::{RawReport, SheetRow};

/// Datetime formats seen in sheet exports, tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%B %d, %Y at %I:%M%p",
];

/// Date-only formats, tried after the datetime formats.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d %B %Y"];

/// Twitter's `created_at` format.
const TWITTER_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Why a row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowRejection {
    /// The date cell is blank.
    #[error("missing date")]
    MissingDate,
    /// The text cell is blank.
    #[error("missing text")]
    MissingText,
    /// The date cell is not in any known format.
    #[error("unparsable date {0:?}")]
    UnparsableDate(String),
}

/// Parses a date cell, dropping any time of day.
#[must_use]
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, TWITTER_FORMAT) {
        return Some(dt.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        })
}

/// Validates one sheet row into a report.
///
/// A blank topic is allowed (it classifies as unknown); a blank date or
/// text is not, since the identity cannot be computed without them.
///
/// # Errors
///
/// Returns the [`RowRejection`] describing the first missing or malformed
/// field.
pub fn report_from_row(row: &SheetRow) -> Result<RawReport, RowRejection> {
    let date_cell = non_blank(row.date.as_deref()).ok_or(RowRejection::MissingDate)?;
    let text = non_blank(row.text.as_deref()).ok_or(RowRejection::MissingText)?;
    let date =
        parse_date(date_cell).ok_or_else(|| RowRejection::UnparsableDate(date_cell.to_string()))?;

    Ok(RawReport {
        date,
        topic: row.topic.as_deref().unwrap_or_default().trim().to_string(),
        text: text.to_string(),
    })
}

/// Validates every row, logging and dropping the ones that fail.
#[must_use]
pub fn validate_rows(rows: &[SheetRow]) -> Vec<RawReport> {
    rows.iter()
        .enumerate()
        .filter_map(|(i, row)| match report_from_row(row) {
            Ok(report) => Some(report),
            Err(reason) => {
                log::warn!("Skipping row {}: {reason}", i + 1);
                None
            }
        })
        .collect()
}

fn non_blank(cell: Option<&str>) -> Option<&str> {
    cell.filter(|s| !s.trim().is_empty())
}
