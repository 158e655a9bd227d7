#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Report and record types shared by the extraction and ingest crates.
//!
//! Rows arrive from the spreadsheet export as loosely typed [`SheetRow`]
//! values, are validated into [`RawReport`]s at the ingestion boundary, and
//! leave the pipeline as append-only [`CrimeRecord`]s keyed by their
//! [`ReportIdentity`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use safezone_crime_models::{CrimeCategory, CrimeClassification, CrimeType};
use serde::{Deserialize, Serialize};

/// Sentinel used for any location component that could not be resolved.
pub const UNKNOWN: &str = "Unknown";

/// One spreadsheet row exactly as exported, before validation.
///
/// Every cell is optional because the upstream sheet is hand-maintained and
/// regularly contains blank cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetRow {
    /// Raw date cell (usually a timestamp with time of day).
    pub date: Option<String>,
    /// Short topic label, possibly Malay.
    pub topic: Option<String>,
    /// Free-form report text.
    pub text: Option<String>,
}

/// A validated input report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReport {
    /// Calendar date of the report (time of day is not retained).
    pub date: NaiveDate,
    /// Short topic label. Empty when the sheet cell was blank.
    pub topic: String,
    /// Free-form report text.
    pub text: String,
}

impl RawReport {
    /// Computes this report's identity.
    #[must_use]
    pub fn identity(&self) -> ReportIdentity {
        ReportIdentity::compute(self.date, &self.text)
    }
}

/// Deterministic fingerprint of a report's `(date, text)` pair.
///
/// Lowercase hex MD5 of `"{YYYY-MM-DD}-{text}"`. The same formula has been
/// used for every identity already stored in the processed set, so it must
/// not change.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportIdentity(String);

impl ReportIdentity {
    /// Computes the identity of a `(date, text)` pair.
    #[must_use]
    pub fn compute(date: NaiveDate, text: &str) -> Self {
        let mut context = md5::Context::new();
        context.consume(date.format("%Y-%m-%d").to_string().as_bytes());
        context.consume(b"-");
        context.consume(text.as_bytes());
        Self(format!("{:x}", context.finalize()))
    }

    /// Wraps an identity string read back from the datastore.
    #[must_use]
    pub fn from_stored(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReportIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved `(state, district)` pair.
///
/// Each component is either a canonical gazetteer name or [`UNKNOWN`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedLocation {
    /// Canonical state name or [`UNKNOWN`].
    pub state: String,
    /// Canonical district name or [`UNKNOWN`].
    pub district: String,
}

impl ResolvedLocation {
    /// `("Unknown", "Unknown")`.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            state: UNKNOWN.to_string(),
            district: UNKNOWN.to_string(),
        }
    }

    /// A state with an unknown district.
    #[must_use]
    pub fn state_only(state: &str) -> Self {
        Self {
            state: state.to_string(),
            district: UNKNOWN.to_string(),
        }
    }

    /// A district together with its owning state.
    #[must_use]
    pub fn district(state: &str, district: &str) -> Self {
        Self {
            state: state.to_string(),
            district: district.to_string(),
        }
    }

    /// Whether neither component was resolved.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.state == UNKNOWN && self.district == UNKNOWN
    }
}

impl Default for ResolvedLocation {
    fn default() -> Self {
        Self::unknown()
    }
}

impl std::fmt::Display for ResolvedLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.state, self.district)
    }
}

/// A fully resolved crime record ready for publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrimeRecord {
    /// Primary key.
    pub id: ReportIdentity,
    /// Resolved location.
    pub location: ResolvedLocation,
    /// Resolved classification.
    pub classification: CrimeClassification,
    /// Report date.
    pub date: NaiveDate,
}

impl CrimeRecord {
    /// Converts this record into its stored (id-less) form.
    #[must_use]
    pub fn to_stored(&self) -> StoredRecord {
        StoredRecord {
            state: self.location.state.clone(),
            district: self.location.district.clone(),
            category: self.classification.category,
            crime_type: self.classification.crime_type,
            date: self.date.format("%Y-%m-%d").to_string(),
        }
    }
}

/// The record object stored under its id in the datastore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Canonical state or `"Unknown"`.
    pub state: String,
    /// Canonical district or `"Unknown"`.
    pub district: String,
    /// Crime category.
    pub category: CrimeCategory,
    /// Crime type.
    #[serde(rename = "type")]
    pub crime_type: CrimeType,
    /// ISO-8601 date (`YYYY-MM-DD`).
    pub date: String,
}

/// Every identity already published.
///
/// Serialized as a map from id to `true`, the shape the datastore uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<ReportIdentity, bool>", into = "BTreeMap<ReportIdentity, bool>")]
pub struct ProcessedSet {
    ids: BTreeSet<ReportIdentity>,
}

impl ProcessedSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` has already been published.
    #[must_use]
    pub fn contains(&self, id: &ReportIdentity) -> bool {
        self.ids.contains(id)
    }

    /// Records `id`. Returns `false` if it was already present.
    pub fn insert(&mut self, id: ReportIdentity) -> bool {
        self.ids.insert(id)
    }

    /// Adds every identity in `other` to this set.
    pub fn merge(&mut self, other: &Self) {
        self.ids.extend(other.ids.iter().cloned());
    }

    /// Number of recorded identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterates over the recorded identities in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &ReportIdentity> {
        self.ids.iter()
    }
}

impl FromIterator<ReportIdentity> for ProcessedSet {
    fn from_iter<T: IntoIterator<Item = ReportIdentity>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl From<BTreeMap<ReportIdentity, bool>> for ProcessedSet {
    fn from(map: BTreeMap<ReportIdentity, bool>) -> Self {
        map.into_iter()
            .filter_map(|(id, marked)| marked.then_some(id))
            .collect()
    }
}

impl From<ProcessedSet> for BTreeMap<ReportIdentity, bool> {
    fn from(set: ProcessedSet) -> Self {
        set.ids.into_iter().map(|id| (id, true)).collect()
    }
}

/// Counts from one ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    /// Reports handed to the controller.
    pub received: usize,
    /// Reports whose identity was already processed (including duplicates
    /// within the batch).
    pub already_processed: usize,
    /// Reports dropped by the incident filter.
    pub filtered: usize,
    /// Records produced.
    pub new_records: usize,
}

impl IngestSummary {
    /// Whether reports arrived but every one was already processed.
    #[must_use]
    pub const fn all_already_processed(&self) -> bool {
        self.received > 0 && self.already_processed == self.received
    }
}

impl std::fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} received, {} already processed, {} filtered, {} new",
            self.received, self.already_processed, self.filtered, self.new_records
        )
    }
}
