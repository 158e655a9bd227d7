#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Report sources for the ingest pipeline.
//!
//! Each source implements [`ReportSource`] and yields loosely typed
//! [`SheetRow`]s; [`parsing::validate_rows`] turns them into
//! [`safezone_report_models::RawReport`]s at the ingestion boundary.

pub mod parsing;
pub mod progress;
pub mod retry;
pub mod sheet;

use std::path::PathBuf;

use async_trait::async_trait;
use safezone_report_models::SheetRow;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;
use crate::sheet::{ColumnNames, CsvFileSource, CsvUrlSource};

/// Errors that can occur while fetching or reading a source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// Every retry attempt failed.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// The error from the final attempt.
        last: Box<SourceError>,
    },

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking task panicked or was cancelled.
    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// A required column is not in the header row.
    #[error("missing required column {column:?}")]
    MissingColumn {
        /// The column that was looked for.
        column: String,
    },
}

impl SourceError {
    /// Whether retrying might help.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_body() || e.is_request(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::RetriesExhausted { .. }
            | Self::Csv(_)
            | Self::Io(_)
            | Self::Join(_)
            | Self::MissingColumn { .. } => false,
        }
    }
}

/// Anything that can produce sheet rows.
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Short identifier for logs (e.g. `"csv_url"`).
    fn id(&self) -> &str;

    /// Fetches every row currently in the source.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the source cannot be read at all.
    async fn fetch(&self) -> Result<Vec<SheetRow>, SourceError>;
}

/// Where reports come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// A CSV export on disk.
    CsvFile {
        /// File path.
        path: PathBuf,
        /// Column headers to read.
        #[serde(default)]
        columns: ColumnNames,
    },
    /// A CSV export URL.
    CsvUrl {
        /// Export URL.
        url: String,
        /// Column headers to read.
        #[serde(default)]
        columns: ColumnNames,
        /// Download retry policy.
        #[serde(default)]
        retry: RetryPolicy,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::CsvFile {
            path: PathBuf::from("data/reports.csv"),
            columns: ColumnNames::default(),
        }
    }
}

impl SourceConfig {
    /// Replaces the source with a URL, keeping the configured columns.
    #[must_use]
    pub fn with_url(self, url: String) -> Self {
        match self {
            Self::CsvFile { columns, .. } => Self::CsvUrl {
                url,
                columns,
                retry: RetryPolicy::default(),
            },
            Self::CsvUrl { columns, retry, .. } => Self::CsvUrl {
                url,
                columns,
                retry,
            },
        }
    }

    /// Instantiates the configured source.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the HTTP client cannot be built.
    pub fn build(&self) -> Result<Box<dyn ReportSource>, SourceError> {
        Ok(match self {
            Self::CsvFile { path, columns } => {
                Box::new(CsvFileSource::new(path.clone(), columns.clone()))
            }
            Self::CsvUrl {
                url,
                columns,
                retry,
            } => Box::new(CsvUrlSource::new(url.clone(), columns.clone(), *retry)?),
        })
    }
}
