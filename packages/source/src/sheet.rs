//! CSV exports of the crowd-sourced report sheet.

use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use safezone_report_models::SheetRow;
use serde::{Deserialize, Serialize};

use crate::retry::{self, RetryPolicy};
use crate::{ReportSource, SourceError};

/// Per-request HTTP timeout for sheet downloads.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Header names of the three columns the pipeline reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    /// Report timestamp column.
    pub date: String,
    /// Topic label column.
    pub topic: String,
    /// Free-text column.
    pub text: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            date: "Date (GMT)".to_string(),
            topic: "Main Topic".to_string(),
            text: "Tweet Text".to_string(),
        }
    }
}

/// Parses a sheet CSV export into rows.
///
/// Headers are matched after trimming; extra columns are ignored and short
/// rows are tolerated. Blank cells become `None`.
///
/// # Errors
///
/// Returns [`SourceError::MissingColumn`] if a configured column is absent,
/// or [`SourceError::Csv`] if the CSV is malformed.
pub fn read_sheet<R: Read>(reader: R, columns: &ColumnNames) -> Result<Vec<SheetRow>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_owned())
        .collect();

    let index_of = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| SourceError::MissingColumn {
                column: name.to_string(),
            })
    };
    let date_idx = index_of(&columns.date)?;
    let topic_idx = index_of(&columns.topic)?;
    let text_idx = index_of(&columns.text)?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let cell = |i: usize| {
            record
                .get(i)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };
        rows.push(SheetRow {
            date: cell(date_idx),
            topic: cell(topic_idx),
            text: cell(text_idx),
        });
    }

    log::debug!("Parsed {} sheet rows", rows.len());
    Ok(rows)
}

/// A sheet export saved to disk.
#[derive(Debug, Clone)]
pub struct CsvFileSource {
    path: PathBuf,
    columns: ColumnNames,
}

impl CsvFileSource {
    /// Creates a source reading `path`.
    #[must_use]
    pub const fn new(path: PathBuf, columns: ColumnNames) -> Self {
        Self { path, columns }
    }
}

#[async_trait]
impl ReportSource for CsvFileSource {
    fn id(&self) -> &str {
        "csv_file"
    }

    async fn fetch(&self) -> Result<Vec<SheetRow>, SourceError> {
        let path = self.path.clone();
        let columns = self.columns.clone();
        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&path)?;
            read_sheet(file, &columns)
        })
        .await?
    }
}

/// A sheet published as a CSV export URL.
#[derive(Debug, Clone)]
pub struct CsvUrlSource {
    url: String,
    columns: ColumnNames,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl CsvUrlSource {
    /// Creates a source downloading `url`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(url: String, columns: ColumnNames, retry: RetryPolicy) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            url,
            columns,
            retry,
            client,
        })
    }
}

#[async_trait]
impl ReportSource for CsvUrlSource {
    fn id(&self) -> &str {
        "csv_url"
    }

    /// Download failures that survive every retry yield zero rows rather
    /// than an error.
    async fn fetch(&self) -> Result<Vec<SheetRow>, SourceError> {
        log::info!("Downloading sheet export: {}", self.url);

        let body = match retry::send_text(|| self.client.get(&self.url), self.retry).await {
            Ok(body) => body,
            Err(e) => {
                log::error!("Failed to fetch {}: {e}; continuing with no rows", self.url);
                return Ok(Vec::new());
            }
        };

        read_sheet(body.as_bytes(), &self.columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = "\
Date (GMT), Main Topic ,Tweet Text,Retweets
2024-11-02 08:00:00,rompak,dirompak di shah alam semalam,4
2024-11-03 09:30:00,,kejadian di kawasan kuala lumpur,0
,curi,no date here
2024-11-04 10:00:00,curi
";

    #[test]
    fn reads_configured_columns() {
        let rows = read_sheet(SHEET.as_bytes(), &ColumnNames::default()).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].date.as_deref(), Some("2024-11-02 08:00:00"));
        assert_eq!(rows[0].topic.as_deref(), Some("rompak"));
        assert_eq!(rows[0].text.as_deref(), Some("dirompak di shah alam semalam"));
        assert_eq!(rows[1].topic, None);
        assert_eq!(rows[2].date, None);
        assert_eq!(rows[3].text, None);
    }

    #[test]
    fn missing_column_is_an_error() {
        let columns = ColumnNames {
            text: "Body".to_string(),
            ..ColumnNames::default()
        };
        assert!(matches!(
            read_sheet(SHEET.as_bytes(), &columns),
            Err(SourceError::MissingColumn { column }) if column == "Body"
        ));
    }

    #[tokio::test]
    async fn file_source_reads_from_disk() {
        let path = std::env::temp_dir().join(format!(
            "safezone_sheet_{}_{}.csv",
            std::process::id(),
            line!()
        ));
        std::fs::write(&path, SHEET).unwrap();

        let source = CsvFileSource::new(path.clone(), ColumnNames::default());
        let rows = source.fetch().await.unwrap();
        assert_eq!(rows.len(), 4);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let source = CsvFileSource::new(
            std::env::temp_dir().join("safezone_definitely_missing.csv"),
            ColumnNames::default(),
        );
        assert!(matches!(source.fetch().await, Err(SourceError::Io(_))));
    }

    #[tokio::test]
    async fn unreachable_url_yields_no_rows() {
        let source = CsvUrlSource::new(
            "http://127.0.0.1:9/sheet.csv".to_string(),
            ColumnNames::default(),
            RetryPolicy {
                attempts: 2,
                delay_secs: 0,
            },
        )
        .unwrap();
        assert!(source.fetch().await.unwrap().is_empty());
    }
}
