//! CSV input and output for the government statistics path.

use std::io::{Read, Write};
use std::path::Path;

use safezone_source::parsing::parse_date;
use safezone_source::retry::{self, RetryPolicy};

use crate::{GovError, GovRecord, GovRow, REQUIRED_COLUMNS};

/// Reads government rows from CSV.
///
/// Extra columns are ignored. `crimes` may be written as an integer or as a
/// whole float (`"12.0"`).
///
/// # Errors
///
/// Returns [`GovError::MissingColumns`] if a required column is absent, or
/// [`GovError::InvalidRow`] for an unparsable date or count.
pub fn read_rows<R: Read>(reader: R) -> Result<Vec<GovRow>, GovError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !headers.iter().any(|h| h == *c))
        .map(ToString::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(GovError::MissingColumns(missing));
    }

    let index = |name: &str| headers.iter().position(|h| h == name).unwrap_or_default();
    let (district_idx, category_idx, date_idx, crimes_idx) = (
        index("district"),
        index("category"),
        index("date"),
        index("crimes"),
    );

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map_or(0, csv::Position::line);
        let cell = |i: usize| record.get(i).unwrap_or("").trim();
        let invalid = |message: String| GovError::InvalidRow { line, message };

        let date = parse_date(cell(date_idx))
            .ok_or_else(|| invalid(format!("unparsable date {:?}", cell(date_idx))))?;
        let crimes = parse_count(cell(crimes_idx))
            .ok_or_else(|| invalid(format!("invalid crimes count {:?}", cell(crimes_idx))))?;

        rows.push(GovRow {
            district: cell(district_idx).to_string(),
            category: cell(category_idx).to_string(),
            date,
            crimes,
        });
    }

    log::info!("Read {} government statistics rows", rows.len());
    Ok(rows)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn parse_count(raw: &str) -> Option<u64> {
    if let Ok(n) = raw.parse::<u64>() {
        return Some(n);
    }
    let f = raw.parse::<f64>().ok()?;
    (f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64).then_some(f as u64)
}

/// Writes records as CSV with a `state,district,category,date,crimes`
/// header.
///
/// # Errors
///
/// Returns [`GovError::Csv`] if writing fails.
pub fn write_records<W: Write>(writer: W, records: &[GovRecord]) -> Result<(), GovError> {
    let mut writer = csv::Writer::from_writer(writer);
    for record in records {
        writer.serialize(record)?;
    }
    if records.is_empty() {
        writer.write_record(["state", "district", "category", "date", "crimes"])?;
    }
    writer.flush()?;
    Ok(())
}

/// Loads rows from a local path or an `http(s)://` URL.
///
/// # Errors
///
/// Returns [`GovError`] if the input cannot be fetched, read, or parsed.
pub async fn load(input: &str, policy: RetryPolicy) -> Result<Vec<GovRow>, GovError> {
    if input.starts_with("http://") || input.starts_with("https://") {
        log::info!("Downloading government statistics: {input}");
        let client = reqwest::Client::new();
        let body = retry::send_text(|| client.get(input), policy).await?;
        return read_rows(body.as_bytes());
    }

    let path = Path::new(input).to_path_buf();
    tokio::task::spawn_blocking(move || read_rows(std::fs::File::open(path)?)).await?
}

/// Writes records to `path`.
///
/// # Errors
///
/// Returns [`GovError`] if the file cannot be created or written.
pub fn save(path: &Path, records: &[GovRecord]) -> Result<(), GovError> {
    let file = std::fs::File::create(path)?;
    write_records(file, records)?;
    log::info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RenameTable, reshape};

    const INPUT: &str = "\
state,district,category,type,date,crimes
Johor,Johor Bahru Selatan,assault,rape,2023-01-01,10
Johor,Johor Bahru Utara,assault,rape,2023-01-01,7.0
Selangor,Klang Utara,property,theft,2023-01-01 00:00:00,4
";

    #[test]
    fn reads_required_columns_and_ignores_others() {
        let rows = read_rows(INPUT.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].crimes, 7);
        assert_eq!(rows[2].date.to_string(), "2023-01-01");
    }

    #[test]
    fn missing_columns_are_reported() {
        let err = read_rows("district,date\nMuar,2023-01-01\n".as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            GovError::MissingColumns(cols) if cols == vec!["category".to_string(), "crimes".to_string()]
        ));
    }

    #[test]
    fn bad_counts_are_rejected() {
        let err = read_rows("district,category,date,crimes\nMuar,property,2023-01-01,-3\n".as_bytes())
            .unwrap_err();
        assert!(matches!(err, GovError::InvalidRow { line: 2, .. }));
    }

    #[test]
    fn writes_sheet_layout() {
        let records = reshape(&read_rows(INPUT.as_bytes()).unwrap(), &RenameTable::default());
        let mut out = Vec::new();
        write_records(&mut out, &records).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "state,district,category,date,crimes\n\
             ,Johor Bahru,assault,2023-01-01,17\n\
             ,Klang,property,2023-01-01,4\n"
        );
    }

    #[test]
    fn empty_output_still_has_header() {
        let mut out = Vec::new();
        write_records(&mut out, &[]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "state,district,category,date,crimes\n"
        );
    }

    #[tokio::test]
    async fn loads_and_saves_files() {
        let dir = std::env::temp_dir();
        let input = dir.join(format!("safezone_gov_in_{}.csv", std::process::id()));
        let output = dir.join(format!("safezone_gov_out_{}.csv", std::process::id()));
        std::fs::write(&input, INPUT).unwrap();

        let rows = load(input.to_str().unwrap(), RetryPolicy::default()).await.unwrap();
        save(&output, &reshape(&rows, &RenameTable::default())).unwrap();
        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.contains(",Johor Bahru,assault,2023-01-01,17"));

        std::fs::remove_file(&input).ok();
        std::fs::remove_file(&output).ok();
    }
}
