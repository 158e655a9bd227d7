#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Deduplicating ingest controller for crowd-sourced crime reports.
//!
//! A run fetches sheet rows, validates them into reports, skips every report
//! whose identity is already in the processed set, resolves location and
//! classification for the rest, and publishes the new records together with
//! the grown processed set in one write.

pub mod config;
pub mod store;

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use safezone_crime_models::CrimeClassification;
use safezone_extract::{Extraction, Extractor};
use safezone_report_models::{
    CrimeRecord, IngestSummary, ProcessedSet, RawReport, ReportIdentity, ResolvedLocation,
};
use safezone_source::progress::ProgressCallback;

use crate::config::PipelineConfig;
use crate::store::{JsonFileStore, RecordStore};

/// Errors that abort an ingest run.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    /// The gazetteer failed validation.
    #[error("Gazetteer error: {0}")]
    Gazetteer(#[from] safezone_gazetteer::GazetteerError),

    /// The source could not be read.
    #[error("Source error: {0}")]
    Source(#[from] safezone_source::SourceError),

    /// I/O error (datastore read/write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The datastore is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A worker task panicked or was cancelled.
    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result of ingesting one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    /// New records, in input order.
    pub records: Vec<CrimeRecord>,
    /// The input processed set plus every new record's identity.
    pub processed: ProcessedSet,
    /// Counts for logging.
    pub summary: IngestSummary,
}

/// Reports that still need processing, with their identities.
///
/// Drops reports already in `processed` and repeats of an identity earlier
/// in the same batch.
fn select_new<'a>(
    reports: &'a [RawReport],
    processed: &ProcessedSet,
) -> (Vec<(ReportIdentity, &'a RawReport)>, usize) {
    let mut seen = BTreeSet::new();
    let mut skipped = 0;

    let selected = reports
        .iter()
        .filter_map(|report| {
            let id = report.identity();
            if processed.contains(&id) || !seen.insert(id.clone()) {
                skipped += 1;
                None
            } else {
                Some((id, report))
            }
        })
        .collect();

    (selected, skipped)
}

/// Filters, resolves, and assembles one record.
///
/// Returns `None` when the incident filter rejects the report. A panic in
/// the filter or in extraction is contained to this report, which is kept
/// with unknown location and classification.
fn process_one(extractor: &Extractor, id: ReportIdentity, report: &RawReport) -> Option<CrimeRecord> {
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
        extractor
            .is_incident(report)
            .then(|| extractor.extract(report))
    }));

    let extraction = match outcome {
        Ok(Some(extraction)) => extraction,
        Ok(None) => {
            log::debug!("Not a crime incident, skipping: {}", report.text);
            return None;
        }
        Err(_) => {
            log::error!("Extraction failed for report {id}; using unknown defaults");
            Extraction {
                location: ResolvedLocation::unknown(),
                classification: CrimeClassification::UNKNOWN,
            }
        }
    };

    Some(CrimeRecord {
        id,
        location: extraction.location,
        classification: extraction.classification,
        date: report.date,
    })
}

fn finish(
    received: usize,
    already_processed: usize,
    candidates: usize,
    records: Vec<CrimeRecord>,
    processed: &ProcessedSet,
) -> IngestOutcome {
    let mut updated = processed.clone();
    for record in &records {
        updated.insert(record.id.clone());
    }

    let summary = IngestSummary {
        received,
        already_processed,
        filtered: candidates - records.len(),
        new_records: records.len(),
    };

    if summary.all_already_processed() {
        log::info!("No new data to process.");
    } else if records.is_empty() && candidates > 0 {
        log::info!("All {candidates} new reports were filtered out");
    }

    IngestOutcome {
        records,
        processed: updated,
        summary,
    }
}

/// Ingests a batch on the current thread.
///
/// Reports whose identity is in `processed` are never reprocessed, so
/// feeding the outcome's `processed` back in with the same reports yields
/// no new records.
#[must_use]
pub fn ingest(reports: &[RawReport], processed: &ProcessedSet, extractor: &Extractor) -> IngestOutcome {
    if reports.is_empty() {
        log::info!("No data to process.");
        return finish(0, 0, 0, Vec::new(), processed);
    }

    let (candidates, already_processed) = select_new(reports, processed);
    let count = candidates.len();
    let records = candidates
        .into_iter()
        .filter_map(|(id, report)| process_one(extractor, id, report))
        .collect();

    finish(reports.len(), already_processed, count, records, processed)
}

/// Ingests a batch across `workers` blocking tasks.
///
/// New reports are split into contiguous chunks, resolved on
/// [`tokio::task::spawn_blocking`], and reassembled in input order, so the
/// outcome equals [`ingest`] on the same input. `workers == 0` uses the
/// available parallelism.
///
/// # Errors
///
/// Returns [`IngestError::Join`] if a worker task is cancelled.
pub async fn ingest_parallel(
    reports: &[RawReport],
    processed: &ProcessedSet,
    extractor: &Extractor,
    workers: usize,
    progress: Arc<dyn ProgressCallback>,
) -> Result<IngestOutcome, IngestError> {
    if reports.is_empty() {
        log::info!("No data to process.");
        return Ok(finish(0, 0, 0, Vec::new(), processed));
    }

    let (candidates, already_processed) = select_new(reports, processed);
    let count = candidates.len();
    progress.set_total(count as u64);

    let workers = config::effective_workers(workers);
    let chunk_size = count.div_ceil(workers).max(1);
    log::info!("Resolving {count} new reports on {workers} workers");

    let handles: Vec<_> = candidates
        .chunks(chunk_size)
        .map(|chunk| {
            let chunk: Vec<(ReportIdentity, RawReport)> = chunk
                .iter()
                .map(|(id, report)| (id.clone(), (*report).clone()))
                .collect();
            let extractor = extractor.clone();
            let progress = progress.clone();
            tokio::task::spawn_blocking(move || {
                chunk
                    .into_iter()
                    .filter_map(|(id, report)| {
                        let record = process_one(&extractor, id, &report);
                        progress.inc(1);
                        record
                    })
                    .collect::<Vec<CrimeRecord>>()
            })
        })
        .collect();

    let records = futures::future::try_join_all(handles)
        .await?
        .into_iter()
        .flatten()
        .collect();

    progress.finish(format!("Resolved {count} reports"));
    Ok(finish(reports.len(), already_processed, count, records, processed))
}

/// Options for [`run`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Resolve everything but do not publish.
    pub dry_run: bool,
}

/// Runs the whole pipeline: fetch, validate, ingest, publish.
///
/// # Errors
///
/// Returns [`IngestError`] if the gazetteer is invalid, the source cannot be
/// read, or the datastore cannot be read or written.
pub async fn run(
    config: &PipelineConfig,
    options: RunOptions,
    progress: Arc<dyn ProgressCallback>,
) -> Result<IngestSummary, IngestError> {
    let start = Instant::now();

    let gazetteer = Arc::new(config.gazetteer.load()?);
    let extractor = Extractor::new(gazetteer, config.resolver, config.filter.clone());

    let source = config.source.build()?;
    let rows = source.fetch().await?;
    log::info!("Fetched {} rows from {}", rows.len(), source.id());

    let reports = safezone_source::parsing::validate_rows(&rows);
    if reports.is_empty() {
        log::info!("No data to process.");
        return Ok(IngestSummary::default());
    }

    let store = JsonFileStore::new(config.store.path.clone());
    let summary = run_with_store(
        &store,
        &reports,
        &extractor,
        config.ingest.workers,
        options,
        progress,
    )
    .await?;

    log::info!(
        "Ingest finished in {:.1}s: {summary}",
        start.elapsed().as_secs_f64()
    );
    Ok(summary)
}

/// Ingests `reports` against `store`: reads the processed set once, and
/// publishes new records and identities in a single write.
///
/// # Errors
///
/// Returns [`IngestError`] if the store cannot be read or written.
pub async fn run_with_store(
    store: &dyn RecordStore,
    reports: &[RawReport],
    extractor: &Extractor,
    workers: usize,
    options: RunOptions,
    progress: Arc<dyn ProgressCallback>,
) -> Result<IngestSummary, IngestError> {
    let processed = store.load_processed().await?;
    log::info!("{} identities already processed", processed.len());

    let outcome = ingest_parallel(reports, &processed, extractor, workers, progress).await?;

    if outcome.records.is_empty() {
        return Ok(outcome.summary);
    }

    if options.dry_run {
        log::info!(
            "Dry run: not publishing {} new crime records",
            outcome.records.len()
        );
    } else {
        store.publish(&outcome.records, &outcome.processed).await?;
        log::info!("Added {} new crime records", outcome.records.len());
    }

    Ok(outcome.summary)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use safezone_crime_models::CrimeType;
    use safezone_extract::ExtractError;
    use safezone_extract::filter::{FilterConfig, IncidentFilter};
    use safezone_extract::ner::{Entity, EntityRecognizer, HeuristicRecognizer};
    use safezone_extract::resolver::{LocationResolver, ResolverConfig};
    use safezone_gazetteer::Gazetteer;
    use safezone_source::progress::null_progress;

    use super::*;
    use crate::store::MemoryStore;

    fn extractor() -> Extractor {
        Extractor::new(
            Arc::new(Gazetteer::malaysia().unwrap()),
            ResolverConfig::default(),
            FilterConfig::default(),
        )
    }

    fn report(day: u32, topic: &str, text: &str) -> RawReport {
        RawReport {
            date: NaiveDate::from_ymd_opt(2024, 11, day).unwrap(),
            topic: topic.to_string(),
            text: text.to_string(),
        }
    }

    fn batch() -> Vec<RawReport> {
        vec![
            report(2, "rompak", "dirompak di shah alam semalam"),
            report(3, "curi", "kejadian di kawasan kuala lumpur"),
            report(4, "xyz", "sesuatu berlaku malam tadi"),
            report(5, "rogol", "kes rogol di Muar, Johor"),
            report(6, "bunuh", "mayat ditemui dekat tasik di Ipoh"),
            report(7, "theft", "motosikal dicuri di JB"),
        ]
    }

    #[test]
    fn resolves_new_reports() {
        let outcome = ingest(&batch(), &ProcessedSet::new(), &extractor());
        assert_eq!(outcome.records.len(), 6);
        assert_eq!(outcome.processed.len(), 6);

        let first = &outcome.records[0];
        assert_eq!(first.id, batch()[0].identity());
        assert_eq!(first.location, ResolvedLocation::district("selangor", "shah alam"));
        assert_eq!(first.classification, CrimeClassification::of(CrimeType::Robbery));

        let second = &outcome.records[1];
        assert_eq!(second.location, ResolvedLocation::state_only("w.p. kuala lumpur"));
        assert_eq!(second.classification, CrimeClassification::of(CrimeType::Theft));

        let third = &outcome.records[2];
        assert_eq!(third.location, ResolvedLocation::unknown());
        assert_eq!(third.classification, CrimeClassification::UNKNOWN);
    }

    #[test]
    fn second_run_produces_nothing() {
        let extractor = extractor();
        let first = ingest(&batch(), &ProcessedSet::new(), &extractor);
        let second = ingest(&batch(), &first.processed, &extractor);
        assert!(second.records.is_empty());
        assert_eq!(second.processed, first.processed);
        assert_eq!(second.summary.already_processed, batch().len());
    }

    #[test]
    fn duplicates_within_a_batch_are_processed_once() {
        let mut reports = batch();
        reports.push(reports[0].clone());
        let outcome = ingest(&reports, &ProcessedSet::new(), &extractor());
        assert_eq!(outcome.records.len(), 6);
        assert_eq!(outcome.summary.already_processed, 1);
    }

    #[test]
    fn previously_processed_ids_are_kept() {
        let old = ReportIdentity::from_stored("0123456789abcdef0123456789abcdef");
        let processed: ProcessedSet = [old.clone()].into_iter().collect();
        let outcome = ingest(&batch()[..1], &processed, &extractor());
        assert!(outcome.processed.contains(&old));
        assert_eq!(outcome.processed.len(), 2);
    }

    #[test]
    fn empty_batch_is_not_an_error() {
        let outcome = ingest(&[], &ProcessedSet::new(), &extractor());
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.summary, IngestSummary::default());
    }

    #[test]
    fn filtered_reports_are_not_recorded() {
        let extractor = Extractor::new(
            Arc::new(Gazetteer::malaysia().unwrap()),
            ResolverConfig::default(),
            FilterConfig {
                enabled: true,
                ..FilterConfig::default()
            },
        );
        let reports = vec![
            report(2, "rompak", "Rompakan di Shah Alam"),
            report(3, "xyz", "Jualan murah di Shah Alam"),
        ];
        let outcome = ingest(&reports, &ProcessedSet::new(), &extractor);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.summary.filtered, 1);
        assert!(!outcome.processed.contains(&reports[1].identity()));
    }

    #[test]
    fn resolved_districts_match_owner() {
        let extractor = extractor();
        let gazetteer = extractor.resolver().gazetteer();
        let outcome = ingest(&batch(), &ProcessedSet::new(), &extractor);
        for record in outcome.records {
            if let Some(owner) = gazetteer.owner_state(&record.location.district) {
                assert_eq!(record.location.state, owner);
            }
        }
    }

    /// Behaves like the heuristic recognizer but panics on any text
    /// containing "bad".
    struct CrashingRecognizer;

    impl EntityRecognizer for CrashingRecognizer {
        fn name(&self) -> &str {
            "crashing"
        }

        fn recognize(&self, text: &str) -> Result<Vec<Entity>, ExtractError> {
            assert!(!text.contains("bad"), "model crashed");
            HeuristicRecognizer.recognize(text)
        }
    }

    fn crashing_extractor(filter: FilterConfig) -> Extractor {
        Extractor::from_parts(
            LocationResolver::with_recognizer(
                Arc::new(Gazetteer::malaysia().unwrap()),
                ResolverConfig::default(),
                Some(Arc::new(CrashingRecognizer)),
            ),
            IncidentFilter::new(filter),
        )
    }

    fn assert_degraded_then_resolved(outcome: &IngestOutcome) {
        assert_eq!(outcome.records.len(), 2);

        let bad = &outcome.records[0];
        assert_eq!(bad.location, ResolvedLocation::unknown());
        assert_eq!(bad.classification, CrimeClassification::UNKNOWN);

        let good = &outcome.records[1];
        assert_eq!(good.location, ResolvedLocation::district("selangor", "shah alam"));
        assert_eq!(good.classification, CrimeClassification::of(CrimeType::Robbery));
        assert_eq!(outcome.processed.len(), 2);
    }

    #[test]
    fn resolver_panic_degrades_only_that_row() {
        // No alias or locative phrase, so the entity stage runs and panics.
        let reports = vec![
            report(2, "rompak", "something bad happened"),
            report(3, "rompak", "rompakan di Shah Alam"),
        ];
        let extractor = crashing_extractor(FilterConfig::default());
        assert_degraded_then_resolved(&ingest(&reports, &ProcessedSet::new(), &extractor));
    }

    #[test]
    fn filter_panic_degrades_only_that_row() {
        let reports = vec![
            report(2, "rompak", "rompakan bad di Kajang"),
            report(3, "rompak", "rompakan di Shah Alam"),
        ];
        let extractor = crashing_extractor(FilterConfig {
            enabled: true,
            ..FilterConfig::default()
        });
        let outcome = ingest(&reports, &ProcessedSet::new(), &extractor);
        assert_degraded_then_resolved(&outcome);
        assert_eq!(outcome.summary.filtered, 0);
    }

    #[tokio::test]
    async fn parallel_contains_row_panics() {
        for (filter_enabled, bad_text) in [
            (false, "something bad happened"),
            (true, "rompakan bad di Kajang"),
        ] {
            let reports = vec![
                report(2, "rompak", bad_text),
                report(3, "rompak", "rompakan di Shah Alam"),
            ];
            let extractor = crashing_extractor(FilterConfig {
                enabled: filter_enabled,
                ..FilterConfig::default()
            });
            let outcome = ingest_parallel(
                &reports,
                &ProcessedSet::new(),
                &extractor,
                2,
                null_progress(),
            )
            .await
            .unwrap();
            assert_degraded_then_resolved(&outcome);
            assert_eq!(outcome, ingest(&reports, &ProcessedSet::new(), &extractor));
        }
    }

    #[tokio::test]
    async fn parallel_matches_sequential() {
        let extractor = extractor();
        let mut reports = batch();
        for day in 8..=28 {
            reports.push(report(day, "curi", &format!("kecurian {day} di Kajang")));
        }

        let sequential = ingest(&reports, &ProcessedSet::new(), &extractor);
        for workers in [1, 3, 8, 64] {
            let parallel = ingest_parallel(
                &reports,
                &ProcessedSet::new(),
                &extractor,
                workers,
                null_progress(),
            )
            .await
            .unwrap();
            assert_eq!(parallel, sequential, "workers = {workers}");
        }
    }

    #[tokio::test]
    async fn run_with_store_publishes_once() {
        let store = MemoryStore::default();
        let extractor = extractor();

        let first = run_with_store(
            &store,
            &batch(),
            &extractor,
            2,
            RunOptions::default(),
            null_progress(),
        )
        .await
        .unwrap();
        assert_eq!(first.new_records, 6);

        let second = run_with_store(
            &store,
            &batch(),
            &extractor,
            2,
            RunOptions::default(),
            null_progress(),
        )
        .await
        .unwrap();
        assert_eq!(second.new_records, 0);
        assert_eq!(store.publish_count(), 1);
    }

    #[tokio::test]
    async fn dry_run_does_not_publish() {
        let store = MemoryStore::default();
        let summary = run_with_store(
            &store,
            &batch(),
            &extractor(),
            2,
            RunOptions { dry_run: true },
            null_progress(),
        )
        .await
        .unwrap();
        assert_eq!(summary.new_records, 6);
        assert_eq!(store.publish_count(), 0);
        assert!(store.load_processed().await.unwrap().is_empty());
    }
}
