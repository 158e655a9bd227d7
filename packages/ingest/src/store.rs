//! Publication of crime records and the processed set.
//!
//! The datastore is one JSON document:
//!
//! ```json
//! {
//!   "crime_data": { "<id>": { "state": "...", "district": "...", "category": "...", "type": "...", "date": "YYYY-MM-DD" } },
//!   "processed_ids": { "<id>": true }
//! }
//! ```
//!
//! Records are append-only: publishing never changes a record already
//! stored under the same id.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use safezone_report_models::{CrimeRecord, ProcessedSet, ReportIdentity, StoredRecord};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::IngestError;

/// Where records and processed identities are kept.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Reads the processed set. Empty when nothing has been published.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if the store exists but cannot be read.
    async fn load_processed(&self) -> Result<ProcessedSet, IngestError>;

    /// Adds `records` and `processed` to the store in a single write.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] if the store cannot be read or written.
    async fn publish(
        &self,
        records: &[CrimeRecord],
        processed: &ProcessedSet,
    ) -> Result<(), IngestError>;
}

/// The on-disk document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datastore {
    /// Published records keyed by identity.
    #[serde(default)]
    pub crime_data: BTreeMap<ReportIdentity, StoredRecord>,
    /// Every identity already processed.
    #[serde(default)]
    pub processed_ids: ProcessedSet,
}

impl Datastore {
    /// Merges a batch. Existing records are left untouched.
    ///
    /// Returns the number of records actually added.
    pub fn merge(&mut self, records: &[CrimeRecord], processed: &ProcessedSet) -> usize {
        let mut added = 0;
        for record in records {
            if let std::collections::btree_map::Entry::Vacant(entry) =
                self.crime_data.entry(record.id.clone())
            {
                entry.insert(record.to_stored());
                added += 1;
            } else {
                log::debug!("Record {} already published, keeping stored copy", record.id);
            }
            self.processed_ids.insert(record.id.clone());
        }
        self.processed_ids.merge(processed);
        added
    }
}

/// A [`Datastore`] kept in a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reads the datastore, treating a missing or blank file as empty.
fn read_datastore(path: &Path) -> Result<Datastore, IngestError> {
    if !path.exists() {
        log::info!("No datastore at {}, starting empty", path.display());
        return Ok(Datastore::default());
    }

    let text = std::fs::read_to_string(path)?;
    if text.trim().is_empty() {
        return Ok(Datastore::default());
    }
    Ok(serde_json::from_str(&text)?)
}

/// Writes the datastore through a `.tmp` sibling and a rename so readers
/// never see a partial document.
fn write_datastore(path: &Path, datastore: &Datastore) -> Result<(), IngestError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let contents = serde_json::to_string_pretty(datastore)?;
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn load_processed(&self) -> Result<ProcessedSet, IngestError> {
        let path = self.path.clone();
        let datastore = tokio::task::spawn_blocking(move || read_datastore(&path)).await??;
        Ok(datastore.processed_ids)
    }

    async fn publish(
        &self,
        records: &[CrimeRecord],
        processed: &ProcessedSet,
    ) -> Result<(), IngestError> {
        let path = self.path.clone();
        let records = records.to_vec();
        let processed = processed.clone();

        tokio::task::spawn_blocking(move || {
            // Re-read so ids published by another run since our load survive.
            let mut datastore = read_datastore(&path)?;
            let added = datastore.merge(&records, &processed);
            write_datastore(&path, &datastore)?;
            log::info!(
                "Published {added} records to {} ({} total, {} processed ids)",
                path.display(),
                datastore.crime_data.len(),
                datastore.processed_ids.len()
            );
            Ok::<_, IngestError>(())
        })
        .await??;

        Ok(())
    }
}

/// A [`Datastore`] held in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    datastore: Mutex<Datastore>,
    publishes: AtomicUsize,
}

impl MemoryStore {
    /// Number of successful [`RecordStore::publish`] calls.
    #[must_use]
    pub fn publish_count(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }

    /// A copy of the current contents.
    pub async fn snapshot(&self) -> Datastore {
        self.datastore.lock().await.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load_processed(&self) -> Result<ProcessedSet, IngestError> {
        Ok(self.datastore.lock().await.processed_ids.clone())
    }

    async fn publish(
        &self,
        records: &[CrimeRecord],
        processed: &ProcessedSet,
    ) -> Result<(), IngestError> {
        self.datastore.lock().await.merge(records, processed);
        self.publishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use safezone_crime_models::{CrimeClassification, CrimeType};
    use safezone_report_models::ResolvedLocation;

    use super::*;

    fn record(text: &str, district: &str) -> CrimeRecord {
        let date = NaiveDate::from_ymd_opt(2024, 11, 2).unwrap();
        CrimeRecord {
            id: ReportIdentity::compute(date, text),
            location: ResolvedLocation::district("selangor", district),
            classification: CrimeClassification::of(CrimeType::Robbery),
            date,
        }
    }

    fn temp_store(name: &str) -> JsonFileStore {
        let dir = std::env::temp_dir().join(format!("safezone_store_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        JsonFileStore::new(dir.join("nested").join("safezone.json"))
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let store = temp_store("missing");
        assert!(store.load_processed().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn publish_writes_expected_shape() {
        let store = temp_store("shape");
        let rec = record("rompakan di shah alam", "shah alam");
        let processed: ProcessedSet = [rec.id.clone()].into_iter().collect();

        store.publish(std::slice::from_ref(&rec), &processed).await.unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(json["processed_ids"][rec.id.as_str()], serde_json::json!(true));
        assert_eq!(
            json["crime_data"][rec.id.as_str()],
            serde_json::json!({
                "state": "selangor",
                "district": "shah alam",
                "category": "property",
                "type": "robbery",
                "date": "2024-11-02",
            })
        );

        let mut tmp = store.path().as_os_str().to_owned();
        tmp.push(".tmp");
        assert!(!PathBuf::from(tmp).exists());
    }

    #[tokio::test]
    async fn publish_merges_with_existing_contents() {
        let store = temp_store("merge");
        let first = record("first", "klang");
        let second = record("second", "kajang");

        store
            .publish(
                std::slice::from_ref(&first),
                &[first.id.clone()].into_iter().collect(),
            )
            .await
            .unwrap();
        store
            .publish(
                std::slice::from_ref(&second),
                &[second.id.clone()].into_iter().collect(),
            )
            .await
            .unwrap();

        let processed = store.load_processed().await.unwrap();
        assert!(processed.contains(&first.id));
        assert!(processed.contains(&second.id));

        let datastore = read_datastore(store.path()).unwrap();
        assert_eq!(datastore.crime_data.len(), 2);
    }

    #[tokio::test]
    async fn stored_records_are_never_overwritten() {
        let store = MemoryStore::default();
        let original = record("same", "klang");
        let mut changed = original.clone();
        changed.location = ResolvedLocation::district("selangor", "kajang");

        store.publish(&[original.clone()], &ProcessedSet::new()).await.unwrap();
        store.publish(&[changed], &ProcessedSet::new()).await.unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.crime_data[&original.id].district, "klang");
        assert_eq!(store.publish_count(), 2);
    }

    #[test]
    fn blank_file_reads_as_empty() {
        let dir = std::env::temp_dir().join(format!("safezone_store_blank_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("safezone.json");
        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(read_datastore(&path).unwrap(), Datastore::default());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = std::env::temp_dir().join(format!("safezone_store_corrupt_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("safezone.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(read_datastore(&path), Err(IngestError::Json(_))));
    }
}
