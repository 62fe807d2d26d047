//! Progression counters and their persistence.
//!
//! A [`ProgressionLedger`] keeps one [`ProgressionRecord`] per key for a
//! single document (`events.json` or `tasks.json`). Stores implement
//! [`ProgressionStore`]; [`JsonFileStore`] rewrites documents atomically by
//! writing a sibling temp file and renaming it over the target.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use script_events::ProgressionRecord;

/// Errors reading or writing progression documents.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error in {document}: {source}")]
    Json {
        document: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Key/value document storage for progression records.
pub trait ProgressionStore {
    /// Records in `document`, or an empty list if it does not exist yet.
    fn load_records(&self, document: &str) -> Result<Vec<ProgressionRecord>, PersistenceError>;

    fn save_records(
        &mut self,
        document: &str,
        records: &[ProgressionRecord],
    ) -> Result<(), PersistenceError>;
}

/// Documents stored as pretty-printed JSON files in one directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    directory: PathBuf,
}

impl JsonFileStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn document_path(&self, document: &str) -> PathBuf {
        self.directory.join(document)
    }
}

impl ProgressionStore for JsonFileStore {
    fn load_records(&self, document: &str) -> Result<Vec<ProgressionRecord>, PersistenceError> {
        let path = self.document_path(document);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).map_err(|source| PersistenceError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| PersistenceError::Json {
            document: document.to_string(),
            source,
        })
    }

    fn save_records(
        &mut self,
        document: &str,
        records: &[ProgressionRecord],
    ) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.directory).map_err(io_error(&self.directory))?;

        let json = serde_json::to_string_pretty(records).map_err(|source| PersistenceError::Json {
            document: document.to_string(),
            source,
        })?;

        let target = self.document_path(document);
        let temp = self.directory.join(format!("{}.tmp", document));
        fs::write(&temp, json).map_err(io_error(&temp))?;
        fs::rename(&temp, &target).map_err(io_error(&target))?;
        Ok(())
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError {
    let path = path.to_path_buf();
    move |source| PersistenceError::Io { path, source }
}

/// Documents held in memory as JSON text.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    documents: HashMap<String, String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw JSON of a saved document.
    pub fn raw(&self, document: &str) -> Option<&str> {
        self.documents.get(document).map(String::as_str)
    }
}

impl ProgressionStore for InMemoryStore {
    fn load_records(&self, document: &str) -> Result<Vec<ProgressionRecord>, PersistenceError> {
        match self.documents.get(document) {
            None => Ok(Vec::new()),
            Some(json) => serde_json::from_str(json).map_err(|source| PersistenceError::Json {
                document: document.to_string(),
                source,
            }),
        }
    }

    fn save_records(
        &mut self,
        document: &str,
        records: &[ProgressionRecord],
    ) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(records).map_err(|source| PersistenceError::Json {
            document: document.to_string(),
            source,
        })?;
        self.documents.insert(document.to_string(), json);
        Ok(())
    }
}

/// Counters for one document, kept sorted by key.
#[derive(Debug, Clone)]
pub struct ProgressionLedger {
    document: String,
    records: BTreeMap<String, ProgressionRecord>,
}

impl ProgressionLedger {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            records: BTreeMap::new(),
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    /// Record for `key`, created with zero counters on first access.
    pub fn get(&mut self, key: &str) -> ProgressionRecord {
        self.entry(key).clone()
    }

    pub fn record_triggered(&mut self, key: &str) {
        let record = self.entry(key);
        record.times_triggered = record.times_triggered.saturating_add(1);
    }

    pub fn record_completed(&mut self, key: &str) {
        let record = self.entry(key);
        record.times_completed = record.times_completed.saturating_add(1);
    }

    /// All records in key order.
    pub fn records(&self) -> Vec<ProgressionRecord> {
        self.records.values().cloned().collect()
    }

    /// Replaces the in-memory counters with the stored document.
    pub fn load(&mut self, store: &dyn ProgressionStore) -> Result<usize, PersistenceError> {
        let loaded = store.load_records(&self.document)?;
        self.records = loaded.into_iter().map(|r| (r.key.clone(), r)).collect();
        tracing::debug!("Loaded {} records from {}", self.records.len(), self.document);
        Ok(self.records.len())
    }

    pub fn save(&self, store: &mut dyn ProgressionStore) -> Result<(), PersistenceError> {
        store.save_records(&self.document, &self.records())
    }

    fn entry(&mut self, key: &str) -> &mut ProgressionRecord {
        self.records
            .entry(key.to_string())
            .or_insert_with(|| ProgressionRecord::new(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use script_events::{EVENTS_DOCUMENT, TASKS_DOCUMENT};
    use tempfile::tempdir;

    #[test]
    fn test_lazy_records() {
        let mut ledger = ProgressionLedger::new(EVENTS_DOCUMENT);
        assert_eq!(ledger.get("market_day"), ProgressionRecord::new("market_day"));

        ledger.record_triggered("market_day");
        ledger.record_triggered("market_day");
        ledger.record_completed("market_day");

        let record = ledger.get("market_day");
        assert_eq!(record.times_triggered, 2);
        assert_eq!(record.times_completed, 1);
    }

    #[test]
    fn test_records_sorted_by_key() {
        let mut ledger = ProgressionLedger::new(TASKS_DOCUMENT);
        ledger.record_triggered("village_chores");
        ledger.record_triggered("clear_the_bridge");

        let keys: Vec<String> = ledger.records().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec!["clear_the_bridge", "village_chores"]);
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempdir().unwrap();
        let mut store = JsonFileStore::new(dir.path().join("progress"));

        let mut ledger = ProgressionLedger::new(EVENTS_DOCUMENT);
        ledger.record_triggered("bridge_ambush");
        ledger.record_completed("bridge_ambush");
        ledger.save(&mut store).unwrap();

        assert!(store.document_path(EVENTS_DOCUMENT).exists());
        assert!(!dir.path().join("progress").join("events.json.tmp").exists());

        let mut restored = ProgressionLedger::new(EVENTS_DOCUMENT);
        assert_eq!(restored.load(&store).unwrap(), 1);
        assert_eq!(restored.records(), ledger.records());
    }

    #[test]
    fn test_file_format() {
        let dir = tempdir().unwrap();
        let mut store = JsonFileStore::new(dir.path());
        let mut ledger = ProgressionLedger::new(TASKS_DOCUMENT);
        ledger.record_triggered("village_chores");
        ledger.save(&mut store).unwrap();

        let content = fs::read_to_string(dir.path().join("tasks.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value[0]["key"], "village_chores");
        assert_eq!(value[0]["timesTriggered"], 1);
        assert_eq!(value[0]["timesCompleted"], 0);
    }

    #[test]
    fn test_missing_document_is_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let mut ledger = ProgressionLedger::new(EVENTS_DOCUMENT);
        assert_eq!(ledger.load(&store).unwrap(), 0);
    }

    #[test]
    fn test_corrupt_document_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("events.json"), "{ nope").unwrap();
        let store = JsonFileStore::new(dir.path());

        let err = ProgressionLedger::new(EVENTS_DOCUMENT).load(&store).unwrap_err();
        assert!(matches!(err, PersistenceError::Json { .. }));
    }

    #[test]
    fn test_in_memory_store_roundtrip() {
        let mut store = InMemoryStore::new();
        let mut ledger = ProgressionLedger::new(TASKS_DOCUMENT);
        ledger.record_completed("clear_the_bridge");
        ledger.save(&mut store).unwrap();

        assert!(store.raw(TASKS_DOCUMENT).unwrap().contains("timesCompleted"));
        let mut restored = ProgressionLedger::new(TASKS_DOCUMENT);
        restored.load(&store).unwrap();
        assert_eq!(restored.get("clear_the_bridge").times_completed, 1);
    }
}
