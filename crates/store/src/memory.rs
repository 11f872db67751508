use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::{ResumptionRecord, ResumptionStore, StoreError, StoredUpload, new_key};

/// In-process store. Records are lost when it is dropped.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, ResumptionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResumptionStore for MemoryStore {
    fn find_all(&self) -> Result<Vec<StoredUpload>, StoreError> {
        let map = self.records.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<StoredUpload> = map
            .iter()
            .map(|(key, record)| StoredUpload {
                key: key.clone(),
                record: record.clone(),
            })
            .collect();
        all.sort_by_key(|u| u.record.creation_time);
        Ok(all)
    }

    fn add(&self, fingerprint: &str, record: ResumptionRecord) -> Result<String, StoreError> {
        let key = new_key(fingerprint);
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone(), record);
        Ok(key)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }
}

/// Store that remembers nothing. Used when resumption is disabled and by
/// the parts of a split upload.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStore;

impl ResumptionStore for NoopStore {
    fn find_all(&self) -> Result<Vec<StoredUpload>, StoreError> {
        Ok(Vec::new())
    }

    fn add(&self, fingerprint: &str, _record: ResumptionRecord) -> Result<String, StoreError> {
        Ok(new_key(fingerprint))
    }

    fn remove(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }
}
