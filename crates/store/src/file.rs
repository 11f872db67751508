use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::debug;

use crate::{ResumptionRecord, ResumptionStore, StoreError, StoredUpload, new_key};

/// Store persisted to a JSON file.
///
/// Records are cached in memory and the whole map is rewritten on every
/// change.
pub struct FileStore {
    path: PathBuf,
    records: RwLock<BTreeMap<String, ResumptionRecord>>,
}

impl FileStore {
    /// Opens the store at `path`, loading existing records.
    pub fn new(path: PathBuf) -> Result<Self, StoreError> {
        let records = load_records(&path)?;
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, map: &BTreeMap<String, ResumptionRecord>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(map)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write then rename so a crash never leaves a truncated file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(count = map.len(), path = %self.path.display(), "persisted resumption records");
        Ok(())
    }
}

impl ResumptionStore for FileStore {
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
        let mut map = self.records.write().unwrap_or_else(|e| e.into_inner());
        map.insert(key.clone(), record);
        self.persist(&map)?;
        Ok(key)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut map = self.records.write().unwrap_or_else(|e| e.into_inner());
        if map.remove(key).is_some() {
            self.persist(&map)?;
        }
        Ok(())
    }
}

fn load_records(path: &Path) -> Result<BTreeMap<String, ResumptionRecord>, StoreError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let data = std::fs::read_to_string(path)?;
    if data.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let records: BTreeMap<String, ResumptionRecord> = serde_json::from_str(&data)?;
    debug!(count = records.len(), path = %path.display(), "loaded resumption records");
    Ok(records)
}

/// Returns the default store path (`<config dir>/resumable/uploads.json`).
pub fn default_store_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("resumable").join("uploads.json"))
}

fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config"))
    }
}
