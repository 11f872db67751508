//! Resumption records.
//!
//! A record remembers where a previous upload of the same source went, so
//! that a later session can probe the server and continue from its offset
//! instead of starting over. Stores are injected into sessions; there is no
//! process-wide store.

mod file;
mod memory;
mod record;

use std::sync::Arc;

pub use file::{FileStore, default_store_path};
pub use memory::{MemoryStore, NoopStore};
pub use record::{ResumptionRecord, StoredUpload};

/// Key prefix shared by every stored record.
pub const KEY_PREFIX: &str = "tus::";

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Maps source fingerprints to resumption records.
///
/// A missing fingerprint is an empty result, not an error. Implementations
/// must tolerate concurrent use from many sessions.
pub trait ResumptionStore: Send + Sync {
    /// Every record in the store.
    fn find_all(&self) -> Result<Vec<StoredUpload>, StoreError>;

    /// Records stored under `fingerprint`, oldest first.
    fn find(&self, fingerprint: &str) -> Result<Vec<StoredUpload>, StoreError> {
        Ok(self
            .find_all()?
            .into_iter()
            .filter(|u| key_fingerprint(&u.key) == Some(fingerprint))
            .collect())
    }

    /// Stores `record` and returns the key to remove it with.
    fn add(&self, fingerprint: &str, record: ResumptionRecord) -> Result<String, StoreError>;

    /// Removes the record at `key`. Unknown keys are ignored.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

impl<T: ResumptionStore + ?Sized> ResumptionStore for Arc<T> {
    fn find_all(&self) -> Result<Vec<StoredUpload>, StoreError> {
        (**self).find_all()
    }

    fn find(&self, fingerprint: &str) -> Result<Vec<StoredUpload>, StoreError> {
        (**self).find(fingerprint)
    }

    fn add(&self, fingerprint: &str, record: ResumptionRecord) -> Result<String, StoreError> {
        (**self).add(fingerprint, record)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

/// Builds a fresh key: `tus::<fingerprint>::<random>`.
pub fn new_key(fingerprint: &str) -> String {
    format!("{KEY_PREFIX}{fingerprint}::{}", uuid::Uuid::new_v4().simple())
}

/// Extracts the fingerprint part of a key produced by [`new_key`].
pub fn key_fingerprint(key: &str) -> Option<&str> {
    key.strip_prefix(KEY_PREFIX)?
        .rsplit_once("::")
        .map(|(fp, _)| fp)
}
