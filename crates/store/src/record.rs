use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What is persisted about an upload in progress.
///
/// Exactly one of `upload_url` and `parallel_upload_urls` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumptionRecord {
    /// Total size; `None` while the length is deferred.
    pub size: Option<u64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub creation_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_upload_urls: Option<Vec<String>>,
}

impl ResumptionRecord {
    /// Record for a single upload at `url`.
    pub fn single(url: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            size,
            metadata: BTreeMap::new(),
            creation_time: Utc::now(),
            upload_url: Some(url.into()),
            parallel_upload_urls: None,
        }
    }

    /// Record for a split upload whose parts live at `urls`.
    pub fn split(urls: Vec<String>, size: Option<u64>) -> Self {
        Self {
            size,
            metadata: BTreeMap::new(),
            creation_time: Utc::now(),
            upload_url: None,
            parallel_upload_urls: Some(urls),
        }
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A record together with the key it is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredUpload {
    pub key: String,
    pub record: ResumptionRecord,
}
