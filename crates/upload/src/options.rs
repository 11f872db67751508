//! Session options and their validation.

use std::collections::BTreeMap;
use std::time::Duration;

use resumable_protocol::{Dialect, partial_concat_header, validate_metadata_key};
use resumable_transfer::DEFAULT_CHUNK_SIZE;

use crate::UploadError;

/// Delays between retries: immediately, then after 1 s, 3 s and 5 s.
pub const DEFAULT_RETRY_DELAYS: [Duration; 4] = [
    Duration::ZERO,
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
];

/// Cool-down applied after a 429 without a usable `Retry-After`.
pub const DEFAULT_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(2);

/// Explicit `[start, end)` byte range of one part of a split upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartBoundary {
    pub start: u64,
    pub end: u64,
}

/// Options of an upload session.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Creation endpoint.
    pub endpoint: Option<String>,
    /// Existing upload to resume instead of creating one.
    pub upload_url: Option<String>,
    pub dialect: Dialect,
    /// Maximum body size of a single chunk request.
    pub chunk_size: u64,
    /// Delay before each retry; its length is the retry budget.
    pub retry_delays: Vec<Duration>,
    pub metadata: BTreeMap<String, String>,
    /// Metadata sent with each part of a split upload.
    pub metadata_for_partial_uploads: BTreeMap<String, String>,
    /// Extra headers sent with every request.
    pub headers: Vec<(String, String)>,
    /// Overrides the size reported by the source.
    pub upload_size: Option<u64>,
    /// Create the upload before its length is known.
    pub upload_length_deferred: bool,
    /// Send the first chunk with the creation request.
    pub upload_data_during_creation: bool,
    /// Send chunks as `POST` with `X-HTTP-Method-Override: PATCH`.
    pub override_patch_method: bool,
    /// Tag every request with a fresh `X-Request-ID`.
    pub add_request_id: bool,
    /// Number of parts for a split upload; 1 disables splitting.
    pub parallel_uploads: usize,
    pub parallel_upload_boundaries: Option<Vec<PartBoundary>>,
    pub store_fingerprint_for_resuming: bool,
    pub remove_fingerprint_on_success: bool,
    /// Fixed fingerprint instead of one derived from the source.
    pub fingerprint: Option<String>,
    pub request_timeout: Option<Duration>,
    pub rate_limit_cooldown: Duration,
    /// Scheduler priority of this session's requests.
    pub priority: i32,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            endpoint: None,
            upload_url: None,
            dialect: Dialect::default(),
            chunk_size: DEFAULT_CHUNK_SIZE as u64,
            retry_delays: DEFAULT_RETRY_DELAYS.to_vec(),
            metadata: BTreeMap::new(),
            metadata_for_partial_uploads: BTreeMap::new(),
            headers: Vec::new(),
            upload_size: None,
            upload_length_deferred: false,
            upload_data_during_creation: false,
            override_patch_method: false,
            add_request_id: false,
            parallel_uploads: 1,
            parallel_upload_boundaries: None,
            store_fingerprint_for_resuming: true,
            remove_fingerprint_on_success: false,
            fingerprint: None,
            request_timeout: None,
            rate_limit_cooldown: DEFAULT_RATE_LIMIT_COOLDOWN,
            priority: 0,
        }
    }
}

impl UploadOptions {
    /// Options for creating uploads at `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..Self::default()
        }
    }

    pub fn is_split(&self) -> bool {
        self.parallel_uploads > 1
    }

    /// Checks option combinations before any request is made.
    ///
    /// `source_size` is what the source reports; `has_url` is whether the
    /// session already knows an upload URL (from a previous record).
    pub fn validate(&self, source_size: Option<u64>, has_url: bool) -> Result<(), UploadError> {
        if self.endpoint.is_none() && self.upload_url.is_none() && !has_url {
            return Err(UploadError::config(
                "neither an endpoint nor an upload URL is provided",
            ));
        }
        if self.chunk_size == 0 {
            return Err(UploadError::config("chunk_size must be greater than zero"));
        }
        if self.parallel_uploads == 0 {
            return Err(UploadError::config("parallel_uploads must be at least 1"));
        }

        if self.is_split() {
            if self.upload_url.is_some() {
                return Err(UploadError::config(
                    "cannot use upload_url together with parallel_uploads",
                ));
            }
            if self.upload_size.is_some() {
                return Err(UploadError::config(
                    "cannot use upload_size together with parallel_uploads",
                ));
            }
            if self.upload_length_deferred {
                return Err(UploadError::config(
                    "cannot use upload_length_deferred together with parallel_uploads",
                ));
            }
            if !self.dialect.supports_concatenation() {
                return Err(UploadError::config(format!(
                    "parallel uploads need the concatenation extension, which {} does not define",
                    self.dialect
                )));
            }
            if self.endpoint.is_none() {
                return Err(UploadError::config("parallel uploads require an endpoint"));
            }
        }

        if let Some(bounds) = &self.parallel_upload_boundaries {
            if !self.is_split() {
                return Err(UploadError::config(
                    "cannot use parallel_upload_boundaries when parallel_uploads is disabled",
                ));
            }
            if bounds.len() != self.parallel_uploads {
                return Err(UploadError::config(
                    "parallel_upload_boundaries must have the same length as parallel_uploads",
                ));
            }
            if let Some(b) = bounds.iter().find(|b| b.start > b.end) {
                return Err(UploadError::config(format!(
                    "invalid part boundary {}..{}",
                    b.start, b.end
                )));
            }
        }

        for key in self
            .metadata
            .keys()
            .chain(self.metadata_for_partial_uploads.keys())
        {
            validate_metadata_key(key)?;
        }

        if self.upload_length_deferred && self.upload_data_during_creation {
            return Err(UploadError::config(
                "upload_data_during_creation requires a known upload size",
            ));
        }
        if !self.upload_length_deferred && self.upload_size.or(source_size).is_none() {
            return Err(UploadError::config(
                "cannot derive the upload size from the source; set upload_size or use upload_length_deferred",
            ));
        }
        Ok(())
    }

    /// Total size to declare; `None` while the length is deferred.
    pub fn resolve_size(&self, source_size: Option<u64>) -> Option<u64> {
        if self.upload_length_deferred {
            None
        } else {
            self.upload_size.or(source_size)
        }
    }

    /// Options of one part of a split upload.
    pub(crate) fn for_part(&self, upload_url: Option<String>) -> Self {
        let mut headers = self.headers.clone();
        let (name, value) = partial_concat_header();
        headers.push((name.to_string(), value));
        Self {
            upload_url,
            metadata: self.metadata_for_partial_uploads.clone(),
            metadata_for_partial_uploads: BTreeMap::new(),
            headers,
            upload_size: None,
            parallel_uploads: 1,
            parallel_upload_boundaries: None,
            store_fingerprint_for_resuming: false,
            remove_fingerprint_on_success: false,
            fingerprint: None,
            ..self.clone()
        }
    }
}
