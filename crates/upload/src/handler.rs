use resumable_http::{HttpRequest, HttpResponse};

use crate::UploadError;

/// Result of a completed upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Final upload URL. For split uploads, the URL of the concatenated upload.
    pub url: String,
    /// Bytes the server acknowledged.
    pub size: u64,
    /// Last response received, if the completion involved a request.
    pub response: Option<HttpResponse>,
}

/// Callbacks of an upload session.
///
/// Only `on_error` is required. Callbacks run on the session's driver task
/// and should return quickly. None of them fire once `abort` has returned.
pub trait UploadHandler: Send + Sync {
    /// The session failed and will not retry on its own.
    fn on_error(&self, error: &UploadError);

    /// Bytes sent so far, including the in-flight chunk.
    fn on_progress(&self, _uploaded: u64, _total: Option<u64>) {}

    /// The server acknowledged a chunk of `chunk` bytes.
    fn on_chunk_complete(&self, _chunk: u64, _acknowledged: u64, _total: Option<u64>) {}

    fn on_success(&self, _outcome: &UploadOutcome) {}

    /// The upload URL became known, after creation or a successful probe.
    fn on_upload_url_available(&self, _url: &str) {}

    /// Last chance to modify a request before it is sent.
    fn on_before_request(&self, _request: &mut HttpRequest) {}

    fn on_after_response(&self, _request: &HttpRequest, _response: &HttpResponse) {}

    /// Allows retrying failures the default policy gives up on. The retry
    /// budget and the connectivity check still apply.
    fn should_retry(&self, _error: &UploadError, _attempt: usize) -> bool {
        false
    }

    /// Connectivity probe. Retries are only scheduled while online.
    fn is_online(&self) -> bool {
        true
    }
}
