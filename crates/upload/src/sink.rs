use resumable_http::{HttpRequest, HttpResponse};

use crate::{UploadError, UploadState};

/// Where an engine reports what it does.
///
/// A top-level session forwards to the caller's handler; the parts of a
/// split upload report to their parent instead.
pub(crate) trait EventSink: Send + Sync {
    fn progress(&self, _uploaded: u64, _total: Option<u64>) {}

    fn chunk_complete(&self, _chunk: u64, _acknowledged: u64, _total: Option<u64>) {}

    fn url_available(&self, _url: &str) {}

    fn before_request(&self, _request: &mut HttpRequest) {}

    fn after_response(&self, _request: &HttpRequest, _response: &HttpResponse) {}

    fn state(&self, _state: UploadState) {}

    fn should_retry(&self, _error: &UploadError, _attempt: usize) -> bool {
        false
    }

    fn is_online(&self) -> bool {
        true
    }
}

/// Sink that observes nothing.
pub(crate) struct SilentSink;

impl EventSink for SilentSink {}
