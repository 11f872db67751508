//! Retry decisions.

use std::time::Duration;

use crate::UploadError;
use crate::sink::EventSink;

/// Decides whether a failed request should be retried.
///
/// Retries need budget left (`attempt < delays.len()`), a request the error
/// originated from, and connectivity. Network failures, 5xx, 409 and 423 are
/// retried by default; anything else only when `should_retry` says so.
pub(crate) fn should_retry(
    error: &UploadError,
    attempt: usize,
    delays: &[Duration],
    sink: &dyn EventSink,
) -> bool {
    if attempt >= delays.len() || error.context().is_none() {
        return false;
    }
    (error.is_transient() || sink.should_retry(error, attempt)) && sink.is_online()
}

/// Retry bookkeeping of one session.
#[derive(Debug, Default)]
pub(crate) struct RetryState {
    attempt: usize,
    offset_before_retry: u64,
}

impl RetryState {
    /// Plans the next retry after `error` with the session at `offset`.
    ///
    /// The attempt counter starts over when the upload advanced since the
    /// previous failure. Returns the 1-based attempt number and its delay.
    pub(crate) fn plan(
        &mut self,
        error: &UploadError,
        offset: u64,
        delays: &[Duration],
        sink: &dyn EventSink,
    ) -> Option<(usize, Duration)> {
        if offset > self.offset_before_retry {
            self.attempt = 0;
        }
        if !should_retry(error, self.attempt, delays, sink) {
            return None;
        }
        let delay = delays[self.attempt];
        self.attempt += 1;
        self.offset_before_retry = offset;
        Some((self.attempt, delay))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use resumable_http::{HttpRequest, HttpResponse, Method, TransportError};

    use super::*;
    use crate::sink::SilentSink;

    fn delays(n: usize) -> Vec<Duration> {
        vec![Duration::from_millis(10); n]
    }

    fn failed(status: u16) -> UploadError {
        let req = HttpRequest::new(Method::Patch, "http://x/1");
        UploadError::from_response("unexpected response", &req, &HttpResponse::new(status))
    }

    fn offline() -> UploadError {
        let req = HttpRequest::new(Method::Patch, "http://x/1");
        UploadError::from_transport(&req, TransportError::Network("down".into()))
    }

    #[test]
    fn default_policy() {
        let d = delays(3);
        assert!(should_retry(&failed(500), 0, &d, &SilentSink));
        assert!(should_retry(&failed(409), 0, &d, &SilentSink));
        assert!(should_retry(&failed(423), 0, &d, &SilentSink));
        assert!(should_retry(&offline(), 2, &d, &SilentSink));
        assert!(!should_retry(&failed(404), 0, &d, &SilentSink));
        assert!(!should_retry(&failed(500), 3, &d, &SilentSink));
        assert!(!should_retry(&UploadError::config("x"), 0, &d, &SilentSink));
        assert!(!should_retry(&UploadError::Integrity("x".into()), 0, &d, &SilentSink));
    }

    struct Override {
        online: AtomicBool,
    }

    impl EventSink for Override {
        fn should_retry(&self, error: &UploadError, _attempt: usize) -> bool {
            error.status() == Some(403)
        }

        fn is_online(&self) -> bool {
            self.online.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn override_and_connectivity() {
        let sink = Override {
            online: AtomicBool::new(true),
        };
        let d = delays(1);
        assert!(should_retry(&failed(403), 0, &d, &sink));
        assert!(!should_retry(&failed(404), 0, &d, &sink));
        // Budget still applies to overridden failures.
        assert!(!should_retry(&failed(403), 1, &d, &sink));

        sink.online.store(false, Ordering::SeqCst);
        assert!(!should_retry(&failed(500), 0, &d, &sink));
    }

    #[test]
    fn budget_allows_n_retries() {
        let d = delays(3);
        let mut state = RetryState::default();
        let err = failed(500);
        let planned: Vec<_> = std::iter::from_fn(|| state.plan(&err, 0, &d, &SilentSink))
            .map(|(attempt, _)| attempt)
            .collect();
        assert_eq!(planned, [1, 2, 3]);
    }

    #[test]
    fn progress_resets_the_counter() {
        let d = vec![
            Duration::from_millis(1),
            Duration::from_millis(2),
            Duration::from_millis(3),
        ];
        let mut state = RetryState::default();
        let err = failed(503);

        assert_eq!(state.plan(&err, 0, &d, &SilentSink), Some((1, d[0])));
        assert_eq!(state.plan(&err, 0, &d, &SilentSink), Some((2, d[1])));
        // The upload moved forward between failures.
        assert_eq!(state.plan(&err, 4, &d, &SilentSink), Some((1, d[0])));
        assert_eq!(state.plan(&err, 4, &d, &SilentSink), Some((2, d[1])));
        assert_eq!(state.plan(&err, 4, &d, &SilentSink), Some((3, d[2])));
        assert_eq!(state.plan(&err, 4, &d, &SilentSink), None);
    }
}
