//! Upload termination.

use std::sync::Arc;
use std::time::Duration;

use resumable_http::{HttpTransport, Method};
use resumable_protocol::constants::STATUS_NO_CONTENT;
use resumable_scheduler::RateLimitedScheduler;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::request::Requester;
use crate::retry::should_retry;
use crate::sink::{EventSink, SilentSink};
use crate::{UploadError, UploadOptions};

/// Deletes the upload at `url`.
///
/// The server must answer `204 No Content`. Failures are retried like
/// any other request, using `options.retry_delays`.
pub async fn terminate(
    url: &str,
    options: &UploadOptions,
    transport: Arc<dyn HttpTransport>,
) -> Result<(), UploadError> {
    let requester = Requester::new(options, transport, RateLimitedScheduler::unbounded());
    delete_with_retry(
        &requester,
        url,
        &options.retry_delays,
        &SilentSink,
        &CancellationToken::new(),
    )
    .await
}

pub(crate) async fn delete_with_retry(
    requester: &Requester,
    url: &str,
    delays: &[Duration],
    sink: &dyn EventSink,
    cancel: &CancellationToken,
) -> Result<(), UploadError> {
    let mut attempt = 0;
    loop {
        let err = match delete_once(requester, url, sink, cancel).await {
            Ok(()) => {
                info!(url, "upload terminated");
                return Ok(());
            }
            Err(err) => err,
        };
        if !should_retry(&err, attempt, delays, sink) {
            return Err(err);
        }
        let delay = delays[attempt];
        attempt += 1;
        warn!(url, attempt, error = %err, "termination failed, retrying");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UploadError::Aborted),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn delete_once(
    requester: &Requester,
    url: &str,
    sink: &dyn EventSink,
    cancel: &CancellationToken,
) -> Result<(), UploadError> {
    let request = requester.open(Method::Delete, url);
    let ex = requester.send(request, None, sink, cancel).await?;
    if ex.response.status != STATUS_NO_CONTENT {
        return Err(UploadError::from_response(
            "unexpected response while terminating upload",
            &ex.request,
            &ex.response,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockServer, Reply};

    #[tokio::test]
    async fn deletes_upload() {
        let server = MockServer::new();
        server.seed("/files/a", b"abc", Some(3));
        let options = UploadOptions::new(server.endpoint());

        terminate("http://mock/files/a", &options, server.clone())
            .await
            .unwrap();

        let deletes = server.requests_of(Method::Delete);
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].headers.get("Tus-Resumable"), Some("1.0.0"));
        assert!(server.upload("/files/a").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_configured_delays() {
        let server = MockServer::new();
        server.seed("/files/a", b"", Some(3));
        server.on(Method::Delete, Reply::Status(500));
        server.on(Method::Delete, Reply::Status(423));
        let mut options = UploadOptions::new(server.endpoint());
        options.retry_delays = vec![Duration::from_millis(100), Duration::from_millis(200)];

        let started = tokio::time::Instant::now();
        terminate("http://mock/files/a", &options, server.clone())
            .await
            .unwrap();

        assert_eq!(server.requests_of(Method::Delete).len(), 3);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_when_budget_is_spent() {
        let server = MockServer::new();
        server.always(Method::Delete, Reply::Status(500));
        let mut options = UploadOptions::new(server.endpoint());
        options.retry_delays = vec![Duration::from_millis(10)];

        let err = terminate("http://mock/files/a", &options, server.clone())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(server.requests_of(Method::Delete).len(), 2);
    }

    #[tokio::test]
    async fn unexpected_success_status_is_an_error() {
        let server = MockServer::new();
        server.on(Method::Delete, Reply::Status(200));
        let options = UploadOptions::new(server.endpoint());

        let err = terminate("http://mock/files/a", &options, server.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Protocol { .. }));
        assert!(err.to_string().contains("terminating upload"));
        assert_eq!(server.requests_of(Method::Delete).len(), 1);
    }
}
