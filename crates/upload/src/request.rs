//! Sending requests through the shared scheduler.

use std::sync::Arc;
use std::time::Duration;

use resumable_http::{HttpRequest, HttpResponse, HttpTransport, Method, UploadProgressFn};
use resumable_protocol::constants::{RETRY_AFTER, STATUS_TOO_MANY_REQUESTS, X_REQUEST_ID};
use resumable_protocol::{Dialect, HeaderPair};
use resumable_scheduler::{RateLimitedScheduler, SchedulerError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::sink::EventSink;
use crate::{RequestContext, UploadError, UploadOptions};

/// Consecutive 429 responses re-queued before one is surfaced as a failure.
const MAX_RATE_LIMITED_REQUEUES: usize = 10;

/// A request together with the response it got.
#[derive(Debug, Clone)]
pub(crate) struct Exchange {
    pub request: HttpRequest,
    pub response: HttpResponse,
}

/// Builds session requests and runs them as scheduler tasks.
pub(crate) struct Requester {
    transport: Arc<dyn HttpTransport>,
    scheduler: RateLimitedScheduler,
    dialect: Dialect,
    headers: Vec<(String, String)>,
    add_request_id: bool,
    timeout: Option<Duration>,
    priority: i32,
    cooldown: Duration,
}

impl Requester {
    pub(crate) fn new(
        options: &UploadOptions,
        transport: Arc<dyn HttpTransport>,
        scheduler: RateLimitedScheduler,
    ) -> Self {
        Self {
            transport,
            scheduler,
            dialect: options.dialect,
            headers: options.headers.clone(),
            add_request_id: options.add_request_id,
            timeout: options.request_timeout,
            priority: options.priority,
            cooldown: options.rate_limit_cooldown,
        }
    }

    pub(crate) fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    pub(crate) fn scheduler(&self) -> &RateLimitedScheduler {
        &self.scheduler
    }

    /// A request carrying the dialect version and the configured headers.
    pub(crate) fn open(&self, method: Method, url: &str) -> HttpRequest {
        let (name, value) = self.dialect.version_header();
        let mut request = HttpRequest::new(method, url)
            .header(name, value)
            .with_timeout(self.timeout);
        request
            .headers
            .extend(self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if self.add_request_id {
            request
                .headers
                .set(X_REQUEST_ID, uuid::Uuid::new_v4().to_string());
        }
        request
    }

    /// Sends `request` once a scheduler slot is free.
    ///
    /// A 429 response slows the scheduler down and the request goes back to
    /// the queue without counting as a failure. Any other response, error
    /// status or not, is returned for the caller to interpret.
    pub(crate) async fn send(
        &self,
        mut request: HttpRequest,
        progress: Option<UploadProgressFn>,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<Exchange, UploadError> {
        sink.before_request(&mut request);

        let mut requeues = 0;
        loop {
            debug!(method = %request.method, url = %request.url, "sending request");
            let transport = Arc::clone(&self.transport);
            let outgoing = request.clone();
            let on_progress = progress.clone();
            let mut task = self.scheduler.run(self.priority, move || async move {
                transport.send(outgoing, on_progress).await
            });

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UploadError::Aborted),
                out = task.done() => out,
            };

            let response = match result {
                Ok(Ok(response)) => response,
                Ok(Err(err)) => return Err(UploadError::from_transport(&request, err)),
                Err(SchedulerError::Aborted) => return Err(UploadError::Aborted),
                Err(SchedulerError::Panicked(msg)) => {
                    return Err(UploadError::Protocol {
                        message: format!("transport panicked: {msg}"),
                        context: RequestContext::new(&request, None),
                    });
                }
            };
            sink.after_response(&request, &response);

            if response.status == STATUS_TOO_MANY_REQUESTS && requeues < MAX_RATE_LIMITED_REQUEUES {
                requeues += 1;
                let cooldown = retry_after(&response).unwrap_or(self.cooldown);
                warn!(
                    url = %request.url,
                    cooldown_ms = cooldown.as_millis() as u64,
                    requeues,
                    "rate limited by server, re-queueing request"
                );
                self.scheduler.rate_limit(cooldown);
                continue;
            }
            return Ok(Exchange { request, response });
        }
    }
}

/// Adds encoder output to a request.
pub(crate) fn apply(request: &mut HttpRequest, headers: Vec<HeaderPair>) {
    request.headers.extend(headers);
}

/// Cool-down requested by a `Retry-After` header given in seconds.
fn retry_after(response: &HttpResponse) -> Option<Duration> {
    response
        .header_value(RETRY_AFTER)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
