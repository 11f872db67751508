//! In-memory tus server and recording handler for tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use resumable_http::{
    BoxFuture, HttpRequest, HttpResponse, HttpTransport, Method, TransportError, UploadProgressFn,
};
use resumable_protocol::constants::*;
use resumable_protocol::parse_length;
use tokio::sync::Notify;

use crate::{UploadError, UploadHandler, UploadOutcome};

pub(crate) const BASE: &str = "http://mock";

/// Canned reaction to a request.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Status(u16),
    Response(HttpResponse),
    Fail(TransportError),
    /// Never answers.
    Hang,
    /// Handled normally; lets a queued rule target a later request.
    Pass,
}

struct Rule {
    method: Method,
    /// `None` for rules that never run out.
    times: Option<usize>,
    reply: Reply,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockUpload {
    pub data: Vec<u8>,
    pub length: Option<u64>,
    pub metadata: Option<String>,
    pub partial: bool,
}

#[derive(Default)]
struct ServerState {
    uploads: BTreeMap<String, MockUpload>,
    next_id: u64,
    requests: Vec<HttpRequest>,
    rules: Vec<Rule>,
}

/// A tus v1 server living in memory.
///
/// Supports creation (with data), HEAD, PATCH, termination and
/// concatenation. Rules queued with [`on`](Self::on) or
/// [`always`](Self::always) take precedence over the default behavior.
#[derive(Default)]
pub(crate) struct MockServer {
    state: Mutex<ServerState>,
    seen: Notify,
}

impl MockServer {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn endpoint(&self) -> String {
        format!("{BASE}/files/")
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answers the next unmatched `method` request with `reply`.
    pub(crate) fn on(&self, method: Method, reply: Reply) {
        self.lock().rules.push(Rule {
            method,
            times: Some(1),
            reply,
        });
    }

    /// Answers every `method` request with `reply`.
    pub(crate) fn always(&self, method: Method, reply: Reply) {
        self.lock().rules.push(Rule {
            method,
            times: None,
            reply,
        });
    }

    /// Pre-creates an upload at `path` holding `data`.
    pub(crate) fn seed(&self, path: &str, data: &[u8], length: Option<u64>) {
        self.lock().uploads.insert(
            path.to_string(),
            MockUpload {
                data: data.to_vec(),
                length,
                ..MockUpload::default()
            },
        );
    }

    pub(crate) fn upload(&self, path: &str) -> Option<MockUpload> {
        self.lock().uploads.get(path).cloned()
    }

    /// Uploads that are not parts of a split upload.
    pub(crate) fn complete_uploads(&self) -> Vec<MockUpload> {
        self.lock()
            .uploads
            .values()
            .filter(|u| !u.partial)
            .cloned()
            .collect()
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.lock().requests.clone()
    }

    pub(crate) fn requests_of(&self, method: Method) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method)
            .collect()
    }

    /// Waits until at least `n` requests have arrived.
    pub(crate) async fn wait_for_requests(&self, n: usize) {
        loop {
            let seen = self.seen.notified();
            if self.lock().requests.len() >= n {
                return;
            }
            seen.await;
        }
    }

    fn rule_for(st: &mut ServerState, method: Method) -> Option<Reply> {
        let rule = st
            .rules
            .iter_mut()
            .find(|r| r.method == method && r.times != Some(0))?;
        if let Some(times) = rule.times.as_mut() {
            *times -= 1;
        }
        Some(rule.reply.clone())
    }

    fn handle(&self, request: &HttpRequest) -> Reply {
        let mut st = self.lock();
        st.requests.push(request.clone());
        match Self::rule_for(&mut st, request.method) {
            None | Some(Reply::Pass) => {}
            Some(reply) => return reply,
        }

        let path = request.url.strip_prefix(BASE).unwrap_or(&request.url).to_string();
        let overridden = request.headers.get(X_HTTP_METHOD_OVERRIDE) == Some("PATCH");
        let response = match request.method {
            Method::Post if overridden => Self::patch(&mut st, &path, request),
            Method::Post => Self::create(&mut st, request),
            Method::Head => match st.uploads.get(&path) {
                Some(upload) => {
                    let mut resp = HttpResponse::new(200)
                        .header(UPLOAD_OFFSET, upload.data.len().to_string())
                        .header("Cache-Control", "no-store");
                    if let Some(len) = upload.length {
                        resp = resp.header(UPLOAD_LENGTH, len.to_string());
                    }
                    resp
                }
                None => HttpResponse::new(404),
            },
            Method::Patch => Self::patch(&mut st, &path, request),
            Method::Delete => match st.uploads.remove(&path) {
                Some(_) => HttpResponse::new(STATUS_NO_CONTENT),
                None => HttpResponse::new(404),
            },
            _ => HttpResponse::new(405),
        };
        Reply::Response(response)
    }

    fn create(st: &mut ServerState, request: &HttpRequest) -> HttpResponse {
        st.next_id += 1;
        let path = format!("/files/{}", st.next_id);
        let concat = request.headers.get(UPLOAD_CONCAT).unwrap_or_default();

        let mut upload = MockUpload {
            metadata: request.headers.get(UPLOAD_METADATA).map(str::to_string),
            ..MockUpload::default()
        };
        if let Some(list) = concat.strip_prefix("final;") {
            for url in list.split(' ') {
                let part = url.strip_prefix(BASE).unwrap_or(url);
                match st.uploads.get(part) {
                    Some(p) => upload.data.extend_from_slice(&p.data),
                    None => return HttpResponse::new(400).with_body("unknown partial upload"),
                }
            }
            upload.length = Some(upload.data.len() as u64);
        } else {
            upload.partial = concat == "partial";
            upload.length = parse_length(request.headers.get(UPLOAD_LENGTH));
            if let Some(body) = &request.body {
                upload.data.extend_from_slice(body);
            }
        }

        let offset = upload.data.len();
        st.uploads.insert(path.clone(), upload);
        HttpResponse::new(201)
            .header(LOCATION, path)
            .header(UPLOAD_OFFSET, offset.to_string())
    }

    fn patch(st: &mut ServerState, path: &str, request: &HttpRequest) -> HttpResponse {
        let Some(upload) = st.uploads.get_mut(path) else {
            return HttpResponse::new(404);
        };
        let offset = parse_length(request.headers.get(UPLOAD_OFFSET));
        if offset != Some(upload.data.len() as u64) {
            return HttpResponse::new(STATUS_CONFLICT).with_body("offset mismatch");
        }
        if let Some(len) = parse_length(request.headers.get(UPLOAD_LENGTH)) {
            upload.length = Some(len);
        }
        if let Some(body) = &request.body {
            upload.data.extend_from_slice(body);
        }
        HttpResponse::new(STATUS_NO_CONTENT).header(UPLOAD_OFFSET, upload.data.len().to_string())
    }
}

impl HttpTransport for MockServer {
    fn send(
        &self,
        request: HttpRequest,
        on_progress: Option<UploadProgressFn>,
    ) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        let reply = self.handle(&request);
        self.seen.notify_waiters();
        Box::pin(async move {
            match reply {
                Reply::Status(status) => Ok(HttpResponse::new(status)),
                Reply::Response(response) => {
                    if let Some(progress) = on_progress {
                        progress(request.body_len());
                    }
                    Ok(response)
                }
                Reply::Fail(err) => Err(err),
                Reply::Hang => std::future::pending().await,
                Reply::Pass => unreachable!("passed requests are handled by the server"),
            }
        })
    }
}

/// Everything a [`Recorder`] saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Progress(u64, Option<u64>),
    Chunk(u64, u64, Option<u64>),
    UrlAvailable(String),
    Success(String, u64),
    Error(String),
}

/// Handler that records every callback.
#[derive(Default)]
pub(crate) struct Recorder {
    events: Mutex<Vec<Event>>,
    /// Statuses the caller wants retried on top of the default policy.
    retry_statuses: Vec<u16>,
    offline: bool,
}

impl Recorder {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Recorder that asks for `statuses` to be retried.
    pub(crate) fn retrying(statuses: Vec<u16>) -> Arc<Self> {
        Arc::new(Self {
            retry_statuses: statuses,
            ..Self::default()
        })
    }

    /// Recorder whose connectivity probe always fails.
    pub(crate) fn offline() -> Arc<Self> {
        Arc::new(Self {
            offline: true,
            ..Self::default()
        })
    }

    fn push(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn successes(&self) -> Vec<(String, u64)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Success(url, size) => Some((url, size)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Error(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn chunks(&self) -> Vec<(u64, u64)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Chunk(chunk, acked, _) => Some((chunk, acked)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn progress(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Progress(uploaded, _) => Some(uploaded),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::UrlAvailable(url) => Some(url),
                _ => None,
            })
            .collect()
    }
}

impl UploadHandler for Recorder {
    fn on_error(&self, error: &UploadError) {
        self.push(Event::Error(error.to_string()));
    }

    fn on_progress(&self, uploaded: u64, total: Option<u64>) {
        self.push(Event::Progress(uploaded, total));
    }

    fn on_chunk_complete(&self, chunk: u64, acknowledged: u64, total: Option<u64>) {
        self.push(Event::Chunk(chunk, acknowledged, total));
    }

    fn on_success(&self, outcome: &UploadOutcome) {
        self.push(Event::Success(outcome.url.clone(), outcome.size));
    }

    fn on_upload_url_available(&self, url: &str) {
        self.push(Event::UrlAvailable(url.to_string()));
    }

    fn should_retry(&self, error: &UploadError, _attempt: usize) -> bool {
        error
            .status()
            .is_some_and(|s| self.retry_statuses.contains(&s))
    }

    fn is_online(&self) -> bool {
        !self.offline
    }
}
