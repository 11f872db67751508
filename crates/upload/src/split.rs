//! Split uploads.
//!
//! The source is cut into contiguous parts, each uploaded as a partial
//! upload by its own engine. Once all parts are done a final request asks
//! the server to concatenate them in order.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::{BoxFuture, try_join_all};
use resumable_http::{HttpRequest, HttpResponse, Method};
use resumable_protocol::constants::UPLOAD_METADATA;
use resumable_protocol::{encode_metadata, final_concat_header};
use resumable_store::{NoopStore, ResumptionRecord, ResumptionStore};
use resumable_transfer::read_range;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::{Engine, store_record};
use crate::request::{Requester, apply};
use crate::sink::EventSink;
use crate::{PartBoundary, UploadError, UploadOutcome, UploadState};

/// Cuts `total` bytes into `parts` contiguous ranges. The last range absorbs
/// the remainder of the division.
pub fn split_size_into_parts(total: u64, parts: usize) -> Vec<PartBoundary> {
    let count = parts.max(1) as u64;
    let part = total / count;
    (0..count)
        .map(|i| PartBoundary {
            start: part * i,
            end: if i == count - 1 { total } else { part * (i + 1) },
        })
        .collect()
}

struct Progress {
    urls: Vec<Option<String>>,
    uploaded: Vec<u64>,
    key: Option<String>,
}

/// State shared by the parts of one split upload.
struct SplitShared {
    progress: Mutex<Progress>,
    total: u64,
    parent: Arc<dyn EventSink>,
    store: Arc<dyn ResumptionStore>,
    /// `None` when the parent does not store records.
    fingerprint: Option<String>,
    metadata: BTreeMap<String, String>,
}

impl SplitShared {
    fn lock(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records the latest count of part `index` and returns the sum.
    fn update(&self, index: usize, uploaded: u64) -> u64 {
        let mut p = self.lock();
        p.uploaded[index] = uploaded;
        p.uploaded.iter().sum()
    }
}

/// Reports a part's events to the parent session.
struct PartSink {
    index: usize,
    shared: Arc<SplitShared>,
}

impl EventSink for PartSink {
    fn progress(&self, uploaded: u64, _total: Option<u64>) {
        let sum = self.shared.update(self.index, uploaded);
        self.shared.parent.progress(sum, Some(self.shared.total));
    }

    fn chunk_complete(&self, chunk: u64, acknowledged: u64, _total: Option<u64>) {
        let sum = self.shared.update(self.index, acknowledged);
        self.shared
            .parent
            .chunk_complete(chunk, sum, Some(self.shared.total));
    }

    fn url_available(&self, url: &str) {
        let shared = &self.shared;
        let mut p = shared.lock();
        p.urls[self.index] = Some(url.to_string());
        if p.key.is_some() {
            return;
        }
        let Some(fp) = shared.fingerprint.as_deref() else {
            return;
        };
        let Some(urls) = p.urls.iter().cloned().collect::<Option<Vec<_>>>() else {
            return;
        };
        let record = ResumptionRecord::split(urls, Some(shared.total))
            .with_metadata(shared.metadata.clone());
        p.key = store_record(&*shared.store, fp, record);
    }

    fn before_request(&self, request: &mut HttpRequest) {
        self.shared.parent.before_request(request);
    }

    fn after_response(&self, request: &HttpRequest, response: &HttpResponse) {
        self.shared.parent.after_response(request, response);
    }

    fn should_retry(&self, error: &UploadError, attempt: usize) -> bool {
        self.shared.parent.should_retry(error, attempt)
    }

    fn is_online(&self) -> bool {
        self.shared.parent.is_online()
    }
}

impl Engine {
    /// Uploads all parts concurrently, then concatenates them.
    ///
    /// Parts with a known URL resume from it. A failing part cancels the
    /// others; the URLs gathered so far are kept for the next attempt.
    pub(crate) async fn split(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, UploadError> {
        let Some(total) = self.size else {
            return Err(UploadError::config("split uploads need a known size"));
        };
        let Some(endpoint) = self.opts.endpoint.clone() else {
            return Err(UploadError::config("split uploads require an endpoint"));
        };
        let count = self.opts.parallel_uploads;
        let parts = match &self.opts.parallel_upload_boundaries {
            Some(bounds) => bounds.clone(),
            None => split_size_into_parts(total, count),
        };
        let urls = self
            .part_urls
            .clone()
            .filter(|urls| urls.len() == count)
            .unwrap_or_else(|| vec![None; count]);

        self.sink.state(UploadState::Uploading);
        info!(endpoint = %endpoint, parts = count, size = total, "starting split upload");

        let shared = Arc::new(SplitShared {
            progress: Mutex::new(Progress {
                urls: urls.clone(),
                uploaded: vec![0; count],
                key: self.key.clone(),
            }),
            total,
            parent: Arc::clone(&self.sink),
            store: Arc::clone(&self.store),
            fingerprint: self
                .fingerprint
                .clone()
                .filter(|_| self.opts.store_fingerprint_for_resuming),
            metadata: self.opts.metadata.clone(),
        });

        let mut children: Vec<BoxFuture<'static, Result<UploadOutcome, UploadError>>> =
            Vec::with_capacity(count);
        for (index, (part, url)) in parts.iter().zip(urls).enumerate() {
            let source = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UploadError::Aborted),
                source = read_range(&mut *self.source, part.start, part.end) => source?,
            };
            let opts = self.opts.for_part(url);
            let requester = Requester::new(
                &opts,
                Arc::clone(self.requester.transport()),
                self.requester.scheduler().clone(),
            );
            let sink = Arc::new(PartSink {
                index,
                shared: Arc::clone(&shared),
            });
            let child = Engine::new(source, opts, requester, Arc::new(NoopStore), sink);
            children.push(run_part(child, cancel.child_token()));
        }

        let result = try_join_all(children).await;
        {
            let p = shared.lock();
            self.part_urls = Some(p.urls.clone());
            self.key = p.key.clone();
        }
        let outcomes = result?;

        let part_urls: Vec<String> = outcomes.into_iter().map(|o| o.url).collect();
        let mut request = self.requester.open(Method::Post, &endpoint);
        apply(&mut request, vec![final_concat_header(&part_urls)]);
        if let Some(metadata) = encode_metadata(&self.opts.metadata) {
            request.headers.set(UPLOAD_METADATA, metadata);
        }
        let ex = self.requester.send(request, None, &*self.sink, cancel).await?;
        if !ex.response.is_success() {
            return Err(UploadError::from_response(
                "unexpected response while concatenating parts",
                &ex.request,
                &ex.response,
            ));
        }
        let url = self.location(&endpoint, &ex)?;
        info!(url = %url, parts = count, "split upload concatenated");
        self.url = Some(url.clone());
        self.offset = total;
        self.sink.url_available(&url);
        self.complete(Some(ex.response))
    }
}

/// Drives one part. Boxed so the part's future does not nest in its parent's.
fn run_part(
    mut child: Engine,
    cancel: CancellationToken,
) -> BoxFuture<'static, Result<UploadOutcome, UploadError>> {
    Box::pin(async move {
        child.prepare()?;
        let retry_now = Notify::new();
        child.run(&cancel, &retry_now).await
    })
}
