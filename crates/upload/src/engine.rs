//! The upload state machine.
//!
//! An [`Engine`] owns everything one upload needs and drives it through
//! creation or resumption, the chunk loop and completion. Sessions run one
//! engine on a driver task; split uploads run one engine per part.

use std::sync::Arc;

use bytes::Bytes;
use resumable_http::{HttpResponse, Method, UploadProgressFn};
use resumable_protocol::constants::{LOCATION, UPLOAD_LENGTH, UPLOAD_OFFSET, X_HTTP_METHOD_OVERRIDE};
use resumable_protocol::{StatusClass, encode_metadata, in_category, parse_length, resolve_location};
use resumable_store::{ResumptionRecord, ResumptionStore, StoreError, StoredUpload};
use resumable_transfer::{ChunkSource, fingerprint};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::request::{Exchange, Requester, apply};
use crate::retry::RetryState;
use crate::sink::{EventSink, SilentSink};
use crate::terminate::delete_with_retry;
use crate::{UploadError, UploadOptions, UploadOutcome, UploadState};

/// One chunk read from the source, ready to send.
struct Chunk {
    data: Bytes,
    /// Whether this chunk ends the upload.
    done: bool,
    /// Set on the chunk that fixes a deferred length.
    declared_length: Option<u64>,
}

pub(crate) struct Engine {
    pub(crate) opts: UploadOptions,
    pub(crate) source: Box<dyn ChunkSource>,
    pub(crate) requester: Requester,
    pub(crate) store: Arc<dyn ResumptionStore>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) url: Option<String>,
    /// Part URLs of a split upload, by part index.
    pub(crate) part_urls: Option<Vec<Option<String>>>,
    pub(crate) offset: u64,
    /// `None` until a deferred length is known.
    pub(crate) size: Option<u64>,
    pub(crate) fingerprint: Option<String>,
    pub(crate) key: Option<String>,
    /// Whether the server has been told a deferred length.
    length_declared: bool,
    retry: RetryState,
}

impl Engine {
    pub(crate) fn new(
        source: Box<dyn ChunkSource>,
        opts: UploadOptions,
        requester: Requester,
        store: Arc<dyn ResumptionStore>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            url: opts.upload_url.clone(),
            opts,
            source,
            requester,
            store,
            sink,
            part_urls: None,
            offset: 0,
            size: None,
            fingerprint: None,
            key: None,
            length_declared: false,
            retry: RetryState::default(),
        }
    }

    /// Validates the options and derives size and fingerprint.
    pub(crate) fn prepare(&mut self) -> Result<(), UploadError> {
        let source_size = self.source.size();
        let has_url = self.url.is_some() || self.part_urls.is_some();
        self.opts.validate(source_size, has_url)?;
        if self.size.is_none() {
            self.size = self.opts.resolve_size(source_size);
        }
        if self.fingerprint.is_none() {
            self.fingerprint = self.compute_fingerprint();
        }
        Ok(())
    }

    fn compute_fingerprint(&self) -> Option<String> {
        if let Some(fp) = &self.opts.fingerprint {
            return Some(fp.clone());
        }
        let destination = self
            .opts
            .endpoint
            .as_deref()
            .or(self.opts.upload_url.as_deref())?;
        fingerprint(&self.source.identity(), self.source.size(), destination)
    }

    /// Runs attempts until one succeeds, the retry policy gives up, or
    /// `cancel` fires. `retry_now` cuts a pending retry delay short.
    pub(crate) async fn run(
        &mut self,
        cancel: &CancellationToken,
        retry_now: &Notify,
    ) -> Result<UploadOutcome, UploadError> {
        loop {
            let err = match self.attempt(cancel).await {
                Ok(outcome) => return Ok(outcome),
                Err(UploadError::Aborted) => return Err(UploadError::Aborted),
                Err(err) => err,
            };
            if cancel.is_cancelled() {
                return Err(UploadError::Aborted);
            }

            let plan = self
                .retry
                .plan(&err, self.offset, &self.opts.retry_delays, &*self.sink);
            let Some((attempt, delay)) = plan else {
                return Err(err);
            };
            warn!(
                url = self.url.as_deref().unwrap_or("-"),
                offset = self.offset,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "upload attempt failed, retrying"
            );

            let notified = retry_now.notified();
            self.sink.state(UploadState::PendingRetry { attempt, delay });
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UploadError::Aborted),
                _ = notified => debug!(attempt, "retry triggered early"),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn attempt(&mut self, cancel: &CancellationToken) -> Result<UploadOutcome, UploadError> {
        if self.opts.is_split() {
            return self.split(cancel).await;
        }
        match self.url.clone() {
            Some(url) => self.resume(url, cancel).await,
            None => self.create(cancel).await,
        }
    }

    async fn create(&mut self, cancel: &CancellationToken) -> Result<UploadOutcome, UploadError> {
        let Some(endpoint) = self.opts.endpoint.clone() else {
            return Err(UploadError::config("cannot create an upload without an endpoint"));
        };
        self.sink.state(UploadState::Creating);
        self.offset = 0;

        let dialect = self.opts.dialect;
        let metadata = encode_metadata(&self.opts.metadata);
        let mut request = self.requester.open(Method::Post, &endpoint);
        apply(&mut request, dialect.creation_headers(self.size, metadata.as_deref()));

        let with_data = self.opts.upload_data_during_creation && self.size.is_some();
        let mut progress = None;
        if with_data {
            let chunk = self.next_chunk(cancel).await?;
            apply(&mut request, dialect.body_headers(chunk.done));
            request = request.with_body(chunk.data);
            progress = Some(self.progress_fn(0));
        } else {
            apply(&mut request, dialect.empty_creation_headers());
        }

        let ex = self.requester.send(request, progress, &*self.sink, cancel).await?;
        if !ex.response.is_success() {
            return Err(UploadError::from_response(
                "unexpected response while creating upload",
                &ex.request,
                &ex.response,
            ));
        }
        let url = self.location(&endpoint, &ex)?;
        info!(url = %url, size = ?self.size, "upload created");
        self.url = Some(url.clone());
        self.sink.url_available(&url);

        if self.size == Some(0) {
            return self.complete(Some(ex.response));
        }
        self.save_record();

        if with_data {
            self.adopt_offset(&ex)?;
        }
        self.upload(cancel, None).await
    }

    async fn resume(
        &mut self,
        url: String,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome, UploadError> {
        self.sink.state(UploadState::Resuming);
        let request = self.requester.open(Method::Head, &url);
        let ex = self.requester.send(request, None, &*self.sink, cancel).await?;
        let status = ex.response.status;

        if !ex.response.is_success() {
            if StatusClass::of(status) == StatusClass::Locked {
                return Err(UploadError::from_response(
                    "upload is currently locked; retry later",
                    &ex.request,
                    &ex.response,
                ));
            }
            if in_category(status, 400) {
                self.remove_record();
                self.url = None;
                if self.opts.endpoint.is_none() {
                    return Err(UploadError::protocol(
                        "unable to resume upload (new upload cannot be created without an endpoint)",
                        &ex.request,
                        &ex.response,
                    ));
                }
                info!(url = %url, status, "stored upload is gone, creating a new one");
                return self.create(cancel).await;
            }
            return Err(UploadError::from_response(
                "unexpected response while resuming upload",
                &ex.request,
                &ex.response,
            ));
        }

        let Some(offset) = parse_length(ex.response.header_value(UPLOAD_OFFSET)) else {
            return Err(UploadError::protocol(
                "invalid or missing offset value",
                &ex.request,
                &ex.response,
            ));
        };
        let length = parse_length(ex.response.header_value(UPLOAD_LENGTH));
        if length.is_none()
            && !self.opts.upload_length_deferred
            && self.opts.dialect.probe_requires_length()
        {
            return Err(UploadError::protocol(
                "invalid or missing length value",
                &ex.request,
                &ex.response,
            ));
        }
        if let (Some(reported), Some(size)) = (length, self.size)
            && reported != size
        {
            return Err(UploadError::protocol(
                format!("server reports a length of {reported} bytes for a {size} byte upload"),
                &ex.request,
                &ex.response,
            ));
        }
        if let Some(total) = length.or(self.size)
            && offset > total
        {
            return Err(UploadError::protocol(
                format!("server reports an offset of {offset} bytes for a {total} byte upload"),
                &ex.request,
                &ex.response,
            ));
        }
        if self.opts.upload_length_deferred && length.is_some() {
            self.length_declared = true;
            self.size = self.size.or(length);
        }

        self.sink.url_available(&url);
        self.save_record();
        info!(url = %url, offset, length = ?length, "resuming upload");

        self.offset = offset;
        if length == Some(offset) {
            self.sink.progress(offset, length);
            return self.complete(Some(ex.response));
        }
        self.upload(cancel, Some(ex.response)).await
    }

    /// Sends chunks from the current offset until the upload is complete.
    async fn upload(
        &mut self,
        cancel: &CancellationToken,
        mut last: Option<HttpResponse>,
    ) -> Result<UploadOutcome, UploadError> {
        self.sink.state(UploadState::Uploading);
        loop {
            // A deferred length still has to reach the server, even on an
            // empty final request.
            let undeclared = self.opts.upload_length_deferred && !self.length_declared;
            if let Some(size) = self.size
                && self.offset >= size
                && !undeclared
            {
                return self.complete(last);
            }
            let Some(url) = self.url.clone() else {
                return Err(UploadError::config("no upload URL to send data to"));
            };

            let chunk = self.next_chunk(cancel).await?;
            let overridden = self.opts.override_patch_method;
            let method = if overridden { Method::Post } else { Method::Patch };
            let mut request = self.requester.open(method, &url);
            if overridden {
                request.headers.set(X_HTTP_METHOD_OVERRIDE, "PATCH");
            }
            apply(
                &mut request,
                self.opts
                    .dialect
                    .chunk_headers(self.offset, chunk.done, chunk.declared_length),
            );
            let request = request.with_body(chunk.data);
            let progress = self.progress_fn(self.offset);

            let ex = self
                .requester
                .send(request, Some(progress), &*self.sink, cancel)
                .await?;
            if !ex.response.is_success() {
                return Err(UploadError::from_response(
                    "unexpected response while uploading chunk",
                    &ex.request,
                    &ex.response,
                ));
            }
            if chunk.declared_length.is_some() {
                self.length_declared = true;
            }
            self.adopt_offset(&ex)?;
            last = Some(ex.response);
        }
    }

    /// Reads `[offset, offset + chunk_size)`, clamped to the size when known.
    async fn next_chunk(&mut self, cancel: &CancellationToken) -> Result<Chunk, UploadError> {
        let start = self.offset;
        let mut end = start.saturating_add(self.opts.chunk_size);
        if let Some(size) = self.size {
            end = end.min(size);
        }
        let slice = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UploadError::Aborted),
            slice = self.source.slice(start, end) => slice?,
        };
        let consumed = start + slice.len();

        let mut declared_length = None;
        if slice.done && self.opts.upload_length_deferred && !self.length_declared {
            if self.size.is_none() {
                debug!(size = consumed, "source finished, declaring upload length");
                self.size = Some(consumed);
            }
            declared_length = self.size;
        }
        if let Some(size) = self.size
            && slice.done
            && consumed != size
        {
            return Err(UploadError::Integrity(format!(
                "upload was configured with a size of {size} bytes, but the source is done after {consumed} bytes"
            )));
        }

        let done = slice.done || self.size.is_some_and(|size| consumed >= size);
        Ok(Chunk {
            data: slice.data.unwrap_or_default(),
            done,
            declared_length,
        })
    }

    /// Takes over the offset the server acknowledged.
    fn adopt_offset(&mut self, ex: &Exchange) -> Result<(), UploadError> {
        let Some(offset) = parse_length(ex.response.header_value(UPLOAD_OFFSET)) else {
            return Err(UploadError::protocol(
                "invalid or missing offset value",
                &ex.request,
                &ex.response,
            ));
        };
        if offset < self.offset {
            return Err(UploadError::protocol(
                format!("server moved the offset back from {} to {offset}", self.offset),
                &ex.request,
                &ex.response,
            ));
        }
        if let Some(size) = self.size
            && offset > size
        {
            return Err(UploadError::protocol(
                format!("server acknowledged {offset} bytes of a {size} byte upload"),
                &ex.request,
                &ex.response,
            ));
        }

        let chunk = offset - self.offset;
        self.offset = offset;
        debug!(offset, chunk, "chunk acknowledged");
        self.sink.progress(offset, self.size);
        self.sink.chunk_complete(chunk, offset, self.size);
        Ok(())
    }

    /// Resolves the `Location` of a creation response.
    pub(crate) fn location(&self, endpoint: &str, ex: &Exchange) -> Result<String, UploadError> {
        let Some(location) = ex.response.header_value(LOCATION) else {
            return Err(UploadError::protocol(
                "invalid or missing Location header",
                &ex.request,
                &ex.response,
            ));
        };
        resolve_location(endpoint, location)
            .map_err(|e| UploadError::protocol(e.to_string(), &ex.request, &ex.response))
    }

    fn progress_fn(&self, base: u64) -> UploadProgressFn {
        let sink = Arc::clone(&self.sink);
        let total = self.size;
        Arc::new(move |sent: u64| sink.progress(base + sent, total))
    }

    pub(crate) fn complete(
        &mut self,
        response: Option<HttpResponse>,
    ) -> Result<UploadOutcome, UploadError> {
        let Some(url) = self.url.clone() else {
            return Err(UploadError::config("upload completed without a URL"));
        };
        if self.opts.remove_fingerprint_on_success {
            self.remove_record();
        }
        self.source.close();
        info!(url = %url, size = self.offset, "upload completed");
        Ok(UploadOutcome {
            url,
            size: self.offset,
            response,
        })
    }

    /// Persists the current URL, once per session.
    fn save_record(&mut self) {
        if !self.opts.store_fingerprint_for_resuming || self.key.is_some() {
            return;
        }
        let (Some(fp), Some(url)) = (self.fingerprint.as_deref(), self.url.as_deref()) else {
            return;
        };
        let record = ResumptionRecord::single(url, self.size).with_metadata(self.opts.metadata.clone());
        self.key = store_record(&*self.store, fp, record);
    }

    fn remove_record(&mut self) {
        if let Some(key) = self.key.take()
            && let Err(e) = self.store.remove(&key)
        {
            warn!(key = %key, error = %e, "failed to remove resumption record");
        }
    }

    pub(crate) fn find_previous(&self) -> Result<Vec<StoredUpload>, StoreError> {
        match self.compute_fingerprint() {
            Some(fp) => self.store.find(&fp),
            None => Ok(Vec::new()),
        }
    }

    pub(crate) fn adopt_previous(&mut self, previous: &StoredUpload) {
        self.url = previous.record.upload_url.clone();
        self.part_urls = previous
            .record
            .parallel_upload_urls
            .clone()
            .map(|urls| urls.into_iter().map(Some).collect());
        self.key = Some(previous.key.clone());
        self.offset = 0;
    }

    /// Deletes every upload this engine created and forgets it.
    pub(crate) async fn terminate_remote(&mut self) -> Result<(), UploadError> {
        let cancel = CancellationToken::new();
        let mut targets: Vec<String> = self.part_urls.iter().flatten().flatten().cloned().collect();
        targets.extend(self.url.clone());
        for url in &targets {
            delete_with_retry(&self.requester, url, &self.opts.retry_delays, &SilentSink, &cancel)
                .await?;
        }
        self.remove_record();
        self.url = None;
        self.part_urls = None;
        self.offset = 0;
        Ok(())
    }
}

/// Adds `record`, logging instead of failing when the store is unusable.
pub(crate) fn store_record(
    store: &dyn ResumptionStore,
    fingerprint: &str,
    record: ResumptionRecord,
) -> Option<String> {
    match store.add(fingerprint, record) {
        Ok(key) => {
            debug!(key = %key, "stored resumption record");
            Some(key)
        }
        Err(e) => {
            warn!(fingerprint, error = %e, "failed to store resumption record");
            None
        }
    }
}
