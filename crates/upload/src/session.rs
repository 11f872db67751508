//! Caller-facing upload sessions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use resumable_http::{HttpRequest, HttpResponse, HttpTransport};
use resumable_scheduler::RateLimitedScheduler;
use resumable_store::{NoopStore, ResumptionStore, StoreError, StoredUpload};
use resumable_transfer::ChunkSource;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::engine::Engine;
use crate::request::Requester;
use crate::sink::EventSink;
use crate::{UploadError, UploadHandler, UploadOptions, UploadState};

/// State shared between a session and its driver task.
struct SessionShared {
    handler: Arc<dyn UploadHandler>,
    /// Set by `abort`; silences every callback.
    aborted: AtomicBool,
    state: watch::Sender<UploadState>,
}

impl SessionShared {
    fn live(&self) -> bool {
        !self.aborted.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: UploadState) {
        self.state.send_replace(state);
    }
}

impl EventSink for SessionShared {
    fn progress(&self, uploaded: u64, total: Option<u64>) {
        if self.live() {
            self.handler.on_progress(uploaded, total);
        }
    }

    fn chunk_complete(&self, chunk: u64, acknowledged: u64, total: Option<u64>) {
        if self.live() {
            self.handler.on_chunk_complete(chunk, acknowledged, total);
        }
    }

    fn url_available(&self, url: &str) {
        if self.live() {
            self.handler.on_upload_url_available(url);
        }
    }

    fn before_request(&self, request: &mut HttpRequest) {
        if self.live() {
            self.handler.on_before_request(request);
        }
    }

    fn after_response(&self, request: &HttpRequest, response: &HttpResponse) {
        if self.live() {
            self.handler.on_after_response(request, response);
        }
    }

    fn state(&self, state: UploadState) {
        if self.live() {
            self.set_state(state);
        }
    }

    fn should_retry(&self, error: &UploadError, attempt: usize) -> bool {
        self.handler.should_retry(error, attempt)
    }

    fn is_online(&self) -> bool {
        self.handler.is_online()
    }
}

struct Driver {
    join: JoinHandle<()>,
    cancel: CancellationToken,
}

/// One resumable upload.
///
/// `start` spawns a driver task on the current Tokio runtime; `abort`
/// stops it. A session can be started again after an abort or a failure and
/// continues from the last acknowledged offset.
pub struct UploadSession {
    shared: Arc<SessionShared>,
    engine: Arc<tokio::sync::Mutex<Engine>>,
    driver: Mutex<Option<Driver>>,
    retry_now: Arc<Notify>,
}

/// Builds an [`UploadSession`] with a non-default store or scheduler.
pub struct SessionBuilder {
    source: Box<dyn ChunkSource>,
    options: UploadOptions,
    handler: Arc<dyn UploadHandler>,
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn ResumptionStore>,
    scheduler: RateLimitedScheduler,
}

impl SessionBuilder {
    /// Store for resumption records. Defaults to [`NoopStore`].
    pub fn store(mut self, store: Arc<dyn ResumptionStore>) -> Self {
        self.store = store;
        self
    }

    /// Scheduler shared with other sessions. Defaults to an unbounded one.
    pub fn scheduler(mut self, scheduler: RateLimitedScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn build(self) -> UploadSession {
        let (state, _) = watch::channel(UploadState::Idle);
        let shared = Arc::new(SessionShared {
            handler: self.handler,
            aborted: AtomicBool::new(false),
            state,
        });
        let requester = Requester::new(&self.options, self.transport, self.scheduler);
        let sink: Arc<dyn EventSink> = shared.clone();
        let engine = Engine::new(self.source, self.options, requester, self.store, sink);
        UploadSession {
            shared,
            engine: Arc::new(tokio::sync::Mutex::new(engine)),
            driver: Mutex::new(None),
            retry_now: Arc::new(Notify::new()),
        }
    }
}

impl UploadSession {
    pub fn builder(
        source: impl ChunkSource + 'static,
        options: UploadOptions,
        handler: Arc<dyn UploadHandler>,
        transport: Arc<dyn HttpTransport>,
    ) -> SessionBuilder {
        SessionBuilder {
            source: Box::new(source),
            options,
            handler,
            transport,
            store: Arc::new(NoopStore),
            scheduler: RateLimitedScheduler::unbounded(),
        }
    }

    /// Session with no resumption store and its own unbounded scheduler.
    pub fn new(
        source: impl ChunkSource + 'static,
        options: UploadOptions,
        handler: Arc<dyn UploadHandler>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self::builder(source, options, handler, transport).build()
    }

    fn driver(&self) -> MutexGuard<'_, Option<Driver>> {
        self.driver.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts or continues the upload.
    ///
    /// While a retry is pending it fires the retry right away; while the
    /// upload is otherwise running it does nothing. Configuration problems
    /// are reported through `on_error`.
    pub fn start(&self) {
        let mut driver = self.driver();
        if let Some(running) = driver.as_ref()
            && !running.join.is_finished()
        {
            if matches!(self.state(), UploadState::PendingRetry { .. }) {
                debug!("retrying immediately");
                self.retry_now.notify_waiters();
            }
            return;
        }

        self.shared.aborted.store(false, Ordering::SeqCst);
        self.shared.set_state(UploadState::Idle);

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let shared = Arc::clone(&self.shared);
        let engine = Arc::clone(&self.engine);
        let retry_now = Arc::clone(&self.retry_now);
        let join = tokio::spawn(async move {
            let mut engine = engine.lock().await;
            let result = match engine.prepare() {
                Ok(()) => engine.run(&token, &retry_now).await,
                Err(err) => Err(err),
            };
            drop(engine);

            match result {
                Ok(outcome) => {
                    if shared.live() {
                        shared.handler.on_success(&outcome);
                        shared.set_state(UploadState::Completed);
                    }
                }
                Err(UploadError::Aborted) => {}
                Err(err) => {
                    if shared.live() {
                        error!(error = %err, "upload failed");
                        shared.handler.on_error(&err);
                        shared.set_state(UploadState::Failed);
                    }
                }
            }
        });
        *driver = Some(Driver { join, cancel });
    }

    /// Stops the upload. No callback fires once this returns.
    ///
    /// Without `terminate` the session pauses and `start` continues later.
    /// With `terminate` the upload is also deleted from the server and its
    /// resumption record removed.
    pub async fn abort(&self, terminate: bool) -> Result<(), UploadError> {
        self.shared.aborted.store(true, Ordering::SeqCst);
        let driver = self.driver().take();
        if let Some(Driver { join, cancel }) = driver {
            cancel.cancel();
            if let Err(err) = join.await
                && err.is_panic()
            {
                error!(error = %err, "upload driver panicked");
            }
        }
        if self.state() != UploadState::Completed {
            self.shared.set_state(UploadState::Paused);
        }
        if !terminate {
            info!("upload paused");
            return Ok(());
        }

        self.engine.lock().await.terminate_remote().await?;
        self.shared.set_state(UploadState::Terminated);
        Ok(())
    }

    /// Waits until the session settles and returns the state it settled in.
    pub async fn finished(&self) -> UploadState {
        let mut rx = self.shared.state.subscribe();
        match rx.wait_for(|s| s.is_settled()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    pub fn state(&self) -> UploadState {
        *self.shared.state.borrow()
    }

    /// Receiver for state changes.
    pub fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.shared.state.subscribe()
    }

    /// Current upload URL, once known. Waits while the upload is running.
    pub async fn url(&self) -> Option<String> {
        self.engine.lock().await.url.clone()
    }

    /// Records of earlier uploads of the same source to the same destination.
    pub async fn find_previous_uploads(&self) -> Result<Vec<StoredUpload>, StoreError> {
        self.engine.lock().await.find_previous()
    }

    /// Continues `previous` on the next `start` instead of creating a new upload.
    pub async fn resume_from_previous_upload(&self, previous: &StoredUpload) {
        self.engine.lock().await.adopt_previous(previous);
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        self.shared.aborted.store(true, Ordering::SeqCst);
        if let Some(driver) = self.driver().take() {
            driver.cancel.cancel();
        }
    }
}
