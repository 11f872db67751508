//! Subcommand implementations.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use resumable_http::{HttpTransport, ReqwestTransport};
use resumable_scheduler::RateLimitedScheduler;
use resumable_store::{FileStore, ResumptionStore};
use resumable_transfer::{FileSource, SpeedCalculator};
use resumable_upload::{UploadError, UploadHandler, UploadOutcome, UploadSession, UploadState};
use tracing::{info, warn};

use crate::config::Config;

/// Minimum bytes between two progress log lines.
const PROGRESS_LOG_STEP: u64 = 8 * 1024 * 1024;

/// Logs upload progress and remembers the outcome.
struct ConsoleHandler {
    speed: SpeedCalculator,
    last_logged: AtomicU64,
    error: std::sync::Mutex<Option<String>>,
}

impl ConsoleHandler {
    fn new() -> Self {
        Self {
            speed: SpeedCalculator::new(None, None),
            last_logged: AtomicU64::new(0),
            error: std::sync::Mutex::new(None),
        }
    }

    fn take_error(&self) -> Option<String> {
        self.error.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

impl UploadHandler for ConsoleHandler {
    fn on_error(&self, error: &UploadError) {
        *self.error.lock().unwrap_or_else(|e| e.into_inner()) = Some(error.to_string());
    }

    fn on_progress(&self, uploaded: u64, _total: Option<u64>) {
        self.speed.record(uploaded);
    }

    fn on_chunk_complete(&self, _chunk: u64, acknowledged: u64, total: Option<u64>) {
        let last = self.last_logged.load(Ordering::Relaxed);
        let finished = total == Some(acknowledged);
        if acknowledged >= last + PROGRESS_LOG_STEP || finished {
            self.last_logged.store(acknowledged, Ordering::Relaxed);
            info!(
                acknowledged,
                total = ?total,
                kib_per_sec = (self.speed.bytes_per_second() / 1024.0) as u64,
                "upload progress"
            );
        }
    }

    fn on_upload_url_available(&self, url: &str) {
        info!(url, "upload url available");
    }

    fn on_success(&self, outcome: &UploadOutcome) {
        info!(url = %outcome.url, size = outcome.size, "upload complete");
    }
}

fn transport() -> anyhow::Result<Arc<dyn HttpTransport>> {
    Ok(Arc::new(ReqwestTransport::new()?))
}

fn open_store(config: &Config) -> anyhow::Result<Arc<FileStore>> {
    let path = config.resolved_store_path()?;
    let store = FileStore::new(path.clone())
        .with_context(|| format!("opening resumption store {}", path.display()))?;
    Ok(Arc::new(store))
}

fn scheduler(config: &Config) -> RateLimitedScheduler {
    match config.concurrency_limit {
        0 => RateLimitedScheduler::unbounded(),
        limit => RateLimitedScheduler::new(limit),
    }
}

/// Uploads `file`. With `resume`, the most recent stored upload of the
/// same file is continued and its absence is an error.
pub async fn upload(
    config: &Config,
    file: &Path,
    mut metadata: BTreeMap<String, String>,
    resume: bool,
) -> anyhow::Result<()> {
    let source = FileSource::open(file)
        .await
        .with_context(|| format!("opening {}", file.display()))?;
    if let Some(name) = file.file_name().and_then(|n| n.to_str()) {
        metadata
            .entry("filename".to_string())
            .or_insert_with(|| name.to_string());
    }

    let mut options = config.upload_options();
    options.metadata = metadata;

    let handler = Arc::new(ConsoleHandler::new());
    let session = UploadSession::builder(source, options, handler.clone(), transport()?)
        .store(open_store(config)?)
        .scheduler(scheduler(config))
        .build();

    if resume {
        let previous = session.find_previous_uploads().await?;
        let latest = previous
            .into_iter()
            .max_by_key(|p| p.record.creation_time)
            .with_context(|| format!("no interrupted upload found for {}", file.display()))?;
        info!(key = %latest.key, "resuming previous upload");
        session.resume_from_previous_upload(&latest).await;
    }

    session.start();
    let state = tokio::select! {
        state = session.finished() => state,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, pausing upload");
            session.abort(false).await?;
            session.state()
        }
    };

    match state {
        UploadState::Completed => {
            if let Some(url) = session.url().await {
                println!("{url}");
            }
            Ok(())
        }
        UploadState::Paused => {
            info!("upload paused, run `resumable resume` to continue");
            Ok(())
        }
        _ => {
            let message = handler
                .take_error()
                .unwrap_or_else(|| format!("upload ended in state {state:?}"));
            anyhow::bail!(message)
        }
    }
}

/// Deletes the upload at `url`, optionally dropping a stored record too.
pub async fn terminate(config: &Config, url: &str, forget: Option<&str>) -> anyhow::Result<()> {
    resumable_upload::terminate(url, &config.upload_options(), transport()?).await?;
    info!(url, "upload terminated");

    if let Some(key) = forget {
        open_store(config)?.remove(key)?;
        info!(key, "resumption record removed");
    }
    Ok(())
}

/// Prints every stored resumption record, oldest first.
pub fn list(config: &Config) -> anyhow::Result<()> {
    for upload in open_store(config)?.find_all()? {
        let record = &upload.record;
        let target = match (&record.upload_url, &record.parallel_upload_urls) {
            (Some(url), _) => url.clone(),
            (None, Some(parts)) => format!("{} parts", parts.len()),
            (None, None) => "-".to_string(),
        };
        let size = record
            .size
            .map_or_else(|| "deferred".to_string(), |s| s.to_string());
        println!(
            "{}\t{}\t{}\t{}",
            upload.key,
            record.creation_time.to_rfc3339(),
            size,
            target
        );
    }
    Ok(())
}
