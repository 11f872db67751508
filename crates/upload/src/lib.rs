//! Resumable upload sessions.
//!
//! An [`UploadSession`] uploads one [`ChunkSource`](resumable_transfer::ChunkSource)
//! in chunks: it creates the upload (or probes a known one for its offset),
//! sends chunks one at a time through a shared
//! [`RateLimitedScheduler`](resumable_scheduler::RateLimitedScheduler), and
//! retries failures according to its options. Split uploads send several
//! parts concurrently and concatenate them at the end.

mod engine;
mod error;
mod handler;
mod options;
mod request;
mod retry;
mod session;
mod sink;
mod split;
mod state;
mod terminate;

#[cfg(test)]
mod testing;

pub use error::{RequestContext, UploadError};
pub use handler::{UploadHandler, UploadOutcome};
pub use options::{DEFAULT_RATE_LIMIT_COOLDOWN, DEFAULT_RETRY_DELAYS, PartBoundary, UploadOptions};
pub use session::{SessionBuilder, UploadSession};
pub use split::split_size_into_parts;
pub use state::UploadState;
pub use terminate::terminate;
