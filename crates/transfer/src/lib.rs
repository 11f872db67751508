//! Chunk sources for resumable uploads.
//!
//! A [`ChunkSource`] hands out byte ranges of the object being uploaded.
//! Finite sources ([`BufferSource`], [`FileSource`]) can serve any range at
//! any time; [`StreamSource`] buffers what has not been acknowledged yet and
//! forgets everything before the last requested start.

mod buffer;
mod file;
mod fingerprint;
mod progress;
mod source;
mod stream;

pub use buffer::BufferSource;
pub use file::FileSource;
pub use fingerprint::fingerprint;
pub use progress::SpeedCalculator;
pub use source::{ChunkSource, Slice, SourceIdentity, read_range};
pub use stream::StreamSource;

/// Default chunk size: 4 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Errors produced by chunk sources.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("requested range starts at {start}, before the retained window at {retained}")]
    RangeEvicted { start: u64, retained: u64 },

    #[error("invalid range {start}..{end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("source closed")]
    Closed,
}
