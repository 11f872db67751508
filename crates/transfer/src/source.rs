use bytes::Bytes;
use futures_util::future::BoxFuture;

use crate::{BufferSource, SourceError};

/// The result of a range read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Slice {
    /// Bytes of the range; `None` when nothing is left to read.
    pub data: Option<Bytes>,
    /// Whether this slice reaches the end of the source.
    pub done: bool,
}

impl Slice {
    pub fn len(&self) -> u64 {
        self.data.as_ref().map_or(0, |d| d.len() as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a source knows about the object it reads, for fingerprinting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceIdentity {
    /// Short tag for the kind of source (`file`, `buffer`, `stream`).
    pub kind: &'static str,
    /// Path or caller-supplied name.
    pub name: Option<String>,
    /// Modification time in milliseconds since the Unix epoch.
    pub modified_ms: Option<i64>,
    /// Digest of leading content, for sources with no stable name.
    pub content_digest: Option<String>,
}

/// Random-access (or forward-only, for streams) reader of upload data.
///
/// Implementations must serve the same `[start, end)` again after a retry
/// as long as `start` is not before a previously requested start.
pub trait ChunkSource: Send {
    /// Reads `[start, end)`. The slice may be shorter when the source ends.
    fn slice(&mut self, start: u64, end: u64) -> BoxFuture<'_, Result<Slice, SourceError>>;

    /// Total size, if known up front.
    fn size(&self) -> Option<u64>;

    /// Releases underlying resources. Further slices fail.
    fn close(&mut self) {}

    fn identity(&self) -> SourceIdentity;

    /// Independent source over `[start, end)` of this one, if the source
    /// can provide it without reading the range into memory.
    fn sub_source(&self, _start: u64, _end: u64) -> Option<Box<dyn ChunkSource>> {
        None
    }
}

/// Returns an independent source over `[start, end)`.
///
/// Falls back to reading the whole range into a [`BufferSource`] when the
/// source cannot provide a view.
pub async fn read_range(
    source: &mut dyn ChunkSource,
    start: u64,
    end: u64,
) -> Result<Box<dyn ChunkSource>, SourceError> {
    if let Some(view) = source.sub_source(start, end) {
        return Ok(view);
    }
    let slice = source.slice(start, end).await?;
    let data = slice.data.unwrap_or_default();
    if (data.len() as u64) != end - start {
        return Err(SourceError::InvalidRange { start, end });
    }
    Ok(Box::new(BufferSource::new(data)))
}
