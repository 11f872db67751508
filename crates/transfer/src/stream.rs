use std::pin::Pin;

use bytes::{Buf, Bytes, BytesMut};
use futures_util::future::BoxFuture;
use futures_util::{Stream, StreamExt};
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tracing::trace;

use crate::{ChunkSource, Slice, SourceError, SourceIdentity};

type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Forward-only source over a byte stream.
///
/// Data from the last requested start onwards is retained so that a chunk
/// can be re-sent after a failed request. Asking for anything before that
/// start is an error.
pub struct StreamSource {
    inner: Option<ByteStream>,
    buffer: BytesMut,
    /// Stream offset of `buffer[0]`.
    buffer_offset: u64,
    finished: bool,
    size: Option<u64>,
    name: Option<String>,
}

impl StreamSource {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: Some(Box::pin(stream)),
            buffer: BytesMut::new(),
            buffer_offset: 0,
            finished: false,
            size: None,
            name: None,
        }
    }

    /// Wraps an `AsyncRead` (stdin, a pipe, a socket).
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self::new(ReaderStream::new(reader))
    }

    /// Declares the total size up front, when the caller knows it.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn buffer_end(&self) -> u64 {
        self.buffer_offset + self.buffer.len() as u64
    }

    async fn read_until(&mut self, start: u64, end: u64) -> Result<Slice, SourceError> {
        if start > end {
            return Err(SourceError::InvalidRange { start, end });
        }
        if start < self.buffer_offset {
            return Err(SourceError::RangeEvicted {
                start,
                retained: self.buffer_offset,
            });
        }

        while !self.finished && self.buffer_end() < end {
            let stream = self.inner.as_mut().ok_or(SourceError::Closed)?;
            match stream.next().await {
                Some(chunk) => self.buffer.extend_from_slice(&chunk?),
                None => {
                    trace!(total = self.buffer_end(), "stream source exhausted");
                    self.finished = true;
                }
            }
        }

        // Forget everything before `start`; it has been acknowledged.
        let acked = (start - self.buffer_offset).min(self.buffer.len() as u64);
        self.buffer.advance(acked as usize);
        self.buffer_offset += acked;

        let done = self.finished && end >= self.buffer_end();
        if self.buffer.is_empty() && self.finished {
            return Ok(Slice { data: None, done });
        }
        let take = ((end - start) as usize).min(self.buffer.len());
        Ok(Slice {
            data: Some(Bytes::copy_from_slice(&self.buffer[..take])),
            done,
        })
    }
}

impl ChunkSource for StreamSource {
    fn slice(&mut self, start: u64, end: u64) -> BoxFuture<'_, Result<Slice, SourceError>> {
        Box::pin(self.read_until(start, end))
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn close(&mut self) {
        self.inner = None;
        self.buffer.clear();
    }

    fn identity(&self) -> SourceIdentity {
        SourceIdentity {
            kind: "stream",
            name: self.name.clone(),
            modified_ms: None,
            content_digest: None,
        }
    }
}
