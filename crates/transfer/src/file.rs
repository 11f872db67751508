use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use bytes::{Bytes, BytesMut};
use futures_util::future::BoxFuture;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use crate::{ChunkSource, Slice, SourceError, SourceIdentity};

/// Source over a file on disk, or a window of one.
pub struct FileSource {
    file: Option<File>,
    path: PathBuf,
    /// Absolute offset of the window in the file.
    base: u64,
    /// Length of the window.
    len: u64,
    modified_ms: Option<i64>,
}

impl FileSource {
    /// Opens `path` for reading.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await?;
        let meta = file.metadata().await?;
        let modified_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64);
        debug!(path = %path.display(), size = meta.len(), "opened file source");
        Ok(Self {
            file: Some(file),
            path,
            base: 0,
            len: meta.len(),
            modified_ms,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_window(&mut self, start: u64, end: u64) -> Result<Slice, SourceError> {
        if start > end {
            return Err(SourceError::InvalidRange { start, end });
        }
        let file = self.file.as_mut().ok_or(SourceError::Closed)?;
        let from = start.min(self.len);
        let to = end.min(self.len);
        let want = (to - from) as usize;

        file.seek(SeekFrom::Start(self.base + from)).await?;
        let mut buf = BytesMut::zeroed(want);
        let mut filled = 0;
        while filled < want {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);

        Ok(Slice {
            data: Some(Bytes::from(buf)),
            done: end >= self.len,
        })
    }
}

impl ChunkSource for FileSource {
    fn slice(&mut self, start: u64, end: u64) -> BoxFuture<'_, Result<Slice, SourceError>> {
        Box::pin(self.read_window(start, end))
    }

    fn size(&self) -> Option<u64> {
        Some(self.len)
    }

    fn close(&mut self) {
        self.file = None;
    }

    fn identity(&self) -> SourceIdentity {
        SourceIdentity {
            kind: "file",
            name: Some(self.path.to_string_lossy().into_owned()),
            modified_ms: self.modified_ms,
            content_digest: None,
        }
    }

    fn sub_source(&self, start: u64, end: u64) -> Option<Box<dyn ChunkSource>> {
        if start > end || end > self.len {
            return None;
        }
        // Reopen so the view has its own cursor.
        let std_file = std::fs::File::open(&self.path).ok()?;
        Some(Box::new(FileSource {
            file: Some(File::from_std(std_file)),
            path: self.path.clone(),
            base: self.base + start,
            len: end - start,
            modified_ms: self.modified_ms,
        }))
    }
}
