use bytes::Bytes;
use futures_util::future::BoxFuture;

use crate::fingerprint::content_digest;
use crate::{ChunkSource, Slice, SourceError, SourceIdentity};

/// Source over an in-memory buffer.
#[derive(Debug, Clone)]
pub struct BufferSource {
    data: Bytes,
    name: Option<String>,
}

impl BufferSource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            name: None,
        }
    }

    /// Names the buffer so its fingerprint does not depend on its content.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl ChunkSource for BufferSource {
    fn slice(&mut self, start: u64, end: u64) -> BoxFuture<'_, Result<Slice, SourceError>> {
        let size = self.data.len() as u64;
        let result = if start > end {
            Err(SourceError::InvalidRange { start, end })
        } else {
            let from = start.min(size) as usize;
            let to = end.min(size) as usize;
            Ok(Slice {
                data: Some(self.data.slice(from..to)),
                done: end >= size,
            })
        };
        Box::pin(async move { result })
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn identity(&self) -> SourceIdentity {
        SourceIdentity {
            kind: "buffer",
            name: self.name.clone(),
            modified_ms: None,
            content_digest: self.name.is_none().then(|| content_digest(&self.data)),
        }
    }

    fn sub_source(&self, start: u64, end: u64) -> Option<Box<dyn ChunkSource>> {
        let size = self.data.len() as u64;
        if start > end || end > size {
            return None;
        }
        Some(Box::new(BufferSource::new(
            self.data.slice(start as usize..end as usize),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slices_and_done_flag() {
        let mut src = BufferSource::new(Bytes::from_static(b"0123456789"));
        assert_eq!(src.size(), Some(10));

        let a = src.slice(0, 4).await.unwrap();
        assert_eq!(a.data.unwrap().as_ref(), b"0123");
        assert!(!a.done);

        let c = src.slice(8, 12).await.unwrap();
        assert_eq!(c.data.unwrap().as_ref(), b"89");
        assert!(c.done);
    }

    #[tokio::test]
    async fn rereading_same_range_is_stable() {
        let mut src = BufferSource::new(Bytes::from_static(b"abcdef"));
        let first = src.slice(2, 5).await.unwrap();
        let again = src.slice(2, 5).await.unwrap();
        assert_eq!(first, again);
    }

    #[tokio::test]
    async fn inverted_range_rejected() {
        let mut src = BufferSource::new(Bytes::from_static(b"abc"));
        assert!(matches!(
            src.slice(2, 1).await,
            Err(SourceError::InvalidRange { start: 2, end: 1 })
        ));
    }

    #[test]
    fn identity_uses_name_or_content() {
        let named = BufferSource::new(Bytes::from_static(b"x")).with_name("video.mp4");
        assert_eq!(named.identity().name.as_deref(), Some("video.mp4"));
        assert!(named.identity().content_digest.is_none());

        let anon = BufferSource::new(Bytes::from_static(b"x"));
        assert!(anon.identity().content_digest.is_some());
    }

    #[test]
    fn sub_source_out_of_bounds() {
        let src = BufferSource::new(Bytes::from_static(b"abc"));
        assert!(src.sub_source(1, 4).is_none());
        assert_eq!(src.sub_source(1, 3).unwrap().size(), Some(2));
    }
}
