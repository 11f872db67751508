//! The transport port.
//!
//! `HttpTransport` is implemented by whatever HTTP stack the host
//! application uses. Keeping it a trait decouples the upload state machine
//! from the network and keeps it testable with in-memory servers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::types::{HttpRequest, HttpResponse};

/// Boxed future returned by transports.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Receives the number of body bytes sent so far for the current request.
pub type UploadProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Failures where no response was received.
///
/// A response with an error status is *not* a `TransportError`; it comes
/// back as `Ok(HttpResponse)` and the caller interprets the status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Whether this failure happened on the wire (and may succeed on retry).
    pub fn is_network(&self) -> bool {
        matches!(self, TransportError::Network(_) | TransportError::Timeout)
    }
}

/// Performs one HTTP request.
///
/// Dropping the returned future cancels the request.
pub trait HttpTransport: Send + Sync {
    fn send(
        &self,
        request: HttpRequest,
        on_progress: Option<UploadProgressFn>,
    ) -> BoxFuture<'_, Result<HttpResponse, TransportError>>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    fn send(
        &self,
        request: HttpRequest,
        on_progress: Option<UploadProgressFn>,
    ) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        (**self).send(request, on_progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Method;
    use std::sync::Mutex;

    struct Echo {
        seen: Mutex<Vec<String>>,
    }

    impl HttpTransport for Echo {
        fn send(
            &self,
            request: HttpRequest,
            on_progress: Option<UploadProgressFn>,
        ) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
            self.seen.lock().unwrap().push(request.url.clone());
            Box::pin(async move {
                if let Some(progress) = on_progress {
                    progress(request.body_len());
                }
                Ok(HttpResponse::new(204))
            })
        }
    }

    #[tokio::test]
    async fn arc_forwards_to_inner() {
        let echo = Arc::new(Echo {
            seen: Mutex::new(Vec::new()),
        });
        let transport: Arc<dyn HttpTransport> = echo.clone();

        let sent = Arc::new(Mutex::new(0u64));
        let sent_cb = Arc::clone(&sent);
        let resp = transport
            .send(
                HttpRequest::new(Method::Delete, "http://x/1").with_body("abc".into()),
                Some(Arc::new(move |n| *sent_cb.lock().unwrap() = n)),
            )
            .await
            .unwrap();

        assert_eq!(resp.status, 204);
        assert_eq!(*sent.lock().unwrap(), 3);
        assert_eq!(echo.seen.lock().unwrap().as_slice(), ["http://x/1"]);
    }

    #[test]
    fn network_classification() {
        assert!(TransportError::Network("reset".into()).is_network());
        assert!(TransportError::Timeout.is_network());
        assert!(!TransportError::InvalidRequest("bad".into()).is_network());
    }
}
