//! Upload error types.

use std::fmt;

use resumable_http::{HttpRequest, HttpResponse, Method, TransportError};
use resumable_protocol::constants::X_REQUEST_ID;
use resumable_protocol::{ProtocolError, StatusClass};
use resumable_transfer::SourceError;

/// The request an error originated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub method: Method,
    pub url: String,
    /// `None` when no response was received.
    pub status: Option<u16>,
    pub body: Option<String>,
    pub request_id: Option<String>,
}

impl RequestContext {
    pub fn new(request: &HttpRequest, response: Option<&HttpResponse>) -> Self {
        Self {
            method: request.method,
            url: request.url.clone(),
            status: response.map(|r| r.status),
            body: response.map(HttpResponse::body_text).filter(|b| !b.is_empty()),
            request_id: request.headers.get(X_REQUEST_ID).map(str::to_string),
        }
    }
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request (method: {}, url: {}", self.method, self.url)?;
        match self.status {
            Some(status) => write!(f, ", response code: {status}")?,
            None => f.write_str(", response code: n/a")?,
        }
        if let Some(body) = &self.body {
            write!(f, ", response text: {body}")?;
        }
        if let Some(id) = &self.request_id {
            write!(f, ", request id: {id}")?;
        }
        f.write_str(")")
    }
}

/// Errors reported by upload sessions.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Bad or conflicting options. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The source produced a different number of bytes than declared.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// The server answered in a way the protocol does not allow.
    #[error("{message}, originated from {context}")]
    Protocol {
        message: String,
        context: RequestContext,
    },

    /// Network failure or a status that may succeed later.
    #[error("{message}, originated from {context}")]
    Transient {
        message: String,
        context: RequestContext,
    },

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("upload aborted")]
    Aborted,
}

impl UploadError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        UploadError::Configuration(message.into())
    }

    /// Error for an unexpected response, classified by its status.
    pub(crate) fn from_response(
        message: impl Into<String>,
        request: &HttpRequest,
        response: &HttpResponse,
    ) -> Self {
        let message = message.into();
        let context = RequestContext::new(request, Some(response));
        match StatusClass::of(response.status) {
            class if class.is_transient() => UploadError::Transient { message, context },
            StatusClass::RateLimited => UploadError::Transient { message, context },
            _ => UploadError::Protocol { message, context },
        }
    }

    /// Error for a response that is well-formed HTTP but violates the
    /// protocol (missing or bad headers).
    pub(crate) fn protocol(
        message: impl Into<String>,
        request: &HttpRequest,
        response: &HttpResponse,
    ) -> Self {
        UploadError::Protocol {
            message: message.into(),
            context: RequestContext::new(request, Some(response)),
        }
    }

    pub(crate) fn from_transport(request: &HttpRequest, err: TransportError) -> Self {
        let context = RequestContext::new(request, None);
        if err.is_network() {
            UploadError::Transient {
                message: format!("failed to send request: {err}"),
                context,
            }
        } else {
            UploadError::Protocol {
                message: format!("failed to build request: {err}"),
                context,
            }
        }
    }

    /// The originating request, for request-related errors.
    pub fn context(&self) -> Option<&RequestContext> {
        match self {
            UploadError::Protocol { context, .. } | UploadError::Transient { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }

    /// Response status, when a response was received.
    pub fn status(&self) -> Option<u16> {
        self.context().and_then(|c| c.status)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, UploadError::Transient { .. })
    }

    /// Whether no response was received at all.
    pub fn is_network(&self) -> bool {
        self.is_transient() && self.status().is_none()
    }
}

impl From<ProtocolError> for UploadError {
    fn from(err: ProtocolError) -> Self {
        UploadError::Configuration(err.to_string())
    }
}
