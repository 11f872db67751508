//! Production transport built on `reqwest`.

use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, HeaderMap, HeaderName, HeaderValue};
use tracing::trace;

use crate::transport::{BoxFuture, HttpTransport, TransportError, UploadProgressFn};
use crate::types::{Headers, HttpRequest, HttpResponse, Method};

/// Body pieces are reported to the progress callback at this granularity.
const PROGRESS_SLICE: usize = 64 * 1024;

/// `HttpTransport` over a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with a fresh client.
    pub fn new() -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        Ok(Self { http })
    }

    /// Wraps an existing client (custom TLS, proxies, default headers).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Head => reqwest::Method::HEAD,
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

fn to_header_map(headers: &Headers) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("header {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::InvalidRequest(format!("header {name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn from_header_map(map: &HeaderMap) -> Headers {
    map.iter()
        .map(|(k, v)| (k.as_str(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
        .collect()
}

/// Builds a streaming body that reports cumulative bytes as reqwest pulls it.
fn progress_body(body: Bytes, on_progress: UploadProgressFn) -> reqwest::Body {
    let pieces: Vec<Bytes> = (0..body.len())
        .step_by(PROGRESS_SLICE)
        .map(|start| body.slice(start..(start + PROGRESS_SLICE).min(body.len())))
        .collect();

    let mut sent = 0u64;
    let stream = futures_util::stream::iter(pieces).map(move |piece| {
        sent += piece.len() as u64;
        on_progress(sent);
        Ok::<_, std::io::Error>(piece)
    });
    reqwest::Body::wrap_stream(stream)
}

fn map_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(
        &self,
        request: HttpRequest,
        on_progress: Option<UploadProgressFn>,
    ) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
        Box::pin(async move {
            let headers = to_header_map(&request.headers)?;
            let mut builder = self
                .http
                .request(to_reqwest_method(request.method), &request.url)
                .headers(headers);

            if let Some(timeout) = request.timeout {
                builder = builder.timeout(timeout);
            }

            if let Some(body) = request.body {
                builder = builder.header(CONTENT_LENGTH, body.len());
                builder = match on_progress {
                    Some(cb) => builder.body(progress_body(body, cb)),
                    None => builder.body(body),
                };
            }

            trace!(method = %request.method, url = %request.url, "sending request");
            let resp = builder.send().await.map_err(map_error)?;

            let status = resp.status().as_u16();
            let headers = from_header_map(resp.headers());
            let body = resp.bytes().await.map_err(map_error)?;
            trace!(status, url = %request.url, "response received");

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}
