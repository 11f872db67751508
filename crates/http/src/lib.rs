//! Transport port for resumable uploads.
//!
//! The upload engine talks to the network only through [`HttpTransport`].
//! [`ReqwestTransport`] is the production implementation; tests plug in
//! in-memory servers.

mod reqwest_transport;
mod transport;
mod types;

pub use reqwest_transport::ReqwestTransport;
pub use transport::{BoxFuture, HttpTransport, TransportError, UploadProgressFn};
pub use types::{Headers, HttpRequest, HttpResponse, Method};
