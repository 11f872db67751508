//! Header names, media types and status codes shared by every dialect.

/// Protocol version header used by tus v1.
pub const TUS_RESUMABLE: &str = "Tus-Resumable";

/// The only tus version this client speaks.
pub const TUS_VERSION: &str = "1.0.0";

/// Interop version header used by the IETF drafts.
pub const UPLOAD_DRAFT_INTEROP_VERSION: &str = "Upload-Draft-Interop-Version";

/// Interop version announced for draft 03.
pub const DRAFT_03_INTEROP_VERSION: &str = "5";

/// Interop version announced for draft 05.
pub const DRAFT_05_INTEROP_VERSION: &str = "6";

pub const UPLOAD_LENGTH: &str = "Upload-Length";
pub const UPLOAD_DEFER_LENGTH: &str = "Upload-Defer-Length";
pub const UPLOAD_OFFSET: &str = "Upload-Offset";
pub const UPLOAD_METADATA: &str = "Upload-Metadata";
pub const UPLOAD_CONCAT: &str = "Upload-Concat";
pub const UPLOAD_COMPLETE: &str = "Upload-Complete";
pub const LOCATION: &str = "Location";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const RETRY_AFTER: &str = "Retry-After";
pub const X_HTTP_METHOD_OVERRIDE: &str = "X-HTTP-Method-Override";
pub const X_REQUEST_ID: &str = "X-Request-ID";

/// Content type of tus v1 chunk bodies.
pub const OFFSET_OCTET_STREAM: &str = "application/offset+octet-stream";

/// Content type of IETF draft 05 chunk bodies.
pub const PARTIAL_UPLOAD: &str = "application/partial-upload";

/// Structured-field booleans used by `Upload-Complete`.
pub const SF_TRUE: &str = "?1";
pub const SF_FALSE: &str = "?0";

/// Termination succeeds only with this status.
pub const STATUS_NO_CONTENT: u16 = 204;

/// Offset conflict; transient.
pub const STATUS_CONFLICT: u16 = 409;

/// Upload temporarily locked by another request; transient.
pub const STATUS_LOCKED: u16 = 423;

/// Server-signalled rate limit.
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;
