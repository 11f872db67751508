use crate::constants::{STATUS_CONFLICT, STATUS_LOCKED, STATUS_TOO_MANY_REQUESTS};

/// Coarse interpretation of an HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx.
    Success,
    /// 423: the upload is locked by another request.
    Locked,
    /// 429: the server wants us to slow down.
    RateLimited,
    /// 409 and other client errors the server expects us to retry.
    Conflict,
    /// Any other 4xx.
    ClientError,
    /// 5xx.
    ServerError,
    /// 1xx, 3xx or out-of-range values.
    Unexpected,
}

impl StatusClass {
    /// Classifies a raw status code.
    pub fn of(status: u16) -> Self {
        match status {
            200..=299 => Self::Success,
            STATUS_LOCKED => Self::Locked,
            STATUS_TOO_MANY_REQUESTS => Self::RateLimited,
            STATUS_CONFLICT => Self::Conflict,
            400..=499 => Self::ClientError,
            500..=599 => Self::ServerError,
            _ => Self::Unexpected,
        }
    }

    /// Whether a request that failed with this class may be retried
    /// without caller intervention.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Locked | Self::Conflict | Self::ServerError)
    }
}

/// Returns `true` when `status` falls in the hundred-block starting at `category`.
pub fn in_category(status: u16, category: u16) -> bool {
    status >= category && status < category + 100
}
