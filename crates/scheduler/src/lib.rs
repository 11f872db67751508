//! Request scheduler shared by upload sessions.
//!
//! Every request a session makes runs as a scheduler task, so many uploads
//! share one concurrency budget. The budget shrinks when a server signals
//! rate limiting and climbs back gradually afterwards.

mod handle;
mod scheduler;

pub use handle::TaskHandle;
pub use scheduler::{RateLimitedScheduler, UNBOUNDED};

/// Errors returned by [`TaskHandle::done`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("task aborted")]
    Aborted,

    #[error("task panicked: {0}")]
    Panicked(String),
}
