use std::time::Duration;

/// Lifecycle of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadState {
    #[default]
    Idle,
    /// Creating the upload on the server.
    Creating,
    /// Probing the server for the offset of a known upload.
    Resuming,
    Uploading,
    /// Aborted without termination; `start` continues where it stopped.
    Paused,
    /// Waiting `delay` before retry number `attempt`.
    PendingRetry { attempt: usize, delay: Duration },
    Completed,
    Failed,
    Terminated,
}

impl UploadState {
    /// Whether the session is at rest and no driver is making progress.
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            UploadState::Paused
                | UploadState::Completed
                | UploadState::Failed
                | UploadState::Terminated
        )
    }
}
