use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::SchedulerError;
use crate::scheduler::Shared;

/// Handle to a scheduled task.
///
/// Dropping the handle before the task finished aborts it.
pub struct TaskHandle<T> {
    pub(crate) id: u64,
    pub(crate) shared: Arc<Shared>,
    pub(crate) cancel: CancellationToken,
    pub(crate) join: Option<JoinHandle<Result<T, SchedulerError>>>,
}

impl<T> TaskHandle<T> {
    /// Aborts the task.
    ///
    /// A queued task is removed before it ever runs. A running task is
    /// cancelled and its slot is released.
    pub fn abort(&self) {
        self.cancel.cancel();
        self.shared.withdraw(self.id);
    }

    /// Waits for the task's output.
    pub async fn done(&mut self) -> Result<T, SchedulerError> {
        let Some(join) = self.join.as_mut() else {
            return Err(SchedulerError::Aborted);
        };
        let result = join.await;
        self.join = None;
        match result {
            Ok(out) => out,
            Err(e) if e.is_cancelled() => Err(SchedulerError::Aborted),
            Err(e) => Err(SchedulerError::Panicked(e.to_string())),
        }
    }
}

impl<T> Drop for TaskHandle<T> {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.abort();
        }
    }
}
