use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{SchedulerError, TaskHandle};

/// Concurrency limit that never blocks.
pub const UNBOUNDED: usize = usize::MAX;

/// Bounded-concurrency task queue with priorities and adaptive throttling.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct RateLimitedScheduler {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    state: Mutex<State>,
}

struct State {
    limit: usize,
    /// Limit in force before the current rate-limit episode.
    recover_to: Option<usize>,
    active: usize,
    /// Sorted by priority, highest first; equal priorities in arrival order.
    pending: Vec<Pending>,
    next_id: u64,
    paused: bool,
    cooldown_until: Option<Instant>,
    /// Bumped by every rate-limit signal; stale recovery loops exit.
    generation: u64,
    tick_scheduled: bool,
}

struct Pending {
    id: u64,
    priority: i32,
    start: oneshot::Sender<()>,
}

impl State {
    fn can_dispatch(&self) -> bool {
        !self.paused
            && self.cooldown_until.is_none_or(|t| Instant::now() >= t)
            && self.active < self.limit
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts queued tasks while slots are free.
    fn advance(&self) {
        let mut st = self.lock();
        st.tick_scheduled = false;
        while st.can_dispatch() && !st.pending.is_empty() {
            let next = st.pending.remove(0);
            st.active += 1;
            if next.start.send(()).is_err() {
                st.active -= 1;
            }
        }
    }

    /// Defers [`advance`](Self::advance) to a spawned tick, coalescing
    /// releases that happen back to back.
    fn schedule_advance(self: &Arc<Self>) {
        {
            let mut st = self.lock();
            if st.tick_scheduled {
                return;
            }
            st.tick_scheduled = true;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                let shared = Arc::clone(self);
                rt.spawn(async move { shared.advance() });
            }
            Err(_) => self.advance(),
        }
    }

    fn release(self: &Arc<Self>) {
        {
            let mut st = self.lock();
            st.active = st.active.saturating_sub(1);
        }
        self.schedule_advance();
    }

    /// Removes a queued entry, if it is still queued.
    pub(crate) fn withdraw(&self, id: u64) {
        let mut st = self.lock();
        if let Some(i) = st.pending.iter().position(|p| p.id == id) {
            st.pending.remove(i);
        }
    }
}

/// Holds a concurrency slot for the lifetime of a running task.
struct Slot(Arc<Shared>);

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.release();
    }
}

impl RateLimitedScheduler {
    /// Creates a scheduler running at most `limit` tasks at once.
    ///
    /// A limit of 0 is treated as 1.
    pub fn new(limit: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    limit: limit.max(1),
                    recover_to: None,
                    active: 0,
                    pending: Vec::new(),
                    next_id: 0,
                    paused: false,
                    cooldown_until: None,
                    generation: 0,
                    tick_scheduled: false,
                }),
            }),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(UNBOUNDED)
    }

    /// Schedules `task`. It is started right away when a slot is free and
    /// dispatch is not paused; otherwise it waits in the queue.
    ///
    /// `task` is only invoked once the task is dispatched, so nothing
    /// happens for a task aborted while queued.
    pub fn run<F, Fut, T>(&self, priority: i32, task: F) -> TaskHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let cancel = CancellationToken::new();
        let (start_tx, mut start_rx) = oneshot::channel();

        let id = {
            let mut st = self.shared.lock();
            let id = st.next_id;
            st.next_id += 1;
            if st.can_dispatch() && st.pending.is_empty() {
                st.active += 1;
                let _ = start_tx.send(());
            } else {
                let at = st.pending.partition_point(|p| p.priority >= priority);
                st.pending.insert(
                    at,
                    Pending {
                        id,
                        priority,
                        start: start_tx,
                    },
                );
            }
            id
        };

        let shared = Arc::clone(&self.shared);
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    shared.withdraw(id);
                    // Dispatched right before the abort landed.
                    if start_rx.try_recv().is_ok() {
                        shared.release();
                    }
                    return Err(SchedulerError::Aborted);
                }
                started = &mut start_rx => {
                    if started.is_err() {
                        return Err(SchedulerError::Aborted);
                    }
                }
            }

            let _slot = Slot(shared);
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(SchedulerError::Aborted),
                out = task() => Ok(out),
            }
        });

        TaskHandle {
            id,
            shared: Arc::clone(&self.shared),
            cancel,
            join: Some(join),
        }
    }

    /// Reacts to a server rate-limit signal.
    ///
    /// Dispatch stops for `cooldown` and the limit is halved (never below
    /// 1). After the cool-down the limit climbs back towards its previous
    /// value, halving the distance once per `cooldown` window. Must be
    /// called from within a Tokio runtime.
    pub fn rate_limit(&self, cooldown: Duration) {
        let generation = {
            let mut st = self.shared.lock();
            let limit = st.limit;
            let upper = *st.recover_to.get_or_insert(limit);
            st.limit = (limit / 2).max(1);
            st.cooldown_until = Some(Instant::now() + cooldown);
            st.generation += 1;
            info!(
                limit = st.limit,
                upper,
                cooldown_ms = cooldown.as_millis() as u64,
                "rate limited, throttling dispatch"
            );
            st.generation
        };

        let shared = Arc::clone(&self.shared);
        tokio::spawn(recover(shared, generation, cooldown));
    }

    /// Stops dispatching queued tasks. Running tasks are unaffected.
    pub fn pause(&self) {
        self.shared.lock().paused = true;
        debug!("scheduler paused");
    }

    pub fn resume(&self) {
        self.shared.lock().paused = false;
        debug!("scheduler resumed");
        self.shared.advance();
    }

    /// Current concurrency limit.
    pub fn limit(&self) -> usize {
        self.shared.lock().limit
    }

    pub fn active_count(&self) -> usize {
        self.shared.lock().active
    }

    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Whether dispatch is paused, manually or by a rate-limit cool-down.
    pub fn is_paused(&self) -> bool {
        let st = self.shared.lock();
        st.paused || st.cooldown_until.is_some_and(|t| Instant::now() < t)
    }
}

impl Default for RateLimitedScheduler {
    fn default() -> Self {
        Self::unbounded()
    }
}

async fn recover(shared: Arc<Shared>, generation: u64, cooldown: Duration) {
    tokio::time::sleep(cooldown).await;
    {
        let mut st = shared.lock();
        if st.generation != generation {
            return;
        }
        st.cooldown_until = None;
    }
    shared.advance();

    loop {
        tokio::time::sleep(cooldown).await;
        let finished = {
            let mut st = shared.lock();
            if st.generation != generation {
                return;
            }
            let Some(upper) = st.recover_to else {
                return;
            };
            // ceil((upper + limit) / 2) without overflow.
            st.limit += (upper - st.limit).div_ceil(2);
            if st.limit >= upper {
                st.limit = upper;
                st.recover_to = None;
                info!(limit = upper, "rate limit recovered");
                true
            } else {
                debug!(limit = st.limit, upper, "rate limit recovering");
                false
            }
        };
        shared.advance();
        if finished {
            return;
        }
    }
}
