use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Upload speed over a sliding window of cumulative byte counts.
///
/// Feed it the `uploaded` value of every progress event. The count may go
/// backwards (a retried chunk restarts its body); the window is then reset.
pub struct SpeedCalculator {
    inner: Mutex<Window>,
}

struct Window {
    samples: VecDeque<(Instant, u64)>,
    span: Duration,
    max_samples: usize,
}

impl SpeedCalculator {
    /// `span` defaults to 5 s, `max_samples` to 100.
    pub fn new(span: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(Window {
                samples: VecDeque::new(),
                span: span.unwrap_or(Duration::from_secs(5)),
                max_samples: max_samples.unwrap_or(100).max(2),
            }),
        }
    }

    /// Records that `uploaded` bytes have been sent so far.
    pub fn record(&self, uploaded: u64) {
        self.record_at(Instant::now(), uploaded);
    }

    fn record_at(&self, now: Instant, uploaded: u64) {
        let Ok(mut w) = self.inner.lock() else {
            return;
        };
        if w.samples.back().is_some_and(|&(_, last)| uploaded < last) {
            w.samples.clear();
        }
        w.samples.push_back((now, uploaded));

        let span = w.span;
        while w
            .samples
            .front()
            .is_some_and(|&(t, _)| now.duration_since(t) > span)
        {
            w.samples.pop_front();
        }
        while w.samples.len() > w.max_samples {
            w.samples.pop_front();
        }
    }

    /// Bytes per second across the window; 0.0 with fewer than two samples.
    pub fn bytes_per_second(&self) -> f64 {
        let Ok(w) = self.inner.lock() else {
            return 0.0;
        };
        let (Some(&(t0, b0)), Some(&(t1, b1))) = (w.samples.front(), w.samples.back()) else {
            return 0.0;
        };
        let elapsed = t1.duration_since(t0);
        if elapsed.is_zero() {
            return 0.0;
        }
        (b1 - b0) as f64 / elapsed.as_secs_f64()
    }

    /// Estimated time to send `remaining` more bytes.
    pub fn eta(&self, remaining: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        (speed > 0.0).then(|| Duration::from_secs_f64(remaining as f64 / speed))
    }

    pub fn reset(&self) {
        if let Ok(mut w) = self.inner.lock() {
            w.samples.clear();
        }
    }
}
