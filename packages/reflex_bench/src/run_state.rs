use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::StopCondition;
use crate::padded_counter::{self, PaddedCounter};

/// State shared between a session and the threads of one run.
///
/// Every run gets a fresh instance. A thread detached by a timed-out cancellation keeps its own
/// run's state alive and can never write into a later run.
#[derive(Debug)]
pub(crate) struct RunState {
    cancel_requested: AtomicBool,
    started: Instant,
    duration: Duration,
    counters: Box<[PaddedCounter]>,
}

impl RunState {
    pub(crate) fn new(worker_count: usize, duration: Duration) -> Self {
        Self {
            cancel_requested: AtomicBool::new(false),
            started: Instant::now(),
            duration,
            counters: padded_counter::counters(worker_count),
        }
    }

    pub(crate) fn stop_condition(&self) -> StopCondition<'_> {
        StopCondition::new(&self.cancel_requested, self.started, self.duration)
    }

    pub(crate) fn request_cancel(&self) {
        // Release pairs with the Acquire in StopCondition::is_cancelled().
        self.cancel_requested.store(true, Ordering::Release);
    }

    pub(crate) fn counter(&self, worker: usize) -> Option<&PaddedCounter> {
        self.counters.get(worker)
    }

    pub(crate) fn worker_count(&self) -> usize {
        self.counters.len()
    }

    pub(crate) fn started(&self) -> Instant {
        self.started
    }

    pub(crate) fn duration(&self) -> Duration {
        self.duration
    }

    /// Current total across all workers. Exact only after every worker has been joined.
    pub(crate) fn live_ops(&self) -> u64 {
        padded_counter::sum_live(&self.counters)
    }
}
