use std::time::Duration;

/// Where a [`BenchmarkSession`][crate::BenchmarkSession] is in its lifecycle.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "the session state machine has exactly these states"
)]
pub enum Status {
    /// No run is active and no result is waiting to be taken.
    Idle,

    /// A run is in progress.
    Running,

    /// The last run finished and its score is waiting to be taken.
    Completed,

    /// The last run was cancelled. There is no score.
    Cancelled,
}

/// A snapshot of the active run, cheap enough to take every UI frame.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Progress {
    elapsed: Duration,
    duration: Duration,
    live_ops: u64,
    worker_count: usize,
}

impl Progress {
    pub(crate) fn new(
        elapsed: Duration,
        duration: Duration,
        live_ops: u64,
        worker_count: usize,
    ) -> Self {
        Self {
            elapsed,
            duration,
            live_ops,
            worker_count,
        }
    }

    /// Wall-clock time since the run started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// [`elapsed()`][Self::elapsed] in whole milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> u128 {
        self.elapsed.as_millis()
    }

    /// The nominal duration of the run.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Operations published by the workers so far.
    ///
    /// Workers publish at checkpoints, so this trails the true count by at most one checkpoint
    /// interval per worker.
    #[must_use]
    pub fn live_ops(&self) -> u64 {
        self.live_ops
    }

    /// Number of workers generating load.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Fraction of the nominal duration that has elapsed, clamped to `0.0..=1.0`.
    #[must_use]
    pub fn fraction_complete(&self) -> f64 {
        if self.duration.is_zero() {
            return 0.0;
        }

        (self.elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }
}
