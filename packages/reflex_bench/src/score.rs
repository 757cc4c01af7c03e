use std::fmt::{self, Display};
use std::time::Duration;

use crate::Strategy;

/// The finalized result of a completed benchmark run.
///
/// The score is expressed in millions of kernel operations per second (Mops/s), computed against
/// the run's nominal duration rather than the wall-clock time the workers actually took. Two runs
/// that complete the same number of operations therefore always receive the same score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Score {
    strategy: Strategy,
    ops: u64,
    worker_count: usize,
    nominal_duration: Duration,
    mops_per_second: f64,
}

impl Score {
    /// Scores `ops` operations completed over `nominal_duration`.
    ///
    /// A zero duration yields a zero score.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use reflex_bench::{Score, Strategy};
    ///
    /// let score = Score::new(Strategy::SingleCore, 50_000_000, 1, Duration::from_secs(10));
    /// assert_eq!(score.mops_per_second(), 5.0);
    /// ```
    #[must_use]
    pub fn new(
        strategy: Strategy,
        ops: u64,
        worker_count: usize,
        nominal_duration: Duration,
    ) -> Self {
        let seconds = nominal_duration.as_secs_f64();

        #[expect(
            clippy::cast_precision_loss,
            reason = "operation counts stay far below 2^53 for any realistic run"
        )]
        let mops_per_second = if seconds > 0.0 {
            ops as f64 / seconds / 1_000_000.0
        } else {
            0.0
        };

        Self {
            strategy,
            ops,
            worker_count,
            nominal_duration,
            mops_per_second,
        }
    }

    /// The strategy that produced this score.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Total kernel operations completed across all workers.
    #[must_use]
    pub fn ops(&self) -> u64 {
        self.ops
    }

    /// Number of workers that contributed to the run.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// The measurement window the score is normalized against.
    #[must_use]
    pub fn nominal_duration(&self) -> Duration {
        self.nominal_duration
    }

    /// Millions of kernel operations per second.
    #[must_use]
    pub fn mops_per_second(&self) -> f64 {
        self.mops_per_second
    }
}

impl Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} Mops/s ({})", self.mops_per_second, self.strategy)
    }
}
