use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// What a worker should do after reaching a checkpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Checkpoint {
    Continue,
    Cancelled,
    DeadlineReached,
}

/// Evaluates the cancellation flag and the wall-clock deadline at worker checkpoints.
///
/// Every worker evaluates the deadline on its own; nothing enforces it centrally. Workers may
/// therefore stop a few milliseconds apart, which is negligible against the measurement window.
#[derive(Debug)]
pub(crate) struct StopCondition<'a> {
    cancel_requested: &'a AtomicBool,
    started: Instant,
    duration: Duration,
}

impl<'a> StopCondition<'a> {
    pub(crate) fn new(
        cancel_requested: &'a AtomicBool,
        started: Instant,
        duration: Duration,
    ) -> Self {
        Self {
            cancel_requested,
            started,
            duration,
        }
    }

    /// Cancellation takes priority over the deadline.
    pub(crate) fn check(&self) -> Checkpoint {
        if self.is_cancelled() {
            Checkpoint::Cancelled
        } else if self.started.elapsed() >= self.duration {
            Checkpoint::DeadlineReached
        } else {
            Checkpoint::Continue
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        // Acquire pairs with the Release in the session's cancel().
        self.cancel_requested.load(Ordering::Acquire)
    }
}
