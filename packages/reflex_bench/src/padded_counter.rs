use std::sync::atomic::{AtomicU64, Ordering};

/// Assumed size of a cache line. Workers that publish into neighboring counters must never share
/// one, or every publish would invalidate the line on every other core.
pub(crate) const CACHE_LINE_SIZE: usize = 64;

/// Operation counter that occupies a whole cache line.
///
/// Each counter has exactly one writer (the worker that owns it). Any number of readers may observe
/// it at any time to render live progress; a reader that needs the exact final value must first
/// join the writer thread.
#[derive(Debug, Default)]
#[repr(align(64))]
pub(crate) struct PaddedCounter {
    value: AtomicU64,
}

const _: () = assert!(size_of::<PaddedCounter>() >= CACHE_LINE_SIZE);
const _: () = assert!(align_of::<PaddedCounter>() >= CACHE_LINE_SIZE);

impl PaddedCounter {
    pub(crate) const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Publishes the writer's running total.
    ///
    /// Release pairs with the Acquire in `load()`, so a reader that sees this value also sees
    /// everything the writer did before publishing it.
    pub(crate) fn publish(&self, total: u64) {
        self.value.store(total, Ordering::Release);
    }

    pub(crate) fn load(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }
}

/// Allocates one counter per worker.
pub(crate) fn counters(count: usize) -> Box<[PaddedCounter]> {
    (0..count).map(|_| PaddedCounter::new()).collect()
}

/// Sums the live values of a set of counters. The result is only exact once all writers have
/// terminated.
pub(crate) fn sum_live(counters: &[PaddedCounter]) -> u64 {
    counters
        .iter()
        .map(PaddedCounter::load)
        .fold(0_u64, u64::saturating_add)
}
