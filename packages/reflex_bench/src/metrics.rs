//! Metrics for the benchmark engine.
//!
//! These observe the engine's own overhead and responsiveness, not the benchmark result itself.
//! The events are per-thread to keep recording off the workers' shared cache lines.

use nm::{Event, Magnitude};

/// Histogram buckets for the wall-clock time between two CPU worker checkpoints, in microseconds.
///
/// This is the worst-case cancellation latency of a CPU worker. We expect a few milliseconds on
/// typical desktop processors.
const CHECKPOINT_INTERVAL_US_BUCKETS: &[Magnitude] =
    &[100, 250, 500, 1_000, 2_500, 5_000, 10_000, 25_000, 50_000, 100_000];

/// Histogram buckets for the time from submitting a GPU batch to observing its fence, in
/// milliseconds.
const GPU_BATCH_SYNC_MS_BUCKETS: &[Magnitude] = &[0, 1, 2, 5, 10, 20, 50, 100, 200, 500, 1000];

/// Histogram buckets for how long a cancellation blocked its caller, in milliseconds.
///
/// Anything beyond the primary grace timeout means at least one thread was detached.
const CANCEL_JOIN_MS_BUCKETS: &[Magnitude] = &[0, 1, 5, 10, 25, 50, 100, 250, 500, 1000, 2000];

thread_local! {
    pub(crate) static CHECKPOINT_INTERVAL_US: Event = Event::builder()
        .name("reflex_bench_checkpoint_interval_us")
        .histogram(CHECKPOINT_INTERVAL_US_BUCKETS)
        .build();

    pub(crate) static GPU_BATCH_SYNC_MS: Event = Event::builder()
        .name("reflex_bench_gpu_batch_sync_ms")
        .histogram(GPU_BATCH_SYNC_MS_BUCKETS)
        .build();

    pub(crate) static CANCEL_JOIN_MS: Event = Event::builder()
        .name("reflex_bench_cancel_join_ms")
        .histogram(CANCEL_JOIN_MS_BUCKETS)
        .build();
}
