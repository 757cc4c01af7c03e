use std::hint::black_box;

/// Evaluates one unit of the floating-point workload: `sin(x) * cos(x) + sqrt(x + 1)`.
///
/// One call is one counted operation. The input is routed through [`black_box`] so the compiler
/// cannot fold a loop of calls with predictable seeds into a constant, and callers are expected to
/// retain the result for the same reason.
///
/// The result is finite for any finite non-negative seed.
///
/// # Example
///
/// ```
/// let value = reflex_bench::workload_kernel(0.0);
///
/// // sin(0) * cos(0) + sqrt(1)
/// assert!((value - 1.0).abs() < f64::EPSILON);
/// ```
#[inline]
#[must_use]
pub fn workload_kernel(seed: f64) -> f64 {
    let x = black_box(seed);
    x.sin() * x.cos() + (x + 1.0).sqrt()
}

/// Runs `count` consecutive kernel calls, seeding each from its global iteration index.
///
/// Returns the folded results. The caller must keep the return value alive (e.g. via
/// [`black_box`]) or the whole interval is dead code.
#[inline]
pub(crate) fn run_interval(first_iteration: u64, count: u64) -> f64 {
    let mut accumulator = 0.0_f64;

    for iteration in first_iteration..first_iteration.saturating_add(count) {
        accumulator += workload_kernel(seed_for(iteration));
    }

    accumulator
}

/// Maps an iteration index onto a small, well-conditioned seed so that every call does the same
/// amount of work regardless of how far into the run the worker is.
#[inline]
fn seed_for(iteration: u64) -> f64 {
    #[expect(
        clippy::cast_precision_loss,
        reason = "the modulus keeps the value far below the f64 mantissa limit"
    )]
    let bucket = (iteration % 1024) as f64;

    bucket * 0.001
}
