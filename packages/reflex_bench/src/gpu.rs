//! GPU runner: repeatedly dispatches the workload kernel to a compute device and counts the
//! kernel iterations of every batch the device confirms as complete.

mod abstractions;
mod error;
mod facade;
mod wgpu_api;

#[cfg(test)]
mod mock;

pub(crate) use abstractions::*;
pub(crate) use error::*;
pub(crate) use facade::*;
#[cfg(test)]
pub(crate) use mock::*;
pub(crate) use wgpu_api::*;

use std::hint;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::metrics::GPU_BATCH_SYNC_MS;
use crate::{Checkpoint, PaddedCounter, RunState, StopCondition, Task};

/// Invocations per workgroup.
pub(crate) const WORKGROUP_SIZE: u32 = 256;

/// Workgroups per dispatch.
pub(crate) const WORKGROUPS_PER_DISPATCH: u32 = 1024;

/// Kernel iterations each invocation performs before writing its result.
pub(crate) const OPS_PER_THREAD: u32 = 64;

/// Dispatches queued ahead of each sync point, amortizing the fence round trip.
pub(crate) const DISPATCHES_PER_BATCH: u32 = 8;

/// Kernel iterations one batch performs: groups × invocations × iterations × dispatches.
pub(crate) const OPS_PER_BATCH: u64 = 1024 * 256 * 64 * 8;

/// One `f32` result slot per invocation of a dispatch.
pub(crate) const OUTPUT_BUFFER_SIZE: u64 = 1024 * 256 * 4;

/// WGSL source of the device-side workload kernel, matching the CPU kernel's arithmetic.
///
/// Every invocation stores its result, so the driver cannot discard the loop.
pub(crate) fn kernel_source() -> String {
    format!(
        "
@group(0) @binding(0)
var<storage, read_write> output: array<f32>;

@compute @workgroup_size({WORKGROUP_SIZE})
fn main(@builtin(global_invocation_id) id: vec3<u32>) {{
    var x = f32(id.x % 1024u) * 0.001;
    for (var i = 0u; i < {OPS_PER_THREAD}u; i = i + 1u) {{
        x = sin(x) * cos(x) + sqrt(x + 1.0);
    }}
    output[id.x] = x;
}}
"
    )
}

/// Starts the GPU runner on one background thread. The device is acquired on that thread, so the
/// caller never waits for driver initialization.
pub(crate) fn spawn_gpu(state: Arc<RunState>, api: ComputeApiFacade) -> io::Result<Task<u64>> {
    Task::spawn("reflex-gpu", move || {
        let Some(counter) = state.counter(0) else {
            warn!("GPU run was set up without a counter");
            return 0;
        };

        run_gpu(&api, counter, &state.stop_condition())
    })
}

/// Dispatches batches until the run is cancelled or its deadline passes.
///
/// Returns the number of kernel iterations in all batches the device completed. If no device can
/// be acquired, the run is scored as zero operations. The device and everything created on it is
/// released on every return path.
pub(crate) fn run_gpu(
    api: &impl ComputeApi,
    counter: &PaddedCounter,
    stop: &StopCondition<'_>,
) -> u64 {
    let mut device = match api.acquire_device() {
        Ok(device) => device,
        Err(e) => {
            warn!(error = %e, "GPU is unavailable, scoring this run as zero");
            counter.publish(0);
            return 0;
        }
    };

    debug!(?device, "GPU runner started");

    let ops_per_batch = device.ops_per_batch();
    let mut ops = 0_u64;

    loop {
        let submitted = Instant::now();
        device.submit_batch();

        // Spin on the non-blocking fence check. Only cancellation interrupts an in-flight batch,
        // which is then never counted. The deadline is evaluated at the batch boundary below.
        loop {
            match device.poll_batch() {
                Ok(true) => break,
                Ok(false) if stop.is_cancelled() => {
                    trace!(ops, "GPU runner abandoned an in-flight batch");
                    counter.publish(ops);
                    return ops;
                }
                Ok(false) => hint::spin_loop(),
                Err(e) => {
                    warn!(error = %e, ops, "GPU device failed mid-run, keeping completed batches");
                    counter.publish(ops);
                    return ops;
                }
            }
        }

        GPU_BATCH_SYNC_MS.with(|e| e.observe_millis(submitted.elapsed()));

        ops = ops.saturating_add(ops_per_batch);
        counter.publish(ops);

        match stop.check() {
            Checkpoint::Continue => {}
            Checkpoint::Cancelled => {
                trace!(ops, "GPU runner observed cancellation");
                return ops;
            }
            Checkpoint::DeadlineReached => break,
        }
    }

    debug!(ops, "GPU runner exiting");

    counter.publish(ops);
    ops
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    fn failing_api() -> MockComputeApi {
        let mut api = MockComputeApi::new();
        api.expect_acquire_device()
            .returning(|| Err(GpuError::KernelCompilation("no such builtin".to_string())));
        api
    }

    /// A device whose every batch completes on the second poll.
    fn completing_device(ops_per_batch: u64) -> MockComputeDevice {
        let polls = Arc::new(AtomicUsize::new(0));

        let mut device = MockComputeDevice::new();
        device.expect_ops_per_batch().return_const(ops_per_batch);
        device.expect_submit_batch().return_const(());
        device.expect_poll_batch().returning(move || {
            Ok(polls.fetch_add(1, Ordering::Relaxed) % 2 == 1)
        });
        device
    }

    fn api_with(device: MockComputeDevice) -> MockComputeApi {
        let mut api = MockComputeApi::new();
        api.expect_acquire_device().return_once(move || Ok(device));
        api
    }

    #[test]
    fn batch_constants_are_consistent() {
        let product = u64::from(WORKGROUPS_PER_DISPATCH)
            * u64::from(WORKGROUP_SIZE)
            * u64::from(OPS_PER_THREAD)
            * u64::from(DISPATCHES_PER_BATCH);

        assert_eq!(OPS_PER_BATCH, product);
        assert_eq!(
            OUTPUT_BUFFER_SIZE,
            u64::from(WORKGROUPS_PER_DISPATCH) * u64::from(WORKGROUP_SIZE) * 4
        );
    }

    #[test]
    fn kernel_source_uses_shared_constants() {
        let source = kernel_source();

        assert!(source.contains("@workgroup_size(256)"));
        assert!(source.contains("i < 64u"));
        assert!(source.contains("sin(x) * cos(x) + sqrt(x + 1.0)"));
        assert!(source.contains("output[id.x] = x;"));
    }

    #[test]
    fn acquisition_failure_scores_zero() {
        let cancel = AtomicBool::new(false);
        let counter = PaddedCounter::new();
        counter.publish(123);
        let stop = StopCondition::new(&cancel, Instant::now(), Duration::from_secs(60));

        let ops = run_gpu(&failing_api(), &counter, &stop);

        assert_eq!(ops, 0);
        assert_eq!(counter.load(), 0);
    }

    #[test]
    fn counts_completed_batch_before_deadline_stop() {
        let cancel = AtomicBool::new(false);
        let counter = PaddedCounter::new();
        // Deadline already passed: the first completed batch is also the last.
        let started = Instant::now().checked_sub(Duration::from_secs(1)).unwrap();
        let stop = StopCondition::new(&cancel, started, Duration::from_millis(10));

        let mut device = MockComputeDevice::new();
        device.expect_ops_per_batch().return_const(1_000_u64);
        device.expect_submit_batch().times(1).return_const(());
        device.expect_poll_batch().times(1).returning(|| Ok(true));

        let ops = run_gpu(&api_with(device), &counter, &stop);

        assert_eq!(ops, 1_000);
        assert_eq!(counter.load(), 1_000);
    }

    #[test]
    fn accumulates_batches_until_deadline() {
        let cancel = AtomicBool::new(false);
        let counter = PaddedCounter::new();
        let stop = StopCondition::new(&cancel, Instant::now(), Duration::from_millis(20));

        let ops = run_gpu(&api_with(completing_device(500)), &counter, &stop);

        assert!(ops >= 500);
        assert_eq!(ops % 500, 0);
        assert_eq!(counter.load(), ops);
    }

    #[test]
    fn batch_finishing_past_deadline_is_counted() {
        let cancel = AtomicBool::new(false);
        let counter = PaddedCounter::new();
        let started = Instant::now();
        let stop = StopCondition::new(&cancel, started, Duration::from_millis(10));

        // The only batch signals well after the deadline has passed.
        let mut device = MockComputeDevice::new();
        device.expect_ops_per_batch().return_const(1_000_u64);
        device.expect_submit_batch().times(1).return_const(());
        device
            .expect_poll_batch()
            .returning(move || Ok(started.elapsed() >= Duration::from_millis(30)));

        let ops = run_gpu(&api_with(device), &counter, &stop);

        assert_eq!(ops, 1_000);
        assert_eq!(counter.load(), 1_000);
    }

    #[test]
    fn cancellation_abandons_in_flight_batch() {
        let cancel = AtomicBool::new(true);
        let counter = PaddedCounter::new();
        let stop = StopCondition::new(&cancel, Instant::now(), Duration::from_secs(60));

        let mut device = MockComputeDevice::new();
        device.expect_ops_per_batch().return_const(1_000_u64);
        device.expect_submit_batch().times(1).return_const(());
        device.expect_poll_batch().returning(|| Ok(false));

        let ops = run_gpu(&api_with(device), &counter, &stop);

        assert_eq!(ops, 0);
        assert_eq!(counter.load(), 0);
    }

    #[test]
    fn device_failure_keeps_completed_batches() {
        let cancel = AtomicBool::new(false);
        let counter = PaddedCounter::new();
        let stop = StopCondition::new(&cancel, Instant::now(), Duration::from_secs(60));

        let polls = AtomicUsize::new(0);
        let mut device = MockComputeDevice::new();
        device.expect_ops_per_batch().return_const(250_u64);
        device.expect_submit_batch().times(2).return_const(());
        device.expect_poll_batch().returning(move || {
            if polls.fetch_add(1, Ordering::Relaxed) == 0 {
                Ok(true)
            } else {
                Err(GpuError::KernelCompilation("device lost".to_string()))
            }
        });

        let ops = run_gpu(&api_with(device), &counter, &stop);

        assert_eq!(ops, 250);
        assert_eq!(counter.load(), 250);
    }

    #[test]
    fn facade_forwards_to_mock() {
        let facade = ComputeApiFacade::from_mock(api_with(completing_device(7)));

        let mut device = facade.acquire_device().unwrap();

        assert_eq!(device.ops_per_batch(), 7);
        device.submit_batch();
        assert!(!device.poll_batch().unwrap());
        assert!(device.poll_batch().unwrap());
    }

    #[cfg_attr(miri, ignore)] // Spawns real threads.
    #[test]
    fn spawned_runner_with_failing_device_completes_with_zero() {
        let state = Arc::new(RunState::new(1, Duration::from_secs(60)));
        let api = ComputeApiFacade::from_mock(failing_api());

        let task = spawn_gpu(Arc::clone(&state), api).unwrap();

        assert!(matches!(
            task.join_timeout(Duration::from_secs(5)),
            crate::JoinOutcome::Completed(0)
        ));
        assert_eq!(state.live_ops(), 0);
    }
}
