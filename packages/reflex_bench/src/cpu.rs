//! CPU runners: the single-core runner and the multi-core workers with their coordinator.

use std::hint::black_box;
use std::io;
use std::mem;
use std::num::NonZero;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use many_cpus::{Processor, ProcessorSet};
use tracing::{debug, error, trace, warn};

use crate::metrics::CHECKPOINT_INTERVAL_US;
use crate::{
    Checkpoint, JoinOutcome, PaddedCounter, RunState, StopCondition, Task, describe_panic, kernel,
};

/// Kernel calls between two checkpoints. At each checkpoint a worker publishes its count and
/// evaluates cancellation and the deadline.
pub(crate) const CHECKPOINT_INTERVAL: u64 = 65_536;

/// Worker threads of a multi-core run, shared by the coordinator and a cancelling session.
///
/// Whoever takes a worker out of the pending list owns joining it.
#[derive(Debug)]
pub(crate) struct ResidualWorkers {
    pending: Mutex<Vec<Task<WorkerReport>>>,

    /// Workers the coordinator has joined, including ones that panicked.
    joined_by_coordinator: AtomicUsize,
}

impl ResidualWorkers {
    fn new(workers: Vec<Task<WorkerReport>>) -> Self {
        Self {
            pending: Mutex::new(workers),
            joined_by_coordinator: AtomicUsize::new(0),
        }
    }

    fn take_next(&self) -> Option<Task<WorkerReport>> {
        lock(&self.pending).pop()
    }

    /// Empties the pending list. The lock is released before the caller joins anything.
    pub(crate) fn take_all(&self) -> Vec<Task<WorkerReport>> {
        mem::take(&mut *lock(&self.pending))
    }

    pub(crate) fn joined_by_coordinator(&self) -> usize {
        self.joined_by_coordinator.load(Ordering::Acquire)
    }
}

/// Final report of one multi-core worker.
#[derive(Clone, Copy, Debug)]
pub(crate) struct WorkerReport {
    slot: usize,
    ops: u64,
}

/// Runs the workload kernel until the run is cancelled or its deadline passes.
///
/// Returns the final operation count, which is also the last value published to `counter`.
pub(crate) fn run_worker(counter: &PaddedCounter, stop: &StopCondition<'_>) -> u64 {
    let mut ops = 0_u64;
    let mut last_checkpoint = Instant::now();

    loop {
        black_box(kernel::run_interval(ops, CHECKPOINT_INTERVAL));
        ops = ops.saturating_add(CHECKPOINT_INTERVAL);

        counter.publish(ops);

        let now = Instant::now();
        let interval = now.saturating_duration_since(last_checkpoint);
        CHECKPOINT_INTERVAL_US.with(|e| e.observe(interval.as_micros()));
        last_checkpoint = now;

        match stop.check() {
            Checkpoint::Continue => {}
            Checkpoint::Cancelled => {
                trace!(ops, "worker observed cancellation");
                return ops;
            }
            Checkpoint::DeadlineReached => break,
        }
    }

    counter.publish(ops);
    ops
}

/// Starts the single-core runner on one background thread.
pub(crate) fn spawn_single_core(state: Arc<RunState>) -> io::Result<Task<u64>> {
    Task::spawn("reflex-single-core", move || {
        let Some(counter) = state.counter(0) else {
            error!("single-core run was set up without a counter");
            return 0;
        };

        debug!("single-core worker started");
        let ops = run_worker(counter, &state.stop_condition());
        debug!(ops, "single-core worker exiting");

        ops
    })
}

/// Picks the processors for a multi-core run: every processor available to this process, up to
/// `max_workers`.
#[cfg_attr(test, mutants::skip)] // Result depends entirely on the machine running the test.
pub(crate) fn select_processors(max_workers: NonZero<usize>) -> ProcessorSet {
    let available = ProcessorSet::default();
    let count = available.len().min(max_workers.get());

    NonZero::new(count)
        .and_then(|count| ProcessorSet::builder().take(count))
        .unwrap_or(available)
}

/// A started multi-core run.
#[derive(Debug)]
pub(crate) struct MultiCoreRun {
    pub(crate) coordinator: Task<u64>,
    pub(crate) residual_workers: Arc<ResidualWorkers>,
}

/// Starts one worker per processor in `processors`, each pinned to its processor and writing to
/// its own counter, plus a coordinator that joins them all and returns the aggregate count.
///
/// `state` must have exactly one counter per processor.
pub(crate) fn spawn_multi_core(
    state: &Arc<RunState>,
    processors: &ProcessorSet,
) -> io::Result<MultiCoreRun> {
    debug_assert_eq!(state.worker_count(), processors.len());

    // Workers claim their counter slot when they start; the order does not matter as long as
    // every slot has exactly one writer.
    let next_slot = Arc::new(AtomicUsize::new(0));

    let entrypoint = {
        let state = Arc::clone(state);
        let next_slot = Arc::clone(&next_slot);

        move |processor: Processor| {
            let slot = next_slot.fetch_add(1, Ordering::Relaxed);

            let Some(counter) = state.counter(slot) else {
                error!(slot, "multi-core worker has no counter slot");
                return WorkerReport { slot, ops: 0 };
            };

            debug!(worker = slot, processor = processor.id(), "multi-core worker started");
            let ops = run_worker(counter, &state.stop_condition());
            debug!(worker = slot, ops, "multi-core worker exiting");

            WorkerReport { slot, ops }
        }
    };

    let handles = contain_spawn_panic(state, || processors.spawn_threads(entrypoint))?;

    let workers: Vec<_> = handles
        .into_vec()
        .into_iter()
        .enumerate()
        .map(|(index, handle)| Task::from_handle(format!("reflex-worker-{index}"), handle))
        .collect();

    let residual_workers = Arc::new(ResidualWorkers::new(workers));

    let coordinator = Task::spawn("reflex-coordinator", {
        let state = Arc::clone(state);
        let residual_workers = Arc::clone(&residual_workers);

        move || coordinate(&state, &residual_workers)
    });

    match coordinator {
        Ok(coordinator) => Ok(MultiCoreRun {
            coordinator,
            residual_workers,
        }),
        Err(e) => {
            // Without a coordinator nobody would join the workers, so stop them here.
            state.request_cancel();

            for worker in residual_workers.take_all() {
                drop(worker.join());
            }

            Err(e)
        }
    }
}

/// Joins every worker, then sums their counters.
///
/// A counter is only read after its writer has been joined, so each value read is final.
fn coordinate(state: &RunState, residual_workers: &ResidualWorkers) -> u64 {
    let mut aggregate = 0_u64;

    // Take one worker at a time so a cancelling session can still reach the ones not yet taken.
    // The lock must not be held while joining.
    loop {
        let Some(worker) = residual_workers.take_next() else {
            break;
        };

        let name = worker.name().to_string();

        match worker.join() {
            JoinOutcome::Completed(report) => {
                let final_count = state.counter(report.slot).map_or(0, PaddedCounter::load);
                debug_assert_eq!(final_count, report.ops);

                aggregate = aggregate.saturating_add(final_count);
            }
            JoinOutcome::Panicked(message) => {
                error!(
                    worker = %name,
                    panic = %message,
                    "multi-core worker panicked, counting zero ops"
                );
            }
            JoinOutcome::TimedOut => continue,
        }

        residual_workers
            .joined_by_coordinator
            .fetch_add(1, Ordering::Release);
    }

    debug!(
        joined = residual_workers.joined_by_coordinator(),
        aggregate,
        "coordinator aggregated worker counters"
    );

    aggregate
}

/// Runs a spawning closure that reports OS refusal by panicking (as `many_cpus` does) and turns
/// the panic into an error. Threads that did start before the failure are told to stop.
fn contain_spawn_panic<T>(state: &RunState, spawn: impl FnOnce() -> T) -> io::Result<T> {
    panic::catch_unwind(AssertUnwindSafe(spawn)).map_err(|payload| {
        state.request_cancel();

        let message = describe_panic(payload.as_ref());
        warn!(%message, "failed to start multi-core workers");

        io::Error::other(message)
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // The guarded data is a plain list of handles that stays consistent even if a holder panicked.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
