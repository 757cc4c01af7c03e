use std::num::NonZero;
use std::sync::Arc;
use std::time::{Duration, Instant};

use new_zealand::nz;
use tracing::{debug, error, warn};

use crate::cpu::{self, ResidualWorkers};
use crate::gpu::{self, ComputeApiFacade};
use crate::metrics::CANCEL_JOIN_MS;
use crate::{Error, JoinOutcome, Progress, RunState, Score, Status, Strategy, Task};

const DEFAULT_DURATION: Duration = Duration::from_secs(10);
const DEFAULT_MAX_WORKERS: NonZero<usize> = nz!(64);
const DEFAULT_CANCEL_GRACE: Duration = Duration::from_millis(2_000);
const DEFAULT_RESIDUAL_GRACE: Duration = Duration::from_millis(500);

/// Owns at most one benchmark run at a time and reports on it to a UI thread.
///
/// All methods are non-blocking except [`cancel()`][Self::cancel], which waits a bounded time for
/// the run's threads to exit. Poll [`progress()`][Self::progress] and [`is_done()`][Self::is_done]
/// once per frame, then collect the score with [`take_result()`][Self::take_result].
///
/// Dropping a session with a run in progress cancels the run.
///
/// # Example
///
/// ```no_run
/// use std::thread;
/// use std::time::Duration;
///
/// use reflex_bench::{BenchmarkSession, Strategy};
///
/// let mut session = BenchmarkSession::builder()
///     .duration(Duration::from_secs(2))
///     .build();
///
/// session.start(Strategy::MultiCore).unwrap();
///
/// while !session.is_done() {
///     let progress = session.progress();
///     println!("{:.0}% ({} ops)", progress.fraction_complete() * 100.0, progress.live_ops());
///     thread::sleep(Duration::from_millis(100));
/// }
///
/// let score = session.take_result().unwrap();
/// println!("{score}");
/// ```
#[derive(Debug)]
pub struct BenchmarkSession {
    config: SessionBuilder,
    status: Status,
    run: Option<ActiveRun>,
    result: Option<Score>,
}

/// The threads and shared state of the run in progress.
#[derive(Debug)]
struct ActiveRun {
    strategy: Strategy,
    state: Arc<RunState>,

    /// The thread whose exit marks the end of the run: the runner itself, or the coordinator of
    /// a multi-core run.
    primary: Task<u64>,

    /// Multi-core workers, joined by the coordinator or, on cancellation, by the session.
    residual_workers: Option<Arc<ResidualWorkers>>,
}

/// What a cancellation managed to clean up.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CancelSummary {
    joined: usize,
    detached: usize,
}

impl CancelSummary {
    /// Threads of the run known to have exited: those joined within their grace timeout, plus the
    /// multi-core workers the coordinator had already joined.
    #[must_use]
    pub fn joined(&self) -> usize {
        self.joined
    }

    /// Threads that were still running after their grace timeout and were abandoned. They exit on
    /// their own at their next checkpoint and never touch a later run.
    #[must_use]
    pub fn detached(&self) -> usize {
        self.detached
    }

    fn record<R>(&mut self, name: &str, outcome: &JoinOutcome<R>) {
        match outcome {
            JoinOutcome::Completed(_) => {
                self.joined = self.joined.saturating_add(1);
            }
            JoinOutcome::Panicked(message) => {
                error!(
                    thread = name,
                    panic = %message,
                    "benchmark thread panicked before cancellation"
                );
                self.joined = self.joined.saturating_add(1);
            }
            JoinOutcome::TimedOut => {
                warn!(thread = name, "benchmark thread did not exit in time, detaching it");
                self.detached = self.detached.saturating_add(1);
            }
        }
    }
}

impl BenchmarkSession {
    /// Creates a session with default settings.
    ///
    /// Use [`BenchmarkSession::builder()`] for custom configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for configuring the session.
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Starts a run of `strategy` on background threads and returns immediately.
    ///
    /// Any result from a previous run that was not taken is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] if a run is in progress and [`Error::ThreadSpawn`] if the
    /// operating system refuses to start a thread. On error the session is unchanged.
    pub fn start(&mut self, strategy: Strategy) -> Result<(), Error> {
        if let Some(run) = &self.run {
            debug!(requested = %strategy, running = %run.strategy, "rejected start while running");
            return Err(Error::AlreadyRunning {
                running: run.strategy,
            });
        }

        let run = self.launch(strategy)?;

        debug!(
            %strategy,
            workers = run.state.worker_count(),
            duration_ms = run.state.duration().as_millis(),
            "benchmark run started"
        );

        self.result = None;
        self.status = Status::Running;
        self.run = Some(run);

        Ok(())
    }

    fn launch(&self, strategy: Strategy) -> Result<ActiveRun, Error> {
        let duration = self.config.duration;

        let run = match strategy {
            Strategy::SingleCore => {
                let state = Arc::new(RunState::new(1, duration));
                let primary = cpu::spawn_single_core(Arc::clone(&state))?;

                ActiveRun {
                    strategy,
                    state,
                    primary,
                    residual_workers: None,
                }
            }
            Strategy::MultiCore => {
                let processors = cpu::select_processors(self.config.max_workers);
                let state = Arc::new(RunState::new(processors.len(), duration));
                let started = cpu::spawn_multi_core(&state, &processors)?;

                ActiveRun {
                    strategy,
                    state,
                    primary: started.coordinator,
                    residual_workers: Some(started.residual_workers),
                }
            }
            Strategy::Gpu => {
                let state = Arc::new(RunState::new(1, duration));
                let primary = gpu::spawn_gpu(Arc::clone(&state), self.config.compute_api.clone())?;

                ActiveRun {
                    strategy,
                    state,
                    primary,
                    residual_workers: None,
                }
            }
        };

        Ok(run)
    }

    /// Advances the state machine: a run whose threads have all finished becomes
    /// [`Status::Completed`] with its score ready to take.
    ///
    /// Never blocks.
    pub fn poll(&mut self) -> Status {
        let finished = self
            .run
            .as_ref()
            .is_some_and(|run| run.primary.is_finished());

        if finished {
            if let Some(run) = self.run.take() {
                self.complete(run);
            }
        }

        self.status
    }

    fn complete(&mut self, run: ActiveRun) {
        let ActiveRun {
            strategy,
            state,
            primary,
            ..
        } = run;

        let ops = match primary.join() {
            JoinOutcome::Completed(ops) => ops,
            JoinOutcome::Panicked(message) => {
                error!(%strategy, panic = %message, "benchmark runner panicked, scoring as zero");
                0
            }
            // join() never times out.
            JoinOutcome::TimedOut => 0,
        };

        let score = Score::new(strategy, ops, state.worker_count(), state.duration());
        debug!(%strategy, ops, mops = score.mops_per_second(), "benchmark run completed");

        self.result = Some(score);
        self.status = Status::Completed;
    }

    /// Whether the last run has completed and its score is waiting to be taken.
    pub fn is_done(&mut self) -> bool {
        self.poll() == Status::Completed
    }

    /// The current lifecycle state, without advancing it.
    ///
    /// Use [`poll()`][Self::poll] to also observe a run that has just finished.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    /// The strategy of the run in progress, or of the completed run whose score is waiting.
    #[must_use]
    pub fn strategy(&self) -> Option<Strategy> {
        self.run
            .as_ref()
            .map(|run| run.strategy)
            .or_else(|| self.result.map(|score| score.strategy()))
    }

    /// The configured measurement window of every run.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.config.duration
    }

    /// A snapshot of the run in progress.
    ///
    /// Once a run has completed this reports its final totals. With no run, it is empty.
    #[must_use]
    pub fn progress(&self) -> Progress {
        if let Some(run) = &self.run {
            return Progress::new(
                run.state.started().elapsed(),
                run.state.duration(),
                run.state.live_ops(),
                run.state.worker_count(),
            );
        }

        match &self.result {
            Some(score) => Progress::new(
                score.nominal_duration(),
                score.nominal_duration(),
                score.ops(),
                score.worker_count(),
            ),
            None => Progress::new(Duration::ZERO, self.config.duration, 0, 0),
        }
    }

    /// Takes the score of the completed run, returning the session to [`Status::Idle`].
    ///
    /// Returns `None` unless the session is [`Status::Completed`], so a score is returned at most
    /// once.
    pub fn take_result(&mut self) -> Option<Score> {
        self.poll();

        let score = self.result.take()?;
        self.status = Status::Idle;

        Some(score)
    }

    /// Cancels the run in progress and waits a bounded time for its threads to exit.
    ///
    /// The primary runner thread gets the configured cancel grace and every multi-core worker not
    /// yet joined gets the residual grace. Threads still running after their grace are detached.
    /// Without a run in progress this does nothing and returns an empty summary.
    pub fn cancel(&mut self) -> CancelSummary {
        let Some(run) = self.run.take() else {
            return CancelSummary::default();
        };

        let cancel_started = Instant::now();
        run.state.request_cancel();

        let mut summary = CancelSummary::default();

        let primary_name = run.primary.name().to_string();
        let outcome = run.primary.join_timeout(self.config.cancel_grace);
        summary.record(&primary_name, &outcome);

        // Whatever the coordinator did not get to. Taken out of the shared list first so the lock
        // is not held while joining.
        if let Some(residual_workers) = run.residual_workers {
            for worker in residual_workers.take_all() {
                let name = worker.name().to_string();
                let outcome = worker.join_timeout(self.config.residual_grace);
                summary.record(&name, &outcome);
            }

            summary.joined = summary
                .joined
                .saturating_add(residual_workers.joined_by_coordinator());
        }

        let blocked_for = cancel_started.elapsed();
        CANCEL_JOIN_MS.with(|e| e.observe_millis(blocked_for));

        if summary.detached > 0 {
            warn!(
                strategy = %run.strategy,
                detached = summary.detached,
                blocked_ms = blocked_for.as_millis(),
                "benchmark cancelled with unresponsive threads left behind"
            );
        } else {
            debug!(
                strategy = %run.strategy,
                joined = summary.joined,
                blocked_ms = blocked_for.as_millis(),
                "benchmark cancelled"
            );
        }

        self.result = None;
        self.status = Status::Cancelled;

        summary
    }
}

impl Default for BenchmarkSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BenchmarkSession {
    fn drop(&mut self) {
        if self.run.is_some() {
            self.cancel();
        }
    }
}

/// Builder for configuring a [`BenchmarkSession`].
#[derive(Clone, Debug)]
pub struct SessionBuilder {
    duration: Duration,
    max_workers: NonZero<usize>,
    cancel_grace: Duration,
    residual_grace: Duration,
    compute_api: ComputeApiFacade,
}

impl SessionBuilder {
    fn new() -> Self {
        Self {
            duration: DEFAULT_DURATION,
            max_workers: DEFAULT_MAX_WORKERS,
            cancel_grace: DEFAULT_CANCEL_GRACE,
            residual_grace: DEFAULT_RESIDUAL_GRACE,
            compute_api: ComputeApiFacade::real(),
        }
    }

    /// Sets the measurement window of every run.
    ///
    /// Default is 10 seconds.
    ///
    /// # Panics
    ///
    /// Panics if `duration` is zero.
    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        assert!(!duration.is_zero(), "benchmark duration must be non-zero");

        self.duration = duration;
        self
    }

    /// Sets the maximum number of worker threads of a multi-core run.
    ///
    /// Default is 64.
    #[must_use]
    pub fn max_workers(mut self, max_workers: NonZero<usize>) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Sets how long [`BenchmarkSession::cancel()`] waits for the primary runner thread.
    ///
    /// Default is 2 seconds.
    #[must_use]
    pub fn cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    /// Sets how long [`BenchmarkSession::cancel()`] waits for each multi-core worker that the
    /// coordinator has not joined.
    ///
    /// Default is 500 milliseconds.
    #[must_use]
    pub fn residual_grace(mut self, grace: Duration) -> Self {
        self.residual_grace = grace;
        self
    }

    #[cfg(test)]
    pub(crate) fn compute_api(mut self, compute_api: ComputeApiFacade) -> Self {
        self.compute_api = compute_api;
        self
    }

    /// Builds an idle session with the configured settings.
    #[must_use]
    pub fn build(self) -> BenchmarkSession {
        BenchmarkSession {
            config: self,
            status: Status::Idle,
            run: None,
            result: None,
        }
    }
}
