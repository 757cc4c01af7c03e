#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Sustained floating-point throughput benchmark for interactive apps.
//!
//! A [`BenchmarkSession`] runs a fixed transcendental workload for a fixed duration with one of
//! three [`Strategy`] choices and reports the throughput as a [`Score`] in millions of operations
//! per second:
//!
//! * [`Strategy::SingleCore`] runs one worker thread.
//! * [`Strategy::MultiCore`] runs one worker per available processor, each pinned to its
//!   processor and counting into its own cache line.
//! * [`Strategy::Gpu`] dispatches the same kernel to a compute device in batches.
//!
//! All load generation happens on background threads. The session is driven from a UI loop that
//! polls [`BenchmarkSession::progress()`] and [`BenchmarkSession::is_done()`] every frame without
//! ever blocking on the workers.
//!
//! Scores can be persisted with a [`HistoryStore`], an append-only text file of recent results
//! per strategy.
//!
//! # Quick start
//!
//! ```no_run
//! use std::thread;
//! use std::time::Duration;
//!
//! use reflex_bench::{BenchmarkSession, HistoryStore, Strategy};
//!
//! let mut session = BenchmarkSession::new();
//! session.start(Strategy::SingleCore).unwrap();
//!
//! while !session.is_done() {
//!     thread::sleep(Duration::from_millis(16));
//! }
//!
//! let score = session.take_result().unwrap();
//!
//! let history = HistoryStore::new("benchmark_history.txt");
//! history.append_now(score.strategy(), score.mops_per_second());
//! ```
//!
//! # Cancellation
//!
//! [`BenchmarkSession::cancel()`] asks every worker to stop at its next checkpoint and waits a
//! bounded time for them. Workers check in every few milliseconds, so cancellation is normally
//! immediate. A thread that misses its grace timeout is detached rather than waited for, and it
//! can never write into a later run.
//!
//! # GPU availability
//!
//! If no compute device can be acquired or the kernel fails to compile, a GPU run completes with
//! zero operations instead of failing.

mod cpu;
mod error;
mod gpu;
mod history;
mod kernel;
mod metrics;
mod padded_counter;
mod progress;
mod run_state;
mod score;
mod session;
mod stop;
mod strategy;
mod task;

pub use error::*;
pub use history::*;
pub use kernel::workload_kernel;
pub(crate) use padded_counter::PaddedCounter;
pub use progress::*;
pub(crate) use run_state::RunState;
pub use score::*;
pub use session::*;
pub(crate) use stop::*;
pub use strategy::*;
pub(crate) use task::*;
