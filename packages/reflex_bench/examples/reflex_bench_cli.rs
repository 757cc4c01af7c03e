//! Runs one benchmark from the terminal, printing progress like a UI frame loop would, then
//! records the score and shows the recent history for the strategy.
//!
//! ```text
//! cargo run --example reflex_bench_cli -- --strategy multi-core --duration-secs 5
//! RUST_LOG=reflex_bench=debug cargo run --example reflex_bench_cli -- --strategy gpu
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use argh::FromArgs;
use reflex_bench::{BenchmarkSession, HistoryStore, Strategy};
use tracing_subscriber::EnvFilter;

/// Measures sustained floating-point throughput.
#[derive(FromArgs)]
struct Args {
    /// strategy to run (single-core, multi-core, gpu)
    #[argh(option, default = "Strategy::SingleCore")]
    strategy: Strategy,

    /// measurement window in seconds
    #[argh(option, default = "10")]
    duration_secs: u64,

    /// cancel the run after this many milliseconds
    #[argh(option)]
    cancel_after_ms: Option<u64>,

    /// history file to append the score to
    #[argh(option, default = "PathBuf::from(\"benchmark_history.txt\")")]
    history: PathBuf,

    /// print engine metrics after the run
    #[argh(switch)]
    metrics: bool,
}

const FRAME: Duration = Duration::from_millis(250);

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Args = argh::from_env();

    if args.duration_secs == 0 {
        eprintln!("--duration-secs must be at least 1");
        return ExitCode::FAILURE;
    }

    let mut session = BenchmarkSession::builder()
        .duration(Duration::from_secs(args.duration_secs))
        .build();

    if let Err(e) = session.start(args.strategy) {
        eprintln!("cannot start benchmark: {e}");
        return ExitCode::FAILURE;
    }

    let started = Instant::now();
    let cancel_after = args.cancel_after_ms.map(Duration::from_millis);

    while !session.is_done() {
        if cancel_after.is_some_and(|limit| started.elapsed() >= limit) {
            let summary = session.cancel();
            println!(
                "cancelled ({} threads joined, {} detached)",
                summary.joined(),
                summary.detached()
            );
            return ExitCode::SUCCESS;
        }

        let progress = session.progress();
        println!(
            "{:>5.1}%  {:>14} ops  {} workers",
            progress.fraction_complete() * 100.0,
            progress.live_ops(),
            progress.worker_count()
        );

        thread::sleep(FRAME);
    }

    let Some(score) = session.take_result() else {
        eprintln!("benchmark finished without a score");
        return ExitCode::FAILURE;
    };

    println!("{score}");

    let history = HistoryStore::new(args.history);
    history.append_now(score.strategy(), score.mops_per_second());

    println!("recent {} scores:", score.strategy());
    for entry in history.load(score.strategy()) {
        println!("  {}  {:>10.2}", entry.timestamp_label(), entry.score());
    }

    if args.metrics {
        println!("{}", nm::Report::collect());
    }

    ExitCode::SUCCESS
}
