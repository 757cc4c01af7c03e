use std::io;

use thiserror::Error;

use crate::Strategy;

/// Errors returned when starting a benchmark run.
///
/// In both cases the session is left exactly as it was before the call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A run is already in progress. Cancel it before starting another.
    #[error("a {running} benchmark is already running")]
    AlreadyRunning {
        /// The strategy of the run that is in progress.
        running: Strategy,
    },

    /// The operating system refused to start a benchmark thread.
    #[error("failed to start a benchmark thread")]
    ThreadSpawn(#[from] io::Error),
}
