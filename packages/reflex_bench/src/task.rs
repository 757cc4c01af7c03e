//! Background threads with bounded joins.

use std::any::Any;
use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often a bounded join re-checks whether the thread has finished.
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Result of waiting for a [`Task`].
#[derive(Debug)]
pub(crate) enum JoinOutcome<R> {
    Completed(R),

    /// The thread is still running. Its handle has been released and the thread is detached.
    TimedOut,

    /// The thread panicked; the payload is rendered as text.
    Panicked(String),
}

/// A named background thread whose result can be collected with or without a time bound.
#[derive(Debug)]
pub(crate) struct Task<R> {
    name: String,
    handle: JoinHandle<R>,
}

impl<R> Task<R>
where
    R: Send + 'static,
{
    pub(crate) fn spawn<F>(name: impl Into<String>, f: F) -> io::Result<Self>
    where
        F: FnOnce() -> R + Send + 'static,
    {
        let name = name.into();
        let handle = thread::Builder::new().name(name.clone()).spawn(f)?;

        Ok(Self { name, handle })
    }

    /// Adopts a thread spawned elsewhere (e.g. pinned to a processor by `many_cpus`).
    pub(crate) fn from_handle(name: impl Into<String>, handle: JoinHandle<R>) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the thread without a bound. Only for callers that know the thread will exit on
    /// its own, e.g. a worker that self-terminates at its deadline.
    pub(crate) fn join(self) -> JoinOutcome<R> {
        match self.handle.join() {
            Ok(value) => JoinOutcome::Completed(value),
            Err(payload) => JoinOutcome::Panicked(describe_panic(payload.as_ref())),
        }
    }

    /// Waits up to `timeout` for the thread to finish.
    ///
    /// A thread that does not finish in time is not stopped. Its handle is dropped, which detaches
    /// the thread; it keeps running until it returns on its own.
    pub(crate) fn join_timeout(self, timeout: Duration) -> JoinOutcome<R> {
        let deadline = Instant::now().checked_add(timeout);

        while !self.handle.is_finished() {
            match deadline {
                Some(deadline) if Instant::now() < deadline => thread::sleep(JOIN_POLL_INTERVAL),
                // Overflowing deadline means "effectively forever".
                None => thread::sleep(JOIN_POLL_INTERVAL),
                Some(_) => return JoinOutcome::TimedOut,
            }
        }

        self.join()
    }
}

pub(crate) fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[cfg_attr(miri, ignore)] // Miri is too slow for timing-based tests.
    #[test]
    fn join_returns_value() {
        let task = Task::spawn("test-value", || 42).unwrap();
        assert_eq!(task.name(), "test-value");

        assert!(matches!(task.join(), JoinOutcome::Completed(42)));
    }

    #[cfg_attr(miri, ignore)] // Miri is too slow for timing-based tests.
    #[test]
    fn join_timeout_returns_value_of_fast_thread() {
        let task = Task::spawn("test-fast", || "done").unwrap();

        assert!(matches!(
            task.join_timeout(Duration::from_secs(5)),
            JoinOutcome::Completed("done")
        ));
    }

    #[cfg_attr(miri, ignore)] // Miri is too slow for timing-based tests.
    #[test]
    fn join_timeout_gives_up_on_stuck_thread() {
        let release = Arc::new(AtomicBool::new(false));

        let task = Task::spawn("test-stuck", {
            let release = Arc::clone(&release);
            move || {
                while !release.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_millis(1));
                }
            }
        })
        .unwrap();

        let started = Instant::now();
        assert!(matches!(
            task.join_timeout(Duration::from_millis(50)),
            JoinOutcome::TimedOut
        ));
        assert!(started.elapsed() >= Duration::from_millis(50));

        // Let the detached thread exit so it does not outlive the test binary needlessly.
        release.store(true, Ordering::Release);
    }

    #[cfg_attr(miri, ignore)] // Miri is too slow for timing-based tests.
    #[test]
    fn panics_are_reported_not_propagated() {
        let task = Task::<()>::spawn("test-panic", || panic!("worker exploded")).unwrap();

        match task.join_timeout(Duration::from_secs(5)) {
            JoinOutcome::Panicked(message) => assert_eq!(message, "worker exploded"),
            other => panic!("expected panic outcome, got {other:?}"),
        }
    }

    #[cfg_attr(miri, ignore)] // Miri is too slow for timing-based tests.
    #[test]
    fn adopted_handle_behaves_like_spawned_task() {
        let handle = thread::spawn(|| 7_u64);
        let task = Task::from_handle("adopted", handle);

        assert!(matches!(task.join(), JoinOutcome::Completed(7)));
    }

    #[test]
    fn describes_string_payloads() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn Any + Send> = Box::new("borrowed");
        let other: Box<dyn Any + Send> = Box::new(17_u32);

        assert_eq!(describe_panic(owned.as_ref()), "owned");
        assert_eq!(describe_panic(borrowed.as_ref()), "borrowed");
        assert_eq!(describe_panic(other.as_ref()), "unknown panic payload");
    }
}
