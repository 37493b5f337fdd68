//! Deferred invocations for cross-thread delivery.
//!
//! A [`QueuedInvocation`] wraps a closure so that it can be handed to an
//! execution context and run later on that context's thread. Blocking
//! delivery pairs an invocation with a [`CompletionHandle`]; the posting
//! thread holds the matching [`CompletionWaiter`] and parks on it until the
//! context has run (or discarded) the invocation.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// A type-erased invocation that can be executed later.
pub struct QueuedInvocation {
    /// The actual invocation closure.
    invoke: Box<dyn FnOnce() + Send>,
    /// Optional completion notifier for blocking delivery.
    completion: Option<CompletionHandle>,
}

impl QueuedInvocation {
    /// Create a new queued invocation.
    pub fn new<F>(invoke: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            invoke: Box::new(invoke),
            completion: None,
        }
    }

    /// Create a new queued invocation with a completion handle for blocking.
    pub fn with_completion<F>(invoke: F, completion: CompletionHandle) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            invoke: Box::new(invoke),
            completion: Some(completion),
        }
    }

    /// Execute the invocation.
    pub fn execute(self) {
        (self.invoke)();
        if let Some(completion) = self.completion {
            completion.signal_done(true);
        }
    }
}

impl std::fmt::Debug for QueuedInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedInvocation")
            .field("blocking", &self.completion.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct CompletionState {
    /// `None` while pending, `Some(ran)` once settled.
    outcome: Mutex<Option<bool>>,
    condvar: Condvar,
}

/// Signals completion of a blocking invocation.
///
/// Dropping the handle without executing the invocation (for example when a
/// dispatcher discards its queue on shutdown) releases the waiter too, so a
/// blocked producer never hangs on work that will not run.
pub struct CompletionHandle {
    inner: Option<Arc<CompletionState>>,
}

impl CompletionHandle {
    fn signal_done(mut self, ran: bool) {
        if let Some(state) = self.inner.take() {
            *state.outcome.lock() = Some(ran);
            state.condvar.notify_all();
        }
    }
}

impl Drop for CompletionHandle {
    fn drop(&mut self) {
        if let Some(state) = self.inner.take() {
            *state.outcome.lock() = Some(false);
            state.condvar.notify_all();
        }
    }
}

/// Waits for a blocking invocation to complete.
pub struct CompletionWaiter {
    inner: Arc<CompletionState>,
}

impl CompletionWaiter {
    /// Block until the invocation has run or been discarded.
    ///
    /// Returns `true` if the invocation ran.
    ///
    /// # Warning
    ///
    /// Waiting on the very thread that is supposed to run the invocation
    /// deadlocks.
    pub fn wait(self) -> bool {
        let mut outcome = self.inner.outcome.lock();
        loop {
            if let Some(ran) = *outcome {
                return ran;
            }
            self.inner.condvar.wait(&mut outcome);
        }
    }
}

/// Create a completion handle/waiter pair for blocking invocations.
pub fn completion_pair() -> (CompletionHandle, CompletionWaiter) {
    let state = Arc::new(CompletionState::default());
    (
        CompletionHandle {
            inner: Some(state.clone()),
        },
        CompletionWaiter { inner: state },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn test_execute() {
        let executed = Arc::new(AtomicBool::new(false));
        let executed_clone = executed.clone();
        let invocation = QueuedInvocation::new(move || {
            executed_clone.store(true, Ordering::SeqCst);
        });

        invocation.execute();
        assert!(executed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_completion_with_invocation() {
        let executed = Arc::new(AtomicBool::new(false));
        let (handle, waiter) = completion_pair();

        let executed_clone = executed.clone();
        let invocation = QueuedInvocation::with_completion(
            move || {
                executed_clone.store(true, Ordering::SeqCst);
            },
            handle,
        );

        let thread = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            invocation.execute();
        });

        assert!(waiter.wait());
        thread.join().unwrap();
        assert!(executed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_dropped_invocation_releases_waiter() {
        let (handle, waiter) = completion_pair();
        let invocation = QueuedInvocation::with_completion(|| {}, handle);

        let thread = std::thread::spawn(move || drop(invocation));

        assert!(!waiter.wait());
        thread.join().unwrap();
    }
}
