//! Execution contexts and the thread-bound dispatcher.
//!
//! An [`ExecutionContext`] is a single logical owner of work, typically a UI
//! thread. Code running elsewhere hands work to it with
//! [`post`](ExecutionContext::post); code that may or may not already be on
//! the context uses [`invoke`](ExecutionContext::invoke), which runs inline
//! when possible.
//!
//! [`Dispatcher`] is the concrete context: a prioritized queue bound to the
//! thread that created it and drained by that thread. [`InlineContext`] is a
//! trivial context that treats every caller as current.
//!
//! # Example
//!
//! ```
//! use lattice_projection_core::{DispatchPriority, Dispatcher, ExecutionContext, QueuedInvocation};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let dispatcher = Dispatcher::for_current_thread();
//! let hits = Arc::new(AtomicUsize::new(0));
//!
//! let remote = dispatcher.clone();
//! let remote_hits = hits.clone();
//! std::thread::spawn(move || {
//!     remote
//!         .post(
//!             DispatchPriority::Normal,
//!             QueuedInvocation::new(move || {
//!                 remote_hits.fetch_add(1, Ordering::SeqCst);
//!             }),
//!         )
//!         .unwrap();
//! })
//! .join()
//! .unwrap();
//!
//! // Nothing runs until the owning thread drains the queue.
//! assert_eq!(hits.load(Ordering::SeqCst), 0);
//! assert_eq!(dispatcher.process_pending().unwrap(), 1);
//! assert_eq!(hits.load(Ordering::SeqCst), 1);
//! ```

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use parking_lot::Mutex;

use crate::error::{DispatchError, Result};
use crate::invocation::QueuedInvocation;
use crate::logging::targets;
use crate::priority::{DispatchPriority, PrioritizedWork};
use crate::thread_check::ThreadAffinity;

/// A single-owner execution context onto which work can be marshaled.
pub trait ExecutionContext: Send + Sync {
    /// Returns `true` if the caller is already running on this context.
    fn is_current(&self) -> bool;

    /// Schedule an invocation to run later on this context.
    ///
    /// Invocations posted at the same priority run in posting order.
    fn post(&self, priority: DispatchPriority, invocation: QueuedInvocation) -> Result<()>;

    /// Run the invocation now if on this context, otherwise post it.
    fn invoke(&self, priority: DispatchPriority, invocation: QueuedInvocation) -> Result<()> {
        if self.is_current() {
            invocation.execute();
            Ok(())
        } else {
            self.post(priority, invocation)
        }
    }
}

/// Default name given to dispatchers created without one.
const DEFAULT_NAME: &str = "lattice-dispatcher";

struct DispatcherInner {
    name: String,
    affinity: ThreadAffinity,
    /// Pending work, highest priority first.
    queue: Mutex<BinaryHeap<PrioritizedWork>>,
    /// Sequence counter for stable same-priority ordering.
    sequence: AtomicU64,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    shut_down: AtomicBool,
}

/// A prioritized work queue owned by one thread.
///
/// Any thread may [`post`](ExecutionContext::post) to a dispatcher; only the
/// owning thread may drain it, via [`process_pending`](Self::process_pending),
/// [`process_for`](Self::process_for) or [`run`](Self::run).
///
/// Cloning a `Dispatcher` yields another handle to the same queue.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

static_assertions::assert_impl_all!(Dispatcher: Send, Sync);

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.inner.name)
            .field("thread", &self.inner.affinity.thread_id())
            .field("pending", &self.pending_count())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher owned by the calling thread.
    pub fn for_current_thread() -> Self {
        Self::with_name(DEFAULT_NAME)
    }

    /// Create a named dispatcher owned by the calling thread.
    pub fn with_name(name: impl Into<String>) -> Self {
        let (wake_tx, wake_rx) = unbounded();
        let name = name.into();
        tracing::debug!(target: targets::DISPATCHER, name = %name, "dispatcher created");
        Self {
            inner: Arc::new(DispatcherInner {
                name,
                affinity: ThreadAffinity::current(),
                queue: Mutex::new(BinaryHeap::new()),
                sequence: AtomicU64::new(0),
                wake_tx,
                wake_rx,
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Spawn a dedicated thread that owns a new dispatcher and runs it until
    /// [`quit`](Self::quit) is called.
    pub fn spawn(name: impl Into<String>) -> std::io::Result<(Dispatcher, JoinHandle<()>)> {
        let name = name.into();
        let (ready_tx, ready_rx) = bounded(1);
        let thread_name = name.clone();
        let handle = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let dispatcher = Dispatcher::with_name(name);
                if ready_tx.send(dispatcher.clone()).is_err() {
                    return;
                }
                if let Err(err) = dispatcher.run() {
                    tracing::error!(target: targets::DISPATCHER, %err, "dispatcher loop failed");
                }
            })?;

        let dispatcher = ready_rx
            .recv()
            .map_err(|_| std::io::Error::other("dispatcher thread exited during startup"))?;
        Ok((dispatcher, handle))
    }

    /// The dispatcher's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The affinity of the owning thread.
    pub fn affinity(&self) -> ThreadAffinity {
        self.inner.affinity
    }

    /// Number of invocations waiting to run.
    pub fn pending_count(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Whether [`quit`](Self::quit) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Run every pending invocation, including work posted while draining.
    ///
    /// Returns the number of invocations executed.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::WrongThread`] when called from a thread other
    /// than the owner.
    pub fn process_pending(&self) -> Result<usize> {
        if !self.inner.affinity.is_same_thread() {
            return Err(DispatchError::WrongThread);
        }
        // Stale wake tokens carry no information once we are draining.
        while self.inner.wake_rx.try_recv().is_ok() {}

        let mut executed = 0;
        loop {
            // Release the queue lock before running so work may post more work.
            let next = self.inner.queue.lock().pop();
            match next {
                Some(work) => {
                    tracing::trace!(
                        target: targets::DISPATCHER,
                        priority = ?work.priority,
                        sequence = work.sequence,
                        "executing posted work"
                    );
                    work.invocation.execute();
                    executed += 1;
                }
                None => break,
            }
        }
        Ok(executed)
    }

    /// Wait up to `timeout` for work to arrive, then drain the queue.
    ///
    /// Returns the number of invocations executed.
    pub fn process_for(&self, timeout: Duration) -> Result<usize> {
        if !self.inner.affinity.is_same_thread() {
            return Err(DispatchError::WrongThread);
        }
        if self.inner.queue.lock().is_empty() {
            let _ = self.inner.wake_rx.recv_timeout(timeout);
        }
        self.process_pending()
    }

    /// Drain work as it arrives until [`quit`](Self::quit) is called.
    ///
    /// Work still queued at shutdown is discarded; blocking producers waiting
    /// on discarded work are released.
    pub fn run(&self) -> Result<()> {
        if !self.inner.affinity.is_same_thread() {
            return Err(DispatchError::WrongThread);
        }
        tracing::info!(target: targets::DISPATCHER, name = %self.inner.name, "starting dispatch loop");

        while !self.is_shut_down() {
            self.process_pending()?;
            if self.is_shut_down() {
                break;
            }
            if self.inner.queue.lock().is_empty() && self.inner.wake_rx.recv().is_err() {
                break;
            }
        }

        let discarded = std::mem::take(&mut *self.inner.queue.lock());
        if !discarded.is_empty() {
            tracing::debug!(
                target: targets::DISPATCHER,
                count = discarded.len(),
                "discarding work queued at shutdown"
            );
        }
        drop(discarded);
        tracing::info!(target: targets::DISPATCHER, name = %self.inner.name, "dispatch loop stopped");
        Ok(())
    }

    /// Stop accepting work and wake the dispatch loop so it can exit.
    pub fn quit(&self) {
        if !self.inner.shut_down.swap(true, Ordering::SeqCst) {
            tracing::debug!(target: targets::DISPATCHER, name = %self.inner.name, "quit requested");
            let _ = self.inner.wake_tx.send(());
        }
    }
}

impl ExecutionContext for Dispatcher {
    fn is_current(&self) -> bool {
        self.inner.affinity.is_same_thread()
    }

    fn post(&self, priority: DispatchPriority, invocation: QueuedInvocation) -> Result<()> {
        if self.is_shut_down() {
            return Err(DispatchError::ShutDown);
        }
        let sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst);
        self.inner
            .queue
            .lock()
            .push(PrioritizedWork::new(invocation, priority, sequence));
        let _ = self.inner.wake_tx.send(());
        Ok(())
    }
}

/// A context on which every caller counts as current.
///
/// Posted work runs immediately on the posting thread. Useful for
/// single-threaded programs and tests that do not need marshaling.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineContext;

impl ExecutionContext for InlineContext {
    fn is_current(&self) -> bool {
        true
    }

    fn post(&self, _priority: DispatchPriority, invocation: QueuedInvocation) -> Result<()> {
        invocation.execute();
        Ok(())
    }
}
