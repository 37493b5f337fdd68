//! Core systems for Lattice Projection.
//!
//! This crate provides the plumbing the projection engine is built on:
//!
//! - **Execution contexts**: [`ExecutionContext`], the thread-bound
//!   [`Dispatcher`] and the trivial [`InlineContext`]
//! - **Dispatch priorities**: [`DispatchPriority`] ordering of posted work
//! - **Queued invocations**: deferred closures with optional blocking completion
//! - **Signal/Slot System**: type-safe notifications with direct or
//!   context-marshaled delivery
//! - **Thread affinity**: [`ThreadAffinity`] checks for single-owner state
//!
//! # Signal/Slot Example
//!
//! ```
//! use lattice_projection_core::Signal;
//!
//! let value_changed = Signal::<i32>::new();
//! let conn_id = value_changed.connect(|value| {
//!     println!("Value changed to: {}", value);
//! });
//!
//! value_changed.emit(42);
//! value_changed.disconnect(conn_id);
//! ```
//!
//! # Dispatcher Example
//!
//! ```no_run
//! use lattice_projection_core::{DispatchPriority, Dispatcher, ExecutionContext, QueuedInvocation};
//!
//! let (ui, ui_thread) = Dispatcher::spawn("ui").unwrap();
//! ui.post(
//!     DispatchPriority::Normal,
//!     QueuedInvocation::new(|| println!("running on the ui thread")),
//! )
//! .unwrap();
//! ui.quit();
//! ui_thread.join().unwrap();
//! ```

pub mod dispatcher;
mod error;
pub mod invocation;
pub mod logging;
mod priority;
pub mod signal;
pub mod thread_check;

pub use dispatcher::{Dispatcher, ExecutionContext, InlineContext};
pub use error::{DispatchError, Result, SignalError};
pub use invocation::{CompletionHandle, CompletionWaiter, QueuedInvocation, completion_pair};
pub use priority::DispatchPriority;
pub use signal::{ConnectionGuard, ConnectionId, ConnectionType, Signal};
pub use thread_check::ThreadAffinity;
