//! Lattice Projection - observable collections projected from a source.
//!
//! A [`ProjectedCollection`] keeps a sequence of derived elements in
//! lockstep with a [`SourceCollection`], translating every source change
//! into the matching projection change and raising it on one
//! [`ExecutionContext`](lattice_projection_core::ExecutionContext), whichever
//! thread the source changed on.
//!
//! - [`ObservableVec`] is a ready-made thread-safe source.
//! - [`ProjectedCollectionBuilder`] configures delivery, priority and element
//!   disposal.
//! - Projections are sources themselves, so they chain; disposing the root
//!   disposes every projection built on it.
//!
//! # Example
//!
//! ```
//! use lattice_projection::{ObservableVec, ProjectedCollection};
//! use lattice_projection_core::Dispatcher;
//! use std::sync::Arc;
//!
//! let ui = Dispatcher::for_current_thread();
//! let names = Arc::new(ObservableVec::from(vec!["ada".to_string()]));
//! let upper = ProjectedCollection::with_reverse(
//!     names.clone(),
//!     |name: &String| name.to_uppercase(),
//!     |name: &String| name.to_lowercase(),
//!     ui.clone(),
//! )
//! .unwrap();
//!
//! let writer = names.clone();
//! std::thread::spawn(move || writer.push("grace".to_string()).unwrap())
//!     .join()
//!     .unwrap();
//!
//! // Nothing is visible until the ui thread runs the posted work.
//! assert_eq!(upper.len(), 1);
//! ui.process_pending().unwrap();
//! assert_eq!(upper.to_vec().unwrap(), vec!["ADA", "GRACE"]);
//! ```

mod change;
mod error;
mod observable_vec;
mod projected;
mod source;

pub use change::{ChangeKind, CollectionChange, PropertyChange};
pub use error::{CollectionError, Result};
pub use observable_vec::ObservableVec;
pub use projected::{DeliveryMode, ProjectedCollection, ProjectedCollectionBuilder, ProjectionConfig};
pub use source::{BackingSource, Disposable, MoveItems, SourceCollection};
