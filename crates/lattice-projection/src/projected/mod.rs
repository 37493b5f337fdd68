//! Projected collections.
//!
//! A [`ProjectedCollection`] mirrors a [`SourceCollection`] element by element
//! through a conversion function, and re-raises every source change, already
//! translated, on a single [`ExecutionContext`].
//!
//! Writes made through a projection are forwarded to the source. The
//! projection itself changes only when the source echoes the write back as a
//! notification, so both sides go through the same translation path.
//!
//! # Example
//!
//! ```
//! use lattice_projection::{CollectionChange, ObservableVec, ProjectedCollection};
//! use lattice_projection_core::InlineContext;
//! use std::sync::Arc;
//!
//! let source = Arc::new(ObservableVec::from(vec![1, 2]));
//! let doubled = ProjectedCollection::with_reverse(
//!     source.clone(),
//!     |n: &i32| n * 2,
//!     |n: &i32| n / 2,
//!     InlineContext,
//! )
//! .unwrap();
//!
//! doubled.collection_changed().connect(|change| {
//!     if let CollectionChange::Add { index, item } = change {
//!         println!("added {item} at {index}");
//!     }
//! });
//!
//! source.push(3).unwrap();
//! assert_eq!(doubled.to_vec().unwrap(), vec![2, 4, 6]);
//!
//! // Written through to the source as 4.
//! doubled.insert(0, 8).unwrap();
//! assert_eq!(source.to_vec(), vec![4, 1, 2, 3]);
//! ```

mod builder;
mod sync;

pub use builder::{DeliveryMode, ProjectedCollectionBuilder, ProjectionConfig};

use std::sync::Arc;

use lattice_projection_core::logging::targets;
use lattice_projection_core::{DispatchPriority, ExecutionContext, Signal};

use crate::change::{CollectionChange, PropertyChange};
use crate::error::{CollectionError, Result};
use crate::source::{BackingSource, Disposable, MoveItems, SourceCollection};
use sync::{Conversions, Inner};

/// An observable collection of `P` kept index-aligned with a source
/// collection of `S`.
///
/// Handles are cheap to clone and share one projection. The projection is
/// disposed by [`dispose`](Self::dispose), by disposal of its source, or when
/// the last handle is dropped.
pub struct ProjectedCollection<S, P> {
    inner: Arc<Inner<S, P>>,
}

static_assertions::assert_impl_all!(ProjectedCollection<String, String>: Send, Sync, Clone);

impl<S, P> Clone for ProjectedCollection<S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S, P> ProjectedCollection<S, P>
where
    S: Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    /// Start building a projection.
    pub fn builder() -> ProjectedCollectionBuilder<S, P> {
        ProjectedCollectionBuilder::new()
    }

    /// Project `source` through `to_projection`, converting written elements
    /// back through their [`BackingSource`].
    ///
    /// # Errors
    ///
    /// [`CollectionError::InvalidArgument`] if `source` is read-only or does
    /// not raise property-change notifications.
    pub fn new<C, F, X>(source: Arc<C>, to_projection: F, context: X) -> Result<Self>
    where
        C: SourceCollection<S> + 'static,
        F: Fn(&S) -> P + Send + Sync + 'static,
        X: ExecutionContext + 'static,
        P: BackingSource<S>,
        S: Default,
    {
        Self::builder()
            .source(source)
            .to_projection(to_projection)
            .to_source_from_backing()
            .context(context)
            .build()
    }

    /// Project `source` with explicit conversions in both directions.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_reverse<C, F, R, X>(source: Arc<C>, to_projection: F, to_source: R, context: X) -> Result<Self>
    where
        C: SourceCollection<S> + 'static,
        F: Fn(&S) -> P + Send + Sync + 'static,
        R: Fn(&P) -> S + Send + Sync + 'static,
        X: ExecutionContext + 'static,
    {
        Self::builder()
            .source(source)
            .to_projection(to_projection)
            .to_source(to_source)
            .context(context)
            .build()
    }

    pub(crate) fn from_parts(
        source: Arc<dyn SourceCollection<S>>,
        conversions: Conversions<S, P>,
        context: Arc<dyn ExecutionContext>,
        config: ProjectionConfig,
    ) -> Self {
        Self {
            inner: Inner::attach(source, conversions, context, config.priority, config.delivery),
        }
    }

    // =========================================================================
    // Reading
    // =========================================================================

    /// Number of elements; zero once disposed.
    pub fn len(&self) -> usize {
        self.inner.items.read().len()
    }

    /// Returns `true` if there are no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A clone of the element at `index`.
    pub fn get(&self, index: usize) -> Result<P> {
        self.inner.ensure_live()?;
        let items = self.inner.items.read();
        items
            .get(index)
            .cloned()
            .ok_or_else(|| CollectionError::index_out_of_range(index, items.len()))
    }

    /// Position of the first element equal to `item`.
    pub fn index_of(&self, item: &P) -> Result<Option<usize>>
    where
        P: PartialEq,
    {
        self.inner.ensure_live()?;
        Ok(self.inner.items.read().iter().position(|candidate| candidate == item))
    }

    /// Returns `true` if an element equal to `item` is present.
    pub fn contains(&self, item: &P) -> Result<bool>
    where
        P: PartialEq,
    {
        Ok(self.index_of(item)?.is_some())
    }

    /// A snapshot of every element, in order.
    pub fn to_vec(&self) -> Result<Vec<P>> {
        self.inner.ensure_live()?;
        Ok(self.inner.items.read().clone())
    }

    /// An iterator over a snapshot of the elements.
    pub fn iter(&self) -> Result<std::vec::IntoIter<P>> {
        Ok(self.to_vec()?.into_iter())
    }

    /// Clone every element into `dest`, starting at `offset`.
    ///
    /// # Errors
    ///
    /// [`CollectionError::InvalidArgument`] if the elements do not fit.
    pub fn copy_to(&self, dest: &mut [P], offset: usize) -> Result<()> {
        self.inner.ensure_live()?;
        let items = self.inner.items.read();
        let end = offset
            .checked_add(items.len())
            .filter(|end| *end <= dest.len())
            .ok_or_else(|| {
                CollectionError::invalid_argument(
                    "dest",
                    format!(
                        "{} elements do not fit in a slice of length {} at offset {}",
                        items.len(),
                        dest.len(),
                        offset
                    ),
                )
            })?;
        dest[offset..end].clone_from_slice(&items);
        Ok(())
    }

    /// Always `false`: writes are forwarded to the source.
    pub fn is_read_only(&self) -> bool {
        false
    }

    // =========================================================================
    // Writing through to the source
    // =========================================================================

    fn to_source(&self, item: &P) -> S {
        (self.inner.conversions.to_source)(item)
    }

    /// Insert `item` into the source at `index`.
    ///
    /// The projection gains a freshly converted element once the source
    /// raises the insertion.
    pub fn insert(&self, index: usize, item: P) -> Result<()> {
        let source = self.inner.source()?;
        source.insert(index, self.to_source(&item))
    }

    /// Append `item` to the source.
    pub fn push(&self, item: P) -> Result<()> {
        let source = self.inner.source()?;
        source.push(self.to_source(&item))
    }

    /// Remove the source element at `index`.
    ///
    /// Returns the projection element at `index` when the request was made.
    pub fn remove_at(&self, index: usize) -> Result<P> {
        let source = self.inner.source()?;
        let current = self.get(index)?;
        source.remove_at(index)?;
        Ok(current)
    }

    /// Overwrite the source element at `index` with `item` converted back.
    ///
    /// Returns the projection element at `index` when the request was made.
    pub fn set(&self, index: usize, item: P) -> Result<P> {
        let source = self.inner.source()?;
        let current = self.get(index)?;
        source.set(index, self.to_source(&item))?;
        Ok(current)
    }

    /// Remove every source element.
    pub fn clear(&self) -> Result<()> {
        self.inner.source()?.clear()
    }

    /// Remove the first source element equal to `item` converted back.
    ///
    /// Returns `true` if the source removed an element.
    pub fn remove(&self, item: &P) -> Result<bool>
    where
        S: PartialEq,
    {
        let source = self.inner.source()?;
        let target = self.to_source(item);
        source.remove_first(&|candidate: &S| *candidate == target)
    }

    /// Move the source element at `old_index` to `new_index`.
    ///
    /// Sources without an in-place move leave both collections untouched.
    pub fn move_item(&self, old_index: usize, new_index: usize) -> Result<()> {
        let source = self.inner.source()?;
        match source.as_move_items() {
            Some(mover) => mover.move_item(old_index, new_index),
            None => {
                tracing::warn!(
                    target: targets::PROJECTED,
                    old_index,
                    new_index,
                    "source collection cannot move elements; ignoring move"
                );
                Ok(())
            }
        }
    }

    // =========================================================================
    // Notifications and scheduling
    // =========================================================================

    /// Structured change notifications, raised on the execution context.
    pub fn collection_changed(&self) -> &Signal<CollectionChange<P>> {
        &self.inner.collection_changed
    }

    /// Property-change notifications forwarded from the source.
    pub fn property_changed(&self) -> &Signal<PropertyChange> {
        &self.inner.property_changed
    }

    /// Raised once, when the projection is disposed.
    pub fn disposed(&self) -> &Signal<()> {
        &self.inner.disposed
    }

    /// Priority of work posted to the execution context.
    pub fn priority(&self) -> DispatchPriority {
        *self.inner.priority.lock()
    }

    /// Change the priority of subsequently posted work.
    ///
    /// Source changes keep their relative order regardless of priority.
    pub fn set_priority(&self, priority: DispatchPriority) {
        *self.inner.priority.lock() = priority;
    }

    /// How off-context changes are delivered.
    pub fn delivery_mode(&self) -> DeliveryMode {
        self.inner.delivery
    }

    /// The execution context notifications are raised on.
    pub fn context(&self) -> Arc<dyn ExecutionContext> {
        self.inner.context()
    }

    /// Raise subsequent notifications on `context`.
    ///
    /// Changes already posted to the previous context are applied on the new
    /// one, still in source order.
    pub fn set_context<C>(&self, context: C)
    where
        C: ExecutionContext + 'static,
    {
        self.inner.set_context(Arc::new(context));
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Unsubscribe from the source and release every element.
    ///
    /// Only the first call has an effect, even when racing calls come from
    /// several threads. [`disposed`](Self::disposed) is raised once and every
    /// listener is then disconnected.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Returns `true` once the projection has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }
}

impl<S, P> SourceCollection<P> for ProjectedCollection<S, P>
where
    S: Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    fn len(&self) -> usize {
        ProjectedCollection::len(self)
    }

    fn get(&self, index: usize) -> Option<P> {
        ProjectedCollection::get(self, index).ok()
    }

    fn to_vec(&self) -> Vec<P> {
        ProjectedCollection::to_vec(self).unwrap_or_default()
    }

    fn insert(&self, index: usize, item: P) -> Result<()> {
        ProjectedCollection::insert(self, index, item)
    }

    fn remove_at(&self, index: usize) -> Result<P> {
        ProjectedCollection::remove_at(self, index)
    }

    fn set(&self, index: usize, item: P) -> Result<P> {
        ProjectedCollection::set(self, index, item)
    }

    fn push(&self, item: P) -> Result<()> {
        ProjectedCollection::push(self, item)
    }

    fn clear(&self) -> Result<()> {
        ProjectedCollection::clear(self)
    }

    fn remove_first(&self, predicate: &dyn Fn(&P) -> bool) -> Result<bool> {
        self.inner.ensure_live()?;
        let position = self.inner.items.read().iter().position(predicate);
        match position {
            Some(index) => ProjectedCollection::remove_at(self, index).map(|_| true),
            None => Ok(false),
        }
    }

    fn collection_changed(&self) -> &Signal<CollectionChange<P>> {
        &self.inner.collection_changed
    }

    fn property_changed(&self) -> Option<&Signal<PropertyChange>> {
        Some(&self.inner.property_changed)
    }

    fn disposed(&self) -> Option<&Signal<()>> {
        Some(&self.inner.disposed)
    }

    fn as_move_items(&self) -> Option<&dyn MoveItems> {
        Some(self)
    }
}

impl<S, P> MoveItems for ProjectedCollection<S, P>
where
    S: Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    fn move_item(&self, old_index: usize, new_index: usize) -> Result<()> {
        ProjectedCollection::move_item(self, old_index, new_index)
    }
}

impl<S, P> Disposable for ProjectedCollection<S, P>
where
    S: Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    fn dispose(&self) {
        ProjectedCollection::dispose(self);
    }
}

impl<S, P> std::fmt::Debug for ProjectedCollection<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectedCollection")
            .field("len", &self.inner.items.read().len())
            .field("delivery", &self.inner.delivery)
            .field("priority", &*self.inner.priority.lock())
            .field("disposed", &self.inner.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ObservableVec;
    use lattice_projection_core::{Dispatcher, InlineContext, QueuedInvocation, completion_pair};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A source without an in-place move.
    struct PlainSource {
        items: ObservableVec<i32>,
    }

    impl SourceCollection<i32> for PlainSource {
        fn len(&self) -> usize {
            self.items.len()
        }
        fn get(&self, index: usize) -> Option<i32> {
            self.items.get(index)
        }
        fn to_vec(&self) -> Vec<i32> {
            self.items.to_vec()
        }
        fn insert(&self, index: usize, item: i32) -> Result<()> {
            self.items.insert(index, item)
        }
        fn remove_at(&self, index: usize) -> Result<i32> {
            self.items.remove_at(index)
        }
        fn set(&self, index: usize, item: i32) -> Result<i32> {
            self.items.set(index, item)
        }
        fn push(&self, item: i32) -> Result<()> {
            self.items.push(item)
        }
        fn clear(&self) -> Result<()> {
            self.items.clear()
        }
        fn remove_first(&self, predicate: &dyn Fn(&i32) -> bool) -> Result<bool> {
            self.items.remove_first(predicate)
        }
        fn collection_changed(&self) -> &Signal<CollectionChange<i32>> {
            self.items.collection_changed()
        }
        fn property_changed(&self) -> Option<&Signal<PropertyChange>> {
            Some(self.items.property_changed())
        }
    }

    fn labels(source: Arc<ObservableVec<i32>>) -> ProjectedCollection<i32, String> {
        ProjectedCollection::with_reverse(
            source,
            |n: &i32| format!("#{n}"),
            |label: &String| label.trim_start_matches('#').parse().unwrap_or_default(),
            InlineContext,
        )
        .unwrap()
    }

    #[test]
    fn test_seed_raises_no_notification() {
        let source = Arc::new(ObservableVec::from(vec![1, 2, 3]));
        let projection = labels(source);
        assert_eq!(projection.to_vec().unwrap(), vec!["#1", "#2", "#3"]);
        assert_eq!(projection.len(), 3);
        assert!(!projection.is_read_only());
    }

    #[test]
    fn test_read_surface() {
        let source = Arc::new(ObservableVec::from(vec![1, 2, 3]));
        let projection = labels(source);

        assert_eq!(projection.get(1).unwrap(), "#2");
        assert_eq!(projection.get(3), Err(CollectionError::index_out_of_range(3, 3)));
        assert_eq!(projection.index_of(&"#3".to_string()).unwrap(), Some(2));
        assert!(!projection.contains(&"#9".to_string()).unwrap());
        assert_eq!(projection.iter().unwrap().collect::<Vec<_>>(), vec!["#1", "#2", "#3"]);

        let mut dest = vec![String::new(); 5];
        projection.copy_to(&mut dest, 1).unwrap();
        assert_eq!(dest, vec!["", "#1", "#2", "#3", ""]);
        assert!(matches!(
            projection.copy_to(&mut dest, 3),
            Err(CollectionError::InvalidArgument { argument: "dest", .. })
        ));
    }

    #[test]
    fn test_writes_go_through_the_source() {
        let source = Arc::new(ObservableVec::from(vec![1, 2]));
        let projection = labels(source.clone());

        projection.push("#3".to_string()).unwrap();
        projection.insert(0, "#0".to_string()).unwrap();
        assert_eq!(source.to_vec(), vec![0, 1, 2, 3]);
        assert_eq!(projection.to_vec().unwrap(), vec!["#0", "#1", "#2", "#3"]);

        assert_eq!(projection.set(1, "#7".to_string()).unwrap(), "#1");
        assert_eq!(source.to_vec(), vec![0, 7, 2, 3]);

        assert_eq!(projection.remove_at(0).unwrap(), "#0");
        assert!(projection.remove(&"#2".to_string()).unwrap());
        assert!(!projection.remove(&"#2".to_string()).unwrap());
        assert_eq!(source.to_vec(), vec![7, 3]);

        projection.move_item(1, 0).unwrap();
        assert_eq!(projection.to_vec().unwrap(), vec!["#3", "#7"]);

        projection.clear().unwrap();
        assert!(source.is_empty());
        assert!(projection.is_empty());
    }

    #[test]
    fn test_move_without_capability_is_noop() {
        let source = Arc::new(PlainSource {
            items: ObservableVec::from(vec![1, 2, 3]),
        });
        let projection: ProjectedCollection<i32, i32> =
            ProjectedCollection::with_reverse(source.clone(), |n: &i32| *n, |n: &i32| *n, InlineContext).unwrap();
        let emitted = Arc::new(AtomicUsize::new(0));
        let counter = emitted.clone();
        projection.collection_changed().connect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(projection.move_item(0, 2).is_ok());
        assert_eq!(source.to_vec(), vec![1, 2, 3]);
        assert_eq!(projection.to_vec().unwrap(), vec![1, 2, 3]);
        assert_eq!(emitted.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_operations_fail_after_dispose() {
        let source = Arc::new(ObservableVec::from(vec![1, 2]));
        let projection = labels(source.clone());
        projection.dispose();

        let disposed = CollectionError::Disposed("ProjectedCollection");
        assert_eq!(projection.len(), 0);
        assert_eq!(projection.get(0), Err(disposed.clone()));
        assert_eq!(projection.to_vec(), Err(disposed.clone()));
        assert_eq!(projection.push("#3".to_string()), Err(disposed.clone()));
        assert_eq!(projection.move_item(0, 1), Err(disposed.clone()));
        assert_eq!(projection.clear(), Err(disposed));
        assert_eq!(source.to_vec(), vec![1, 2]);
    }

    #[test]
    fn test_priority_round_trip() {
        let source = Arc::new(ObservableVec::from(vec![1]));
        let projection = labels(source);
        assert_eq!(projection.priority(), DispatchPriority::Normal);
        projection.set_priority(DispatchPriority::High);
        assert_eq!(projection.priority(), DispatchPriority::High);
        assert_eq!(projection.delivery_mode(), DeliveryMode::Posted);
    }

    #[test]
    fn test_set_context_moves_pending_changes_to_new_context() {
        let first = Dispatcher::for_current_thread();
        let source = Arc::new(ObservableVec::from(vec![1]));
        let projection: ProjectedCollection<i32, i32> = ProjectedCollection::builder()
            .source(source.clone())
            .to_projection(|n: &i32| *n)
            .to_source(|n: &i32| *n)
            .context(first.clone())
            .build()
            .unwrap();

        let remote = source.clone();
        std::thread::spawn(move || remote.push(2).unwrap())
            .join()
            .unwrap();
        assert_eq!(projection.len(), 1);

        let (second, second_thread) = Dispatcher::spawn("second-context").unwrap();
        let delivered_on = Arc::new(Mutex::new(Vec::new()));
        let recorder = delivered_on.clone();
        projection.collection_changed().connect(move |_| {
            recorder.lock().push(std::thread::current().id());
        });
        projection.set_context(second.clone());

        // The drain posted earlier runs here and forwards to the new context.
        first.process_pending().unwrap();
        let (done, waiter) = completion_pair();
        second
            .post(DispatchPriority::Idle, QueuedInvocation::with_completion(|| {}, done))
            .unwrap();
        assert!(waiter.wait());

        assert_eq!(projection.to_vec().unwrap(), vec![1, 2]);
        assert_eq!(*delivered_on.lock(), vec![second_thread.thread().id()]);

        second.quit();
        second_thread.join().unwrap();
    }
}
