//! Translation of source notifications into projection mutations.
//!
//! Source notifications may arrive on any thread. Each one is appended to a
//! FIFO of pending work owned by the projection; the queue is drained only on
//! the execution context, so the projection is mutated and its listeners are
//! notified there, in the order the source raised the notifications.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use lattice_projection_core::logging::targets;
use lattice_projection_core::{
    ConnectionGuard, DispatchPriority, ExecutionContext, QueuedInvocation, Signal, completion_pair,
};
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};

use super::builder::DeliveryMode;
use crate::change::{CollectionChange, PropertyChange};
use crate::error::{CollectionError, Result};
use crate::source::SourceCollection;

/// Releases the resources of a projection element leaving the collection.
pub(crate) type Disposer<P> = Arc<dyn Fn(&P) + Send + Sync>;

/// Element conversions between the two sides of a projection.
pub(crate) struct Conversions<S, P> {
    pub(crate) to_projection: Arc<dyn Fn(&S) -> P + Send + Sync>,
    pub(crate) to_source: Arc<dyn Fn(&P) -> S + Send + Sync>,
    pub(crate) disposer: Option<Disposer<P>>,
}

/// A unit of work waiting for the execution context.
enum Pending<S> {
    Change(CollectionChange<S>),
    Property(PropertyChange),
    SourceDisposed,
}

/// Subscriptions on the source; dropping them unsubscribes.
struct SourceSubscriptions<S> {
    _changed: ConnectionGuard<CollectionChange<S>>,
    _property: Option<ConnectionGuard<PropertyChange>>,
    _disposed: Option<ConnectionGuard<()>>,
}

/// Resets the draining flag even if a listener panics mid-drain.
struct DrainReset<'a>(&'a AtomicBool);

impl Drop for DrainReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Shared state of a projected collection.
pub(crate) struct Inner<S, P> {
    pub(crate) items: RwLock<Vec<P>>,
    pub(crate) source: RwLock<Option<Arc<dyn SourceCollection<S>>>>,
    pub(crate) conversions: Conversions<S, P>,
    context: RwLock<Arc<dyn ExecutionContext>>,
    pub(crate) priority: Mutex<DispatchPriority>,
    pub(crate) delivery: DeliveryMode,
    pending: Mutex<VecDeque<Pending<S>>>,
    draining: AtomicBool,
    subscriptions: Mutex<Option<SourceSubscriptions<S>>>,
    is_disposed: AtomicBool,
    pub(crate) collection_changed: Signal<CollectionChange<P>>,
    pub(crate) property_changed: Signal<PropertyChange>,
    pub(crate) disposed: Signal<()>,
}

impl<S, P> Inner<S, P> {
    pub(crate) fn is_disposed(&self) -> bool {
        self.is_disposed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            Err(CollectionError::Disposed("ProjectedCollection"))
        } else {
            Ok(())
        }
    }
}

impl<S, P> Inner<S, P>
where
    S: Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    /// Seed from the current contents of `source`, then subscribe to it.
    ///
    /// The seed raises no notification.
    pub(crate) fn attach(
        source: Arc<dyn SourceCollection<S>>,
        conversions: Conversions<S, P>,
        context: Arc<dyn ExecutionContext>,
        priority: DispatchPriority,
        delivery: DeliveryMode,
    ) -> Arc<Self> {
        let seed: Vec<P> = source
            .to_vec()
            .iter()
            .map(|item| (conversions.to_projection)(item))
            .collect();
        tracing::debug!(
            target: targets::PROJECTED,
            len = seed.len(),
            ?priority,
            ?delivery,
            "seeded projected collection"
        );

        let inner = Arc::new(Self {
            items: RwLock::new(seed),
            source: RwLock::new(Some(source.clone())),
            conversions,
            context: RwLock::new(context),
            priority: Mutex::new(priority),
            delivery,
            pending: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
            subscriptions: Mutex::new(None),
            is_disposed: AtomicBool::new(false),
            collection_changed: Signal::new(),
            property_changed: Signal::new(),
            disposed: Signal::new(),
        });
        let subscriptions = Self::subscribe(&inner, source.as_ref());
        *inner.subscriptions.lock() = Some(subscriptions);
        inner
    }

    fn subscribe(inner: &Arc<Self>, source: &dyn SourceCollection<S>) -> SourceSubscriptions<S> {
        let weak = Arc::downgrade(inner);
        let changed = source.collection_changed().connect_scoped(move |change| {
            if let Some(inner) = weak.upgrade() {
                inner.enqueue(Pending::Change(change.clone()));
            }
        });

        let weak = Arc::downgrade(inner);
        let property = source.property_changed().map(|signal| {
            signal.connect_scoped(move |change| {
                if let Some(inner) = weak.upgrade() {
                    inner.enqueue(Pending::Property(change.clone()));
                }
            })
        });

        let weak = Arc::downgrade(inner);
        let disposed = source.disposed().map(|signal| {
            signal.connect_scoped(move |_| {
                if let Some(inner) = weak.upgrade() {
                    inner.enqueue(Pending::SourceDisposed);
                }
            })
        });

        SourceSubscriptions {
            _changed: changed,
            _property: property,
            _disposed: disposed,
        }
    }

    /// The source, while the projection is attached to one.
    pub(crate) fn source(&self) -> Result<Arc<dyn SourceCollection<S>>> {
        self.ensure_live()?;
        self.source
            .read()
            .clone()
            .ok_or(CollectionError::Disposed("ProjectedCollection"))
    }

    pub(crate) fn context(&self) -> Arc<dyn ExecutionContext> {
        self.context.read().clone()
    }

    /// Point the projection at another execution context.
    ///
    /// Drains already posted to the old context hand their work on to the new
    /// one when they run.
    pub(crate) fn set_context(self: &Arc<Self>, context: Arc<dyn ExecutionContext>) {
        *self.context.write() = context;
        tracing::debug!(target: targets::PROJECTED, "execution context replaced");
        if !self.pending.lock().is_empty() {
            self.schedule(DeliveryMode::Posted);
        }
    }

    /// Queue `work` and get it onto the execution context.
    fn enqueue(self: &Arc<Self>, work: Pending<S>) {
        if self.is_disposed() {
            tracing::trace!(target: targets::PROJECTED, "ignoring source notification after disposal");
            return;
        }
        self.pending.lock().push_back(work);
        self.schedule(self.delivery);
    }

    /// Drain at once when on the execution context, otherwise post a drain.
    fn schedule(self: &Arc<Self>, delivery: DeliveryMode) {
        let context = self.context();
        if context.is_current() {
            self.drain();
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let drain = move || {
            if let Some(inner) = weak.upgrade() {
                // Forwards to the current context if it was swapped meanwhile.
                inner.schedule(DeliveryMode::Posted);
            }
        };
        let priority = *self.priority.lock();
        let posted = match delivery {
            DeliveryMode::Posted => context.post(priority, QueuedInvocation::new(drain)),
            DeliveryMode::Blocking => {
                let (handle, waiter) = completion_pair();
                context
                    .post(priority, QueuedInvocation::with_completion(drain, handle))
                    .map(|()| {
                        if !waiter.wait() {
                            tracing::debug!(
                                target: targets::PROJECTED,
                                "execution context discarded a blocking delivery"
                            );
                        }
                    })
            }
        };
        if let Err(err) = posted {
            tracing::warn!(
                target: targets::PROJECTED,
                %err,
                "failed to marshal source notification onto the execution context"
            );
        }
    }

    /// Run pending work until the queue is empty.
    ///
    /// A drain started while another is running returns at once; the running
    /// drain picks up the newly queued work after its current item.
    fn drain(&self) {
        loop {
            if self.draining.swap(true, Ordering::AcqRel) {
                return;
            }
            {
                let _reset = DrainReset(&self.draining);
                while let Some(work) = self.next_pending() {
                    self.run(work);
                }
            }
            if self.is_disposed() || self.pending.lock().is_empty() {
                return;
            }
        }
    }

    fn next_pending(&self) -> Option<Pending<S>> {
        if self.is_disposed() {
            return None;
        }
        self.pending.lock().pop_front()
    }

    fn run(&self, work: Pending<S>) {
        match work {
            Pending::Change(change) => {
                let kind = change.kind();
                if let Err(err) = self.apply(change) {
                    tracing::error!(
                        target: targets::PROJECTED,
                        %kind,
                        %err,
                        "rejected source change"
                    );
                }
            }
            Pending::Property(change) => self.property_changed.emit(change),
            Pending::SourceDisposed => {
                tracing::debug!(target: targets::PROJECTED, "source disposed, disposing projection");
                self.dispose();
            }
        }
    }

    /// Mirror one source change and raise the re-expressed notification.
    ///
    /// Indices are checked before anything is converted or mutated. Must run
    /// on the execution context.
    pub(crate) fn apply(&self, change: CollectionChange<S>) -> Result<()> {
        self.ensure_live()?;
        tracing::trace!(target: targets::PROJECTED, kind = %change.kind(), "applying source change");

        let projected = match change {
            CollectionChange::Add { index, item } => {
                check_position(index, self.items.read().len())?;
                let item = (self.conversions.to_projection)(&item);
                let mut items = match self.live_items() {
                    Ok(items) => items,
                    Err(err) => {
                        self.release(&item);
                        return Err(err);
                    }
                };
                check_position(index, items.len())?;
                items.insert(index, item.clone());
                CollectionChange::Add { index, item }
            }
            CollectionChange::Remove { index, .. } => {
                let item = {
                    let mut items = self.live_items()?;
                    check_index(index, items.len())?;
                    items.remove(index)
                };
                self.release(&item);
                CollectionChange::Remove { index, item }
            }
            CollectionChange::Replace { index, new_item, .. } => {
                check_index(index, self.items.read().len())?;
                let new_item = (self.conversions.to_projection)(&new_item);
                let mut items = match self.live_items() {
                    Ok(items) => items,
                    Err(err) => {
                        self.release(&new_item);
                        return Err(err);
                    }
                };
                check_index(index, items.len())?;
                // The displaced element is handed to listeners, not disposed.
                let old_item = std::mem::replace(&mut items[index], new_item.clone());
                CollectionChange::Replace {
                    index,
                    new_item,
                    old_item,
                }
            }
            CollectionChange::Move {
                old_index,
                new_index,
                ..
            } => {
                let mut items = self.live_items()?;
                check_index(old_index, items.len())?;
                check_index(new_index, items.len())?;
                let item = items.remove(old_index);
                items.insert(new_index, item.clone());
                CollectionChange::Move {
                    old_index,
                    new_index,
                    item,
                }
            }
            CollectionChange::Reset => {
                let removed = std::mem::take(&mut *self.live_items()?);
                removed.iter().for_each(|item| self.release(item));
                CollectionChange::Reset
            }
        };

        self.collection_changed.emit(projected);
        Ok(())
    }

    /// Write access to the elements, unless disposal has begun.
    ///
    /// `dispose` raises the flag before it takes the elements, so a change
    /// that passes this check lands before the teardown and is released by it.
    fn live_items(&self) -> Result<RwLockWriteGuard<'_, Vec<P>>> {
        let items = self.items.write();
        self.ensure_live()?;
        Ok(items)
    }

    fn release(&self, item: &P) {
        if let Some(disposer) = &self.conversions.disposer {
            disposer(item);
        }
    }

    /// Transition to disposed. Returns `true` for the one call that tears down.
    pub(crate) fn dispose(&self) -> bool {
        if self
            .is_disposed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        tracing::debug!(target: targets::PROJECTED, "disposing projected collection");
        drop(self.subscriptions.lock().take());
        self.pending.lock().clear();
        let removed = std::mem::take(&mut *self.items.write());
        removed.iter().for_each(|item| self.release(item));
        drop(self.source.write().take());

        self.disposed.emit(());
        self.collection_changed.disconnect_all();
        self.property_changed.disconnect_all();
        self.disposed.disconnect_all();
        true
    }
}

impl<S, P> Drop for Inner<S, P> {
    fn drop(&mut self) {
        if self.is_disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        // The last handle is gone, so nobody can listen any more; unsubscribe
        // and release the elements still held.
        drop(self.subscriptions.get_mut().take());
        if let Some(disposer) = &self.conversions.disposer {
            self.items.get_mut().iter().for_each(|item| disposer(item));
        }
        tracing::debug!(target: targets::PROJECTED, "dropped undisposed projected collection");
    }
}

/// `index` must address an element.
fn check_index(index: usize, len: usize) -> Result<()> {
    if index < len {
        Ok(())
    } else {
        Err(CollectionError::index_out_of_range(index, len))
    }
}

/// `index` must be an insertion point.
fn check_position(index: usize, len: usize) -> Result<()> {
    if index <= len {
        Ok(())
    } else {
        Err(CollectionError::index_out_of_range(index, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ObservableVec, ProjectedCollection, ProjectedCollectionBuilder};
    use lattice_projection_core::{Dispatcher, InlineContext};
    use std::sync::atomic::AtomicUsize;

    fn project(source: &Arc<ObservableVec<i32>>) -> ProjectedCollection<i32, String> {
        ProjectedCollectionBuilder::new()
            .source(source.clone())
            .to_projection(|n: &i32| n.to_string())
            .to_source(|s: &String| s.parse().unwrap_or_default())
            .context(InlineContext)
            .build()
            .unwrap()
    }

    #[test]
    fn test_out_of_range_change_is_rejected_without_mutation() {
        let source = Arc::new(ObservableVec::from(vec![1, 2]));
        let projection = project(&source);
        let emitted = Arc::new(AtomicUsize::new(0));
        let counter = emitted.clone();
        projection.collection_changed().connect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let result = projection.inner.apply(CollectionChange::Remove { index: 5, item: 0 });
        assert_eq!(result, Err(CollectionError::index_out_of_range(5, 2)));

        let result = projection.inner.apply(CollectionChange::Move {
            old_index: 0,
            new_index: 2,
            item: 1,
        });
        assert!(result.is_err());

        assert_eq!(projection.to_vec().unwrap(), vec!["1", "2"]);
        assert_eq!(emitted.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_add_at_end_is_accepted() {
        let source = Arc::new(ObservableVec::from(vec![1]));
        let projection = project(&source);

        projection
            .inner
            .apply(CollectionChange::Add { index: 1, item: 7 })
            .unwrap();
        assert_eq!(projection.to_vec().unwrap(), vec!["1", "7"]);
    }

    #[test]
    fn test_reentrant_write_is_applied_after_current_change() {
        let source = Arc::new(ObservableVec::from(vec![1]));
        let projection = project(&source);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let writer = source.clone();
        let recorder = seen.clone();
        let observed = projection.clone();
        projection.collection_changed().connect(move |change| {
            let snapshot = observed.to_vec().unwrap();
            recorder.lock().push((change.kind(), snapshot));
            if let CollectionChange::Add { item, .. } = change {
                if item == "2" {
                    writer.push(3).unwrap();
                }
            }
        });

        source.push(2).unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1, vec!["1", "2"]);
        assert_eq!(seen[1].1, vec!["1", "2", "3"]);
        assert_eq!(projection.to_vec().unwrap(), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_property_changes_are_forwarded_in_order() {
        let source = Arc::new(ObservableVec::from(vec![1]));
        let projection = project(&source);
        let names = Arc::new(Mutex::new(Vec::new()));
        let recorder = names.clone();
        projection.property_changed().connect(move |change| {
            recorder.lock().push(change.property_name().to_string());
        });

        source.push(2).unwrap();
        source.set(0, 5).unwrap();

        assert_eq!(
            *names.lock(),
            vec![PropertyChange::COUNT, PropertyChange::INDEXER, PropertyChange::INDEXER]
        );
    }

    #[test]
    fn test_queued_drain_after_dispose_is_noop() {
        let dispatcher = Dispatcher::for_current_thread();
        let source = Arc::new(ObservableVec::from(vec![1]));
        let projection: ProjectedCollection<i32, String> = ProjectedCollectionBuilder::new()
            .source(source.clone())
            .to_projection(|n: &i32| n.to_string())
            .to_source(|s: &String| s.parse().unwrap_or_default())
            .context(dispatcher.clone())
            .build()
            .unwrap();
        let emitted = Arc::new(AtomicUsize::new(0));
        let counter = emitted.clone();
        projection.collection_changed().connect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let remote = source.clone();
        std::thread::spawn(move || remote.push(2).unwrap())
            .join()
            .unwrap();
        // Count, Item[] and the Add each post one drain.
        assert_eq!(dispatcher.pending_count(), 3);

        projection.dispose();
        assert_eq!(dispatcher.process_pending().unwrap(), 3);
        assert_eq!(emitted.load(Ordering::SeqCst), 0);
        assert_eq!(projection.len(), 0);
    }

    #[test]
    fn test_dropping_last_handle_unsubscribes_and_releases() {
        let source = Arc::new(ObservableVec::from(vec![1, 2]));
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let projection: ProjectedCollection<i32, String> = ProjectedCollectionBuilder::new()
            .source(source.clone())
            .to_projection(|n: &i32| n.to_string())
            .to_source(|s: &String| s.parse().unwrap_or_default())
            .dispose_with(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .context(InlineContext)
            .build()
            .unwrap();
        assert_eq!(source.collection_changed().connection_count(), 1);

        drop(projection);
        assert_eq!(source.collection_changed().connection_count(), 0);
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }
}
