//! A thread-safe observable vector.
//!
//! `ObservableVec<T>` is the reference [`SourceCollection`]: every mutation
//! raises the matching [`CollectionChange`] plus property changes for
//! [`PropertyChange::COUNT`] and [`PropertyChange::INDEXER`], on the thread
//! that performed it. It also supports in-place moves and its own disposal.
//!
//! # Example
//!
//! ```
//! use lattice_projection::{CollectionChange, ObservableVec};
//!
//! let names = ObservableVec::from(vec!["a".to_string(), "b".to_string()]);
//! names.collection_changed().connect(|change| {
//!     if let CollectionChange::Add { index, item } = change {
//!         println!("{item} inserted at {index}");
//!     }
//! });
//! names.push("c".to_string()).unwrap();
//! assert_eq!(names.len(), 3);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use lattice_projection_core::Signal;
use lattice_projection_core::logging::targets;
use parking_lot::{Mutex, ReentrantMutex, RwLock};

use crate::change::{CollectionChange, PropertyChange};
use crate::error::{CollectionError, Result};
use crate::source::{MoveItems, SourceCollection};

/// A change waiting to be raised, with whether it altered the length.
struct Notification<T> {
    change: CollectionChange<T>,
    count_changed: bool,
}

/// Clears the notifying flag even if a listener panics.
struct NotifyReset<'a>(&'a AtomicBool);

impl Drop for NotifyReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// An observable, thread-safe vector.
///
/// A listener may write back to the vector while it is being notified. The
/// write is applied at once, but its notification is raised only after every
/// listener has seen the change in progress, so all listeners observe changes
/// in mutation order.
pub struct ObservableVec<T> {
    items: RwLock<Vec<T>>,
    /// Serializes mutate-then-notify so listeners see changes in mutation
    /// order. Re-entrant so a listener may write back on the same thread.
    write_lock: ReentrantMutex<()>,
    /// Changes raised by listeners during an emit. Guarded by `write_lock`.
    outbox: Mutex<VecDeque<Notification<T>>>,
    notifying: AtomicBool,
    collection_changed: Signal<CollectionChange<T>>,
    property_changed: Signal<PropertyChange>,
    disposed: Signal<()>,
    is_disposed: AtomicBool,
}

impl<T: Clone + Send + Sync + 'static> Default for ObservableVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> From<Vec<T>> for ObservableVec<T> {
    fn from(items: Vec<T>) -> Self {
        Self {
            items: RwLock::new(items),
            write_lock: ReentrantMutex::new(()),
            outbox: Mutex::new(VecDeque::new()),
            notifying: AtomicBool::new(false),
            collection_changed: Signal::new(),
            property_changed: Signal::new(),
            disposed: Signal::new(),
            is_disposed: AtomicBool::new(false),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ObservableVec<T> {
    /// Creates an empty vector.
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Returns `true` if the vector is empty.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Returns a clone of the element at `index`.
    pub fn get(&self, index: usize) -> Option<T> {
        self.items.read().get(index).cloned()
    }

    /// Returns a snapshot of the elements.
    pub fn to_vec(&self) -> Vec<T> {
        self.items.read().clone()
    }

    /// Returns `true` once [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.is_disposed.load(Ordering::SeqCst)
    }

    /// Structured change notifications.
    pub fn collection_changed(&self) -> &Signal<CollectionChange<T>> {
        &self.collection_changed
    }

    /// Property-change notifications.
    pub fn property_changed(&self) -> &Signal<PropertyChange> {
        &self.property_changed
    }

    /// Raised once when the vector is disposed.
    pub fn disposed(&self) -> &Signal<()> {
        &self.disposed
    }

    /// Appends an element.
    pub fn push(&self, item: T) -> Result<()> {
        let _write = self.write_lock.lock();
        self.check_live()?;
        let index = {
            let mut items = self.items.write();
            items.push(item.clone());
            items.len() - 1
        };
        self.notify(CollectionChange::Add { index, item }, true);
        Ok(())
    }

    /// Inserts an element at `index`.
    pub fn insert(&self, index: usize, item: T) -> Result<()> {
        let _write = self.write_lock.lock();
        self.check_live()?;
        {
            let mut items = self.items.write();
            if index > items.len() {
                return Err(CollectionError::index_out_of_range(index, items.len()));
            }
            items.insert(index, item.clone());
        }
        self.notify(CollectionChange::Add { index, item }, true);
        Ok(())
    }

    /// Removes and returns the element at `index`.
    pub fn remove_at(&self, index: usize) -> Result<T> {
        let _write = self.write_lock.lock();
        self.check_live()?;
        let item = {
            let mut items = self.items.write();
            if index >= items.len() {
                return Err(CollectionError::index_out_of_range(index, items.len()));
            }
            items.remove(index)
        };
        self.notify(
            CollectionChange::Remove {
                index,
                item: item.clone(),
            },
            true,
        );
        Ok(item)
    }

    /// Removes the first element equal to `item`.
    pub fn remove(&self, item: &T) -> Result<bool>
    where
        T: PartialEq,
    {
        self.remove_first(&|candidate: &T| candidate == item)
    }

    /// Removes the first element matching `predicate`.
    pub fn remove_first(&self, predicate: &dyn Fn(&T) -> bool) -> Result<bool> {
        let _write = self.write_lock.lock();
        self.check_live()?;
        let position = self.items.read().iter().position(predicate);
        match position {
            Some(index) => self.remove_at(index).map(|_| true),
            None => Ok(false),
        }
    }

    /// Overwrites the element at `index`, returning the previous element.
    pub fn set(&self, index: usize, item: T) -> Result<T> {
        let _write = self.write_lock.lock();
        self.check_live()?;
        let old_item = {
            let mut items = self.items.write();
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or(CollectionError::index_out_of_range(index, len))?;
            std::mem::replace(slot, item.clone())
        };
        self.notify(
            CollectionChange::Replace {
                index,
                new_item: item,
                old_item: old_item.clone(),
            },
            false,
        );
        Ok(old_item)
    }

    /// Moves the element at `old_index` to `new_index`.
    pub fn move_item(&self, old_index: usize, new_index: usize) -> Result<()> {
        let _write = self.write_lock.lock();
        self.check_live()?;
        let item = {
            let mut items = self.items.write();
            let len = items.len();
            if old_index >= len {
                return Err(CollectionError::index_out_of_range(old_index, len));
            }
            if new_index >= len {
                return Err(CollectionError::index_out_of_range(new_index, len));
            }
            let item = items.remove(old_index);
            items.insert(new_index, item.clone());
            item
        };
        self.notify(
            CollectionChange::Move {
                old_index,
                new_index,
                item,
            },
            false,
        );
        Ok(())
    }

    /// Removes every element.
    pub fn clear(&self) -> Result<()> {
        let _write = self.write_lock.lock();
        self.check_live()?;
        self.items.write().clear();
        self.notify(CollectionChange::Reset, true);
        Ok(())
    }

    /// Disposes the vector, notifying disposal listeners exactly once.
    ///
    /// Later mutations fail with [`CollectionError::Disposed`].
    pub fn dispose(&self) {
        if self.is_disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(target: targets::SOURCE, "observable vec disposed");
        self.disposed.emit(());
        self.collection_changed.disconnect_all();
        self.property_changed.disconnect_all();
        self.disposed.disconnect_all();
    }

    fn check_live(&self) -> Result<()> {
        if self.is_disposed() {
            Err(CollectionError::Disposed("ObservableVec"))
        } else {
            Ok(())
        }
    }

    /// Raise `change`. Called with `write_lock` held.
    fn notify(&self, change: CollectionChange<T>, count_changed: bool) {
        self.outbox.lock().push_back(Notification { change, count_changed });
        if self.notifying.swap(true, Ordering::AcqRel) {
            // A listener wrote back; the outer emit flushes this afterwards.
            return;
        }
        let _reset = NotifyReset(&self.notifying);
        while let Some(next) = self.next_notification() {
            tracing::trace!(target: targets::SOURCE, kind = %next.change.kind(), "source collection changed");
            if next.count_changed {
                self.property_changed.emit(PropertyChange::count());
            }
            self.property_changed.emit(PropertyChange::indexer());
            self.collection_changed.emit(next.change);
        }
    }

    fn next_notification(&self) -> Option<Notification<T>> {
        self.outbox.lock().pop_front()
    }
}

impl<T: Clone + Send + Sync + 'static> SourceCollection<T> for ObservableVec<T> {
    fn len(&self) -> usize {
        ObservableVec::len(self)
    }

    fn get(&self, index: usize) -> Option<T> {
        ObservableVec::get(self, index)
    }

    fn to_vec(&self) -> Vec<T> {
        ObservableVec::to_vec(self)
    }

    fn insert(&self, index: usize, item: T) -> Result<()> {
        ObservableVec::insert(self, index, item)
    }

    fn remove_at(&self, index: usize) -> Result<T> {
        ObservableVec::remove_at(self, index)
    }

    fn set(&self, index: usize, item: T) -> Result<T> {
        ObservableVec::set(self, index, item)
    }

    fn push(&self, item: T) -> Result<()> {
        ObservableVec::push(self, item)
    }

    fn clear(&self) -> Result<()> {
        ObservableVec::clear(self)
    }

    fn remove_first(&self, predicate: &dyn Fn(&T) -> bool) -> Result<bool> {
        ObservableVec::remove_first(self, predicate)
    }

    fn collection_changed(&self) -> &Signal<CollectionChange<T>> {
        &self.collection_changed
    }

    fn property_changed(&self) -> Option<&Signal<PropertyChange>> {
        Some(&self.property_changed)
    }

    fn disposed(&self) -> Option<&Signal<()>> {
        Some(&self.disposed)
    }

    fn as_move_items(&self) -> Option<&dyn MoveItems> {
        Some(self)
    }
}

impl<T: Clone + Send + Sync + 'static> MoveItems for ObservableVec<T> {
    fn move_item(&self, old_index: usize, new_index: usize) -> Result<()> {
        ObservableVec::move_item(self, old_index, new_index)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ObservableVec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableVec")
            .field("items", &*self.items.read())
            .field("is_disposed", &self.is_disposed.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recorded(vec: &ObservableVec<i32>) -> Arc<Mutex<Vec<CollectionChange<i32>>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        vec.collection_changed()
            .connect(move |change| log_clone.lock().push(change.clone()));
        log
    }

    #[test]
    fn test_mutations_raise_changes() {
        let vec = ObservableVec::from(vec![1, 2, 3]);
        let log = recorded(&vec);

        vec.push(4).unwrap();
        vec.insert(0, 0).unwrap();
        assert_eq!(vec.remove_at(1).unwrap(), 1);
        assert_eq!(vec.set(0, 10).unwrap(), 0);
        vec.move_item(2, 0).unwrap();
        vec.clear().unwrap();

        assert_eq!(
            *log.lock(),
            vec![
                CollectionChange::Add { index: 3, item: 4 },
                CollectionChange::Add { index: 0, item: 0 },
                CollectionChange::Remove { index: 1, item: 1 },
                CollectionChange::Replace {
                    index: 0,
                    new_item: 10,
                    old_item: 0
                },
                CollectionChange::Move {
                    old_index: 2,
                    new_index: 0,
                    item: 3
                },
                CollectionChange::Reset,
            ]
        );
        assert!(vec.is_empty());
    }

    #[test]
    fn test_property_changes() {
        let vec = ObservableVec::from(vec![1]);
        let names = Arc::new(Mutex::new(Vec::new()));
        let names_clone = names.clone();
        vec.property_changed()
            .connect(move |change| names_clone.lock().push(change.property_name().to_string()));

        vec.push(2).unwrap();
        vec.set(0, 5).unwrap();

        assert_eq!(*names.lock(), vec!["Count", "Item[]", "Item[]"]);
    }

    #[test]
    fn test_out_of_range() {
        let vec = ObservableVec::from(vec![1, 2]);
        let log = recorded(&vec);

        assert_eq!(
            vec.insert(3, 9),
            Err(CollectionError::IndexOutOfRange { index: 3, len: 2 })
        );
        assert!(vec.remove_at(2).is_err());
        assert!(vec.move_item(0, 2).is_err());
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_remove_by_value() {
        let vec = ObservableVec::from(vec![1, 2, 2]);
        assert!(vec.remove(&2).unwrap());
        assert!(!vec.remove(&7).unwrap());
        assert_eq!(vec.to_vec(), vec![1, 2]);
    }

    #[test]
    fn test_dispose_once() {
        let vec = ObservableVec::from(vec![1]);
        let count = Arc::new(Mutex::new(0));
        let count_clone = count.clone();
        vec.disposed().connect(move |_| *count_clone.lock() += 1);

        vec.dispose();
        vec.dispose();

        assert_eq!(*count.lock(), 1);
        assert!(vec.is_disposed());
        assert_eq!(vec.push(2), Err(CollectionError::Disposed("ObservableVec")));
    }

    #[test]
    fn test_write_back_reaches_later_listeners_in_order() {
        let vec = Arc::new(ObservableVec::from(vec![1]));
        let weak = Arc::downgrade(&vec);
        vec.collection_changed().connect(move |change| {
            if let CollectionChange::Add { item: 2, .. } = change {
                if let Some(vec) = weak.upgrade() {
                    vec.push(3).unwrap();
                }
            }
        });
        let log = recorded(&vec);
        let names = Arc::new(Mutex::new(Vec::new()));
        let names_clone = names.clone();
        vec.property_changed()
            .connect(move |change| names_clone.lock().push(change.property_name().to_string()));

        vec.push(2).unwrap();

        assert_eq!(vec.to_vec(), vec![1, 2, 3]);
        assert_eq!(
            *log.lock(),
            vec![
                CollectionChange::Add { index: 1, item: 2 },
                CollectionChange::Add { index: 2, item: 3 },
            ]
        );
        assert_eq!(*names.lock(), vec!["Count", "Item[]", "Count", "Item[]"]);

        // The flag is cleared, so the next change is raised at once.
        vec.push(4).unwrap();
        assert_eq!(log.lock().len(), 3);
    }
}
