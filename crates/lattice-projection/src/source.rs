//! Contracts between projected collections and the collaborators they wrap.
//!
//! - [`SourceCollection`] is what a projection observes and writes through.
//! - [`MoveItems`] is the optional in-place move capability of a source.
//! - [`BackingSource`] lets a projection element name the source value it
//!   was derived from, which drives the default reverse conversion.
//! - [`Disposable`] marks projection elements that own resources.

use lattice_projection_core::Signal;

use crate::change::{CollectionChange, PropertyChange};
use crate::error::Result;

/// An ordered, mutable, observable sequence of elements.
///
/// Implementations raise exactly one [`CollectionChange`] per mutation on
/// [`collection_changed`](Self::collection_changed), in the order the
/// mutations happened, from whichever thread performed them.
pub trait SourceCollection<T>: Send + Sync {
    /// Number of elements.
    fn len(&self) -> usize;

    /// Returns `true` if the collection holds no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A clone of the element at `index`.
    fn get(&self, index: usize) -> Option<T>;

    /// A snapshot of every element, in order.
    fn to_vec(&self) -> Vec<T>;

    /// Returns `true` if the collection rejects structural mutation.
    fn is_read_only(&self) -> bool {
        false
    }

    /// Insert `item` at `index`.
    fn insert(&self, index: usize, item: T) -> Result<()>;

    /// Remove and return the element at `index`.
    fn remove_at(&self, index: usize) -> Result<T>;

    /// Overwrite the element at `index`, returning the previous element.
    fn set(&self, index: usize, item: T) -> Result<T>;

    /// Append `item`.
    fn push(&self, item: T) -> Result<()>;

    /// Remove every element.
    fn clear(&self) -> Result<()>;

    /// Remove the first element matching `predicate`.
    ///
    /// Returns `true` if an element was removed.
    fn remove_first(&self, predicate: &dyn Fn(&T) -> bool) -> Result<bool>;

    /// Structured change notifications.
    fn collection_changed(&self) -> &Signal<CollectionChange<T>>;

    /// Property-change notifications, or `None` if the collection does not
    /// raise them.
    fn property_changed(&self) -> Option<&Signal<PropertyChange>>;

    /// Raised once when the collection itself is disposed, if it ever is.
    fn disposed(&self) -> Option<&Signal<()>> {
        None
    }

    /// The collection's in-place move capability, if it has one.
    fn as_move_items(&self) -> Option<&dyn MoveItems> {
        None
    }
}

/// In-place move of one element from `old_index` to `new_index`.
pub trait MoveItems: Send + Sync {
    /// Move the element at `old_index` so that it ends up at `new_index`.
    fn move_item(&self, old_index: usize, new_index: usize) -> Result<()>;
}

/// Access to the source value a projection element was derived from.
///
/// Elements created before they are bound to any source value return `None`.
/// The reference must survive disposal of the element.
pub trait BackingSource<S> {
    /// The backing source value, if any.
    fn backing_source(&self) -> Option<S>;
}

/// A projection element that owns resources released on removal.
pub trait Disposable {
    /// Release the element's resources.
    fn dispose(&self);
}

impl<T: Disposable + ?Sized> Disposable for std::sync::Arc<T> {
    fn dispose(&self) {
        (**self).dispose();
    }
}

impl<S, T: BackingSource<S> + ?Sized> BackingSource<S> for std::sync::Arc<T> {
    fn backing_source(&self) -> Option<S> {
        (**self).backing_source()
    }
}
