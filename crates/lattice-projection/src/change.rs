//! Change notifications raised by observable collections.

use std::fmt;
use std::sync::Arc;

/// A structured description of one mutation of an ordered collection.
///
/// The set of kinds is closed: every observable collection in this crate
/// describes its mutations with exactly these five variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionChange<T> {
    /// `item` was inserted at `index`.
    Add { index: usize, item: T },
    /// `item` was removed from `index`.
    Remove { index: usize, item: T },
    /// The element at `index` was overwritten.
    Replace {
        index: usize,
        new_item: T,
        old_item: T,
    },
    /// `item` moved from `old_index` to `new_index`.
    Move {
        old_index: usize,
        new_index: usize,
        item: T,
    },
    /// The collection changed wholesale; listeners should re-read it.
    Reset,
}

impl<T> CollectionChange<T> {
    /// The kind of this change, without its payload.
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Add { .. } => ChangeKind::Add,
            Self::Remove { .. } => ChangeKind::Remove,
            Self::Replace { .. } => ChangeKind::Replace,
            Self::Move { .. } => ChangeKind::Move,
            Self::Reset => ChangeKind::Reset,
        }
    }
}

/// Payload-free discriminant of a [`CollectionChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Add,
    Remove,
    Replace,
    Move,
    Reset,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Replace => "replace",
            Self::Move => "move",
            Self::Reset => "reset",
        };
        f.write_str(name)
    }
}

/// Notification that a named property of a collection changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyChange {
    property_name: Arc<str>,
}

impl PropertyChange {
    /// Property name raised when the element count changes.
    pub const COUNT: &'static str = "Count";
    /// Property name raised when any indexed element changes.
    pub const INDEXER: &'static str = "Item[]";

    /// Create a notification for the given property.
    pub fn new(property_name: impl Into<Arc<str>>) -> Self {
        Self {
            property_name: property_name.into(),
        }
    }

    /// Notification for [`COUNT`](Self::COUNT).
    pub fn count() -> Self {
        Self::new(Self::COUNT)
    }

    /// Notification for [`INDEXER`](Self::INDEXER).
    pub fn indexer() -> Self {
        Self::new(Self::INDEXER)
    }

    /// The name of the property that changed.
    pub fn property_name(&self) -> &str {
        &self.property_name
    }
}
