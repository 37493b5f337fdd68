//! Error types for projected collections.

use lattice_projection_core::DispatchError;

/// Result type alias for collection operations.
pub type Result<T> = std::result::Result<T, CollectionError>;

/// Errors that can occur while building, reading, or writing through a
/// collection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectionError {
    /// A required collaborator is missing or lacks a required capability.
    #[error("Invalid argument '{argument}': {message}")]
    InvalidArgument {
        argument: &'static str,
        message: String,
    },

    /// An index did not address an element (or insertion point) of the collection.
    #[error("Index {index} is out of range for a collection of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// The collection has been disposed.
    #[error("Cannot access a disposed {0}")]
    Disposed(&'static str),

    /// Work could not be handed to the execution context.
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

impl CollectionError {
    /// Create an invalid-argument error.
    pub fn invalid_argument(argument: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument,
            message: message.into(),
        }
    }

    /// Create an index error.
    pub fn index_out_of_range(index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { index, len }
    }
}
