//! Error types for Lattice Projection core.

use std::fmt;

/// Errors raised when handing work to an execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The dispatcher has been shut down and no longer accepts work.
    ShutDown,
    /// The operation must be performed on the dispatcher's own thread.
    WrongThread,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShutDown => write!(f, "Dispatcher has been shut down"),
            Self::WrongThread => {
                write!(f, "Operation must be performed on the dispatcher's thread")
            }
        }
    }
}

impl std::error::Error for DispatchError {}

/// Signal-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// The connection ID is invalid or has already been disconnected.
    InvalidConnection,
    /// Failed to queue the slot invocation onto its execution context.
    QueueFailed(DispatchError),
}

impl fmt::Display for SignalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConnection => write!(f, "Invalid or disconnected connection ID"),
            Self::QueueFailed(err) => write!(f, "Failed to queue signal invocation: {err}"),
        }
    }
}

impl std::error::Error for SignalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::QueueFailed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DispatchError> for SignalError {
    fn from(err: DispatchError) -> Self {
        Self::QueueFailed(err)
    }
}

/// A specialized Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
