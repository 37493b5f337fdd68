//! Thread ownership of execution contexts.
//!
//! An execution context is owned by exactly one thread. [`ThreadAffinity`]
//! remembers that thread so a context can tell whether its caller is already
//! on it, which decides between running work inline and posting it.
//!
//! ```
//! use lattice_projection_core::thread_check::ThreadAffinity;
//!
//! let affinity = ThreadAffinity::current();
//! assert!(affinity.is_same_thread());
//!
//! let elsewhere = std::thread::spawn(move || affinity.is_same_thread())
//!     .join()
//!     .unwrap();
//! assert!(!elsewhere);
//! ```

use std::thread::ThreadId;

/// The thread an execution context belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadAffinity {
    owner: ThreadId,
}

impl ThreadAffinity {
    /// Bind to the calling thread.
    #[inline]
    pub fn current() -> Self {
        Self {
            owner: std::thread::current().id(),
        }
    }

    /// The owning thread.
    #[inline]
    pub fn thread_id(&self) -> ThreadId {
        self.owner
    }

    /// Whether the caller runs on the owning thread.
    #[inline]
    pub fn is_same_thread(&self) -> bool {
        std::thread::current().id() == self.owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_is_the_binding_thread() {
        let affinity = ThreadAffinity::current();
        assert!(affinity.is_same_thread());
        assert_eq!(affinity.thread_id(), std::thread::current().id());
    }

    #[test]
    fn test_other_threads_are_not_the_owner() {
        let affinity = ThreadAffinity::current();
        let (seen_as_owner, other) = std::thread::spawn(move || {
            (affinity.is_same_thread(), std::thread::current().id())
        })
        .join()
        .unwrap();

        assert!(!seen_as_owner);
        assert_ne!(affinity.thread_id(), other);
    }
}
