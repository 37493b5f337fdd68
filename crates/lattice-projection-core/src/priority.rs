//! Dispatch priorities and the prioritized work queue entry.

use crate::invocation::QueuedInvocation;

/// Priority levels for work posted to an execution context.
///
/// Higher priority work is processed first. Work posted at the same priority
/// runs in the order it was posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum DispatchPriority {
    /// Runs only when nothing else is pending.
    Idle = 0,
    /// Background bookkeeping.
    Background = 1,
    /// Most notifications, including collection changes.
    #[default]
    Normal = 2,
    /// Input-like work that should overtake normal notifications.
    High = 3,
    /// Shutdown and other work that must run next.
    Critical = 4,
}

/// A queued invocation tagged with its priority and posting order.
pub(crate) struct PrioritizedWork {
    pub invocation: QueuedInvocation,
    pub priority: DispatchPriority,
    /// Sequence number for stable ordering of same-priority work.
    pub sequence: u64,
}

impl PrioritizedWork {
    pub fn new(invocation: QueuedInvocation, priority: DispatchPriority, sequence: u64) -> Self {
        Self {
            invocation,
            priority,
            sequence,
        }
    }
}

impl PartialEq for PrioritizedWork {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for PrioritizedWork {}

impl PartialOrd for PrioritizedWork {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrioritizedWork {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap: higher priority first, then lower sequence.
        match self.priority.cmp(&other.priority) {
            std::cmp::Ordering::Equal => other.sequence.cmp(&self.sequence),
            ord => ord,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    fn work(priority: DispatchPriority, sequence: u64) -> PrioritizedWork {
        PrioritizedWork::new(QueuedInvocation::new(|| {}), priority, sequence)
    }

    #[test]
    fn test_priority_default_is_normal() {
        assert_eq!(DispatchPriority::default(), DispatchPriority::Normal);
        assert!(DispatchPriority::Critical > DispatchPriority::High);
        assert!(DispatchPriority::Idle < DispatchPriority::Background);
    }

    #[test]
    fn test_heap_order() {
        let mut heap = BinaryHeap::new();
        heap.push(work(DispatchPriority::Normal, 0));
        heap.push(work(DispatchPriority::Normal, 1));
        heap.push(work(DispatchPriority::High, 2));
        heap.push(work(DispatchPriority::Idle, 3));

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|w| w.sequence)).collect();
        assert_eq!(order, vec![2, 0, 1, 3]);
    }
}
