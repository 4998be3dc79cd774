//! Worker slot accounting
//!
//! A slot is reserved when the poller hands a task to the workers and
//! released when the worker finishes with it. The busy count therefore
//! covers tasks waiting in the hand-off queue as well as running ones, which
//! keeps `picked <= idle <= free queue capacity` exact.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Lock-free busy count over a fixed number of slots
#[derive(Debug)]
pub struct SlotTracker {
    total: usize,
    busy: AtomicUsize,
}

impl SlotTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            busy: AtomicUsize::new(0),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Slots currently reserved
    pub fn busy(&self) -> usize {
        self.busy.load(Ordering::Acquire)
    }

    /// Slots free for new work
    pub fn idle(&self) -> usize {
        self.total.saturating_sub(self.busy())
    }

    /// Reserve one slot, or `None` when all are busy
    ///
    /// The returned guard releases the slot when dropped.
    pub fn try_reserve(self: &Arc<Self>) -> Option<SlotGuard> {
        self.busy
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |busy| {
                (busy < self.total).then_some(busy + 1)
            })
            .ok()
            .map(|_| SlotGuard {
                tracker: Arc::clone(self),
            })
    }
}

/// Reserved slot, released on drop
#[derive(Debug)]
#[must_use = "the slot is released as soon as the guard is dropped"]
pub struct SlotGuard {
    tracker: Arc<SlotTracker>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.tracker.busy.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let slots = Arc::new(SlotTracker::new(3));
        assert_eq!(slots.total(), 3);
        assert_eq!(slots.busy(), 0);
        assert_eq!(slots.idle(), 3);
    }

    #[test]
    fn test_reserve_until_full() {
        let slots = Arc::new(SlotTracker::new(2));

        let a = slots.try_reserve();
        let b = slots.try_reserve();
        assert!(a.is_some());
        assert!(b.is_some());
        assert_eq!(slots.idle(), 0);

        assert!(slots.try_reserve().is_none());
        assert_eq!(slots.busy(), 2);
    }

    #[test]
    fn test_guard_drop_releases() {
        let slots = Arc::new(SlotTracker::new(1));

        let guard = slots.try_reserve().unwrap();
        assert_eq!(slots.busy(), 1);

        drop(guard);
        assert_eq!(slots.busy(), 0);
        assert!(slots.try_reserve().is_some());
    }

    #[test]
    fn test_guard_released_on_panic() {
        let slots = Arc::new(SlotTracker::new(1));
        let inner = Arc::clone(&slots);

        let result = std::panic::catch_unwind(move || {
            let _guard = inner.try_reserve().unwrap();
            panic!("handler blew up");
        });

        assert!(result.is_err());
        assert_eq!(slots.busy(), 0);
    }

    #[test]
    fn test_concurrent_reservations_never_exceed_total() {
        let slots = Arc::new(SlotTracker::new(4));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let slots = Arc::clone(&slots);
                std::thread::spawn(move || slots.try_reserve())
            })
            .collect();

        let guards: Vec<_> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();

        assert_eq!(guards.len(), 4);
        assert_eq!(slots.busy(), 4);

        drop(guards);
        assert_eq!(slots.busy(), 0);
    }
}
