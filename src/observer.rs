//! Multi-subscriber notification
//!
//! `Subscribers` keeps weak handles to its observers, so a subscription
//! never keeps an observer alive. Observers that were dropped are pruned on
//! the next notification. Every observer is upgraded right before it is
//! called: that upgrade is the liveness check, and an observer that has gone
//! away in the middle of a fan-out is simply skipped.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::warn;

/// Handle returned by [`Subscribers::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// An ordered list of weakly held observers
pub struct Subscribers<T: ?Sized> {
    entries: Vec<(SubscriptionId, Weak<RefCell<T>>)>,
    next_id: u64,
}

impl<T: ?Sized> Subscribers<T> {
    /// Create an empty subscriber list
    pub fn new() -> Self {
        Subscribers {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// Add an observer; it is notified after every existing one
    pub fn subscribe(&mut self, observer: &Rc<RefCell<T>>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, Rc::downgrade(observer)));
        id
    }

    /// Remove an observer; returns whether it was subscribed
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    /// Remove every observer
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of live observers
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|(_, weak)| weak.strong_count() > 0).count()
    }

    /// Check if no live observer remains
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call `f` for every live observer, in subscription order.
    ///
    /// The fan-out stops as soon as `f` returns `false`; the return value
    /// tells whether it ran to the end. An observer that is already borrowed
    /// (it is re-entering the notifier) is skipped.
    pub fn notify<F>(&mut self, mut f: F) -> bool
    where
        F: FnMut(&mut T) -> bool,
    {
        self.entries.retain(|(_, weak)| weak.strong_count() > 0);

        // Work on a snapshot so a callback reaching back into this list
        // cannot invalidate the iteration.
        let snapshot: Vec<Weak<RefCell<T>>> = self.entries.iter().map(|(_, weak)| weak.clone()).collect();

        for weak in snapshot {
            let Some(alive) = weak.upgrade() else {
                continue;
            };
            let Ok(mut observer) = alive.try_borrow_mut() else {
                warn!("observer is busy, skipping notification");
                continue;
            };
            if !f(&mut *observer) {
                return false;
            }
        }
        true
    }
}

impl<T: ?Sized> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> std::fmt::Debug for Subscribers<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Counter {
        fn hit(&mut self) -> usize;
    }

    #[derive(Default)]
    struct Hits(usize);

    impl Counter for Hits {
        fn hit(&mut self) -> usize {
            self.0 += 1;
            self.0
        }
    }

    #[test]
    fn test_notify_in_order() {
        let mut subs: Subscribers<Vec<u32>> = Subscribers::new();
        let a = Rc::new(RefCell::new(Vec::new()));
        let b = Rc::new(RefCell::new(Vec::new()));
        subs.subscribe(&a);
        subs.subscribe(&b);

        let mut order = 0;
        assert!(subs.notify(|v| {
            order += 1;
            v.push(order);
            true
        }));
        assert_eq!(*a.borrow(), vec![1]);
        assert_eq!(*b.borrow(), vec![2]);
    }

    #[test]
    fn test_dropped_observer_pruned() {
        let mut subs: Subscribers<dyn Counter> = Subscribers::new();
        let kept: Rc<RefCell<dyn Counter>> = Rc::new(RefCell::new(Hits::default()));
        let dropped: Rc<RefCell<dyn Counter>> = Rc::new(RefCell::new(Hits::default()));
        subs.subscribe(&kept);
        subs.subscribe(&dropped);
        assert_eq!(subs.len(), 2);

        drop(dropped);
        assert_eq!(subs.len(), 1);

        let mut calls = 0;
        subs.notify(|c| {
            calls += c.hit();
            true
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_stop_fan_out() {
        let mut subs: Subscribers<Hits> = Subscribers::new();
        let a = Rc::new(RefCell::new(Hits::default()));
        let b = Rc::new(RefCell::new(Hits::default()));
        subs.subscribe(&a);
        subs.subscribe(&b);

        assert!(!subs.notify(|h| {
            h.hit();
            false
        }));
        assert_eq!(a.borrow().0, 1);
        assert_eq!(b.borrow().0, 0);
    }

    #[test]
    fn test_unsubscribe() {
        let mut subs: Subscribers<Hits> = Subscribers::new();
        let a = Rc::new(RefCell::new(Hits::default()));
        let id = subs.subscribe(&a);

        assert!(subs.unsubscribe(id));
        assert!(!subs.unsubscribe(id));
        assert!(subs.is_empty());
    }

    #[test]
    fn test_busy_observer_skipped() {
        let mut subs: Subscribers<Hits> = Subscribers::new();
        let a = Rc::new(RefCell::new(Hits::default()));
        subs.subscribe(&a);

        let _held = a.borrow_mut();
        let mut calls = 0;
        assert!(subs.notify(|_| {
            calls += 1;
            true
        }));
        assert_eq!(calls, 0);
    }
}
