//! Single-threaded publish/subscribe with history replay.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// Handle returned by [`Publisher::monitor`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber<T> = (SubscriptionId, Box<dyn FnMut(&T)>);

struct Inner<T> {
    history: RefCell<Vec<T>>,
    subscribers: RefCell<Vec<Subscriber<T>>>,
    removed: RefCell<Vec<SubscriptionId>>,
    pending: RefCell<VecDeque<T>>,
    publishing: Cell<bool>,
    next_id: Cell<u64>,
}

/// Delivers every pushed value to all subscribers. New subscribers first
/// receive everything published so far. Values pushed from inside a
/// subscriber are queued and delivered after the current value.
pub struct Publisher<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> Default for Publisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Publisher<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                history: RefCell::new(Vec::new()),
                subscribers: RefCell::new(Vec::new()),
                removed: RefCell::new(Vec::new()),
                pending: RefCell::new(VecDeque::new()),
                publishing: Cell::new(false),
                next_id: Cell::new(0),
            }),
        }
    }

    pub fn monitor(&self, mut subscriber: impl FnMut(&T) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);
        // Values still queued will reach the new subscriber when delivered.
        let queued = self.inner.pending.borrow().len();
        let history = self.inner.history.borrow().clone();
        for value in &history[..history.len() - queued] {
            subscriber(value);
        }
        self.inner
            .subscribers
            .borrow_mut()
            .push((id, Box::new(subscriber)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.removed.borrow_mut().push(id);
        self.inner.subscribers.borrow_mut().retain(|(s, _)| *s != id);
    }

    pub fn push(&self, value: T) {
        self.inner.history.borrow_mut().push(value.clone());
        self.inner.pending.borrow_mut().push_back(value);
        if self.inner.publishing.replace(true) {
            return;
        }
        loop {
            let next = self.inner.pending.borrow_mut().pop_front();
            let Some(value) = next else {
                break;
            };
            // Subscribers may monitor or unsubscribe while being called.
            let mut active = std::mem::take(&mut *self.inner.subscribers.borrow_mut());
            for (_, subscriber) in active.iter_mut() {
                subscriber(&value);
            }
            let removed = std::mem::take(&mut *self.inner.removed.borrow_mut());
            active.retain(|(id, _)| !removed.contains(id));
            let mut subscribers = self.inner.subscribers.borrow_mut();
            active.append(&mut subscribers);
            *subscribers = active;
        }
        self.inner.publishing.set(false);
    }

    /// Everything published so far.
    pub fn history(&self) -> Vec<T> {
        self.inner.history.borrow().clone()
    }

    pub fn last(&self) -> Option<T> {
        self.inner.history.borrow().last().cloned()
    }
}

impl<T: fmt::Debug> fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("history", &self.inner.history.borrow())
            .field("subscribers", &self.inner.subscribers.borrow().len())
            .finish()
    }
}
