//! Multi-subscriber observer lists
//!
//! [`Event<A>`] is an ordered list of handlers invoked synchronously with a
//! mutable reference to an argument. Handlers run in registration order.
//!
//! An event that lives inside the value it passes to its handlers (for
//! example a player raising `on_frame` with itself as the argument) cannot be
//! iterated while that value is mutably borrowed. For that case the owner
//! [`detach`](Event::detach)es the handler list, invokes the snapshot, and
//! [`reattach`](Event::reattach)es it:
//!
//! ```rust
//! use vmp_common::events::Event;
//!
//! struct Counter {
//!     hits: u32,
//!     on_hit: Event<Counter>,
//! }
//!
//! impl Counter {
//!     fn hit(&mut self) {
//!         let mut handlers = self.on_hit.detach();
//!         handlers.invoke(self);
//!         self.on_hit.reattach(handlers);
//!     }
//! }
//!
//! let mut counter = Counter { hits: 0, on_hit: Event::new() };
//! counter.on_hit.subscribe(|c: &mut Counter| c.hits += 1);
//! counter.hit();
//! assert_eq!(counter.hits, 1);
//! ```
//!
//! Handlers subscribed during a dispatch are appended after the snapshot and
//! first run on the next dispatch. Unsubscribing a handler that is part of
//! the running snapshot is deferred until the snapshot is reattached.

use std::fmt;

/// Handle returned by [`Event::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler<A> = Box<dyn FnMut(&mut A)>;

/// Ordered list of subscriber closures
pub struct Event<A: ?Sized> {
    handlers: Vec<(SubscriptionId, Handler<A>)>,
    next_id: u64,
    /// True while the handler list is detached for dispatch
    dispatching: bool,
    /// Ids in the detached snapshot not yet asked to unsubscribe
    detached_ids: Vec<SubscriptionId>,
    /// Unsubscribe requests for handlers that were detached at the time
    deferred_removals: Vec<SubscriptionId>,
}

impl<A: ?Sized> Event<A> {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            next_id: 0,
            dispatching: false,
            detached_ids: Vec::new(),
            deferred_removals: Vec::new(),
        }
    }

    /// Add a handler at the end of the list
    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&mut A) + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Remove a handler
    ///
    /// Returns `true` if the handler was registered. While detached for
    /// dispatch, removal of a snapshot handler is recorded and applied on
    /// [`reattach`](Event::reattach).
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        if let Some(index) = self.handlers.iter().position(|(hid, _)| *hid == id) {
            self.handlers.remove(index);
            return true;
        }
        if let Some(index) = self.detached_ids.iter().position(|hid| *hid == id) {
            self.detached_ids.swap_remove(index);
            self.deferred_removals.push(id);
            return true;
        }
        false
    }

    /// Number of registered handlers (excluding a detached snapshot)
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Remove every handler
    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Invoke every handler in registration order
    pub fn invoke(&mut self, arg: &mut A) {
        for (_, handler) in self.handlers.iter_mut() {
            handler(arg);
        }
    }

    /// Take the handler list out for dispatch, leaving an empty list that
    /// keeps accepting subscriptions
    pub fn detach(&mut self) -> Event<A> {
        self.dispatching = true;
        let handlers = std::mem::take(&mut self.handlers);
        self.detached_ids = handlers.iter().map(|(id, _)| *id).collect();
        Event {
            handlers,
            next_id: self.next_id,
            dispatching: false,
            detached_ids: Vec::new(),
            deferred_removals: Vec::new(),
        }
    }

    /// Put a detached handler list back in front of any handlers added
    /// during the dispatch, then apply deferred removals
    pub fn reattach(&mut self, mut dispatched: Event<A>) {
        let added = std::mem::take(&mut self.handlers);
        dispatched.handlers.extend(added);
        self.handlers = dispatched.handlers;
        self.dispatching = false;
        self.detached_ids.clear();

        for id in self.deferred_removals.drain(..) {
            self.handlers.retain(|(hid, _)| *hid != id);
        }
    }
}

impl<A: ?Sized> Default for Event<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ?Sized> fmt::Debug for Event<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("handlers", &self.handlers.len())
            .field("dispatching", &self.dispatching)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_handlers_run_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut event: Event<u32> = Event::new();

        for tag in ["a", "b", "c"] {
            let log = Rc::clone(&log);
            event.subscribe(move |value: &mut u32| {
                *value += 1;
                log.borrow_mut().push(tag);
            });
        }

        let mut value = 0;
        event.invoke(&mut value);
        assert_eq!(value, 3);
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unsubscribe() {
        let mut event: Event<u32> = Event::new();
        let first = event.subscribe(|v: &mut u32| *v += 1);
        event.subscribe(|v: &mut u32| *v += 10);

        assert!(event.unsubscribe(first));
        assert!(!event.unsubscribe(first));

        let mut value = 0;
        event.invoke(&mut value);
        assert_eq!(value, 10);
        assert_eq!(event.len(), 1);
    }

    struct Owner {
        calls: Vec<&'static str>,
        on_ping: Event<Owner>,
        late: Option<SubscriptionId>,
    }

    impl Owner {
        fn ping(&mut self) {
            let mut handlers = self.on_ping.detach();
            handlers.invoke(self);
            self.on_ping.reattach(handlers);
        }
    }

    #[test]
    fn test_subscribe_during_dispatch_runs_next_time() {
        let mut owner = Owner {
            calls: Vec::new(),
            on_ping: Event::new(),
            late: None,
        };
        owner.on_ping.subscribe(|o: &mut Owner| {
            o.calls.push("first");
            if o.late.is_none() {
                let id = o.on_ping.subscribe(|o: &mut Owner| o.calls.push("late"));
                o.late = Some(id);
            }
        });

        owner.ping();
        assert_eq!(owner.calls, vec!["first"]);

        owner.ping();
        assert_eq!(owner.calls, vec!["first", "first", "late"]);
        assert_eq!(owner.on_ping.len(), 2);
    }

    #[test]
    fn test_unsubscribe_during_dispatch_is_deferred() {
        let mut owner = Owner {
            calls: Vec::new(),
            on_ping: Event::new(),
            late: None,
        };
        let second = owner.on_ping.subscribe(|o: &mut Owner| o.calls.push("second"));
        let first = owner.on_ping.subscribe(move |o: &mut Owner| {
            o.calls.push("first");
            o.on_ping.unsubscribe(second);
        });
        // first was registered after second, so it runs second in the list
        assert!(first > second);

        owner.ping();
        // The snapshot still runs in full
        assert_eq!(owner.calls, vec!["second", "first"]);

        owner.ping();
        assert_eq!(owner.calls, vec!["second", "first", "first"]);
        assert_eq!(owner.on_ping.len(), 1);
    }

    #[test]
    fn test_unsubscribe_during_dispatch_only_for_snapshot_handlers() {
        let mut event: Event<u32> = Event::new();
        let gone = event.subscribe(|v: &mut u32| *v += 100);
        let kept = event.subscribe(|v: &mut u32| *v += 1);
        assert!(event.unsubscribe(gone));

        let mut snapshot = event.detach();
        assert!(!event.unsubscribe(gone));
        assert!(!event.unsubscribe(SubscriptionId(99)));
        assert!(event.unsubscribe(kept));
        assert!(!event.unsubscribe(kept));

        let mut value = 0;
        snapshot.invoke(&mut value);
        assert_eq!(value, 1);
        event.reattach(snapshot);

        assert!(event.is_empty());
        assert!(!event.unsubscribe(kept));
    }
}
