//! Notification Channel
//!
//! A Channel is the publish/subscribe primitive every node and key signal
//! is built from. It holds an ordered list of listeners for one value type.
//!
//! # How Channels Work
//!
//! 1. `subscribe` appends a listener and hands back a [`Disposer`].
//!
//! 2. `emit` takes a snapshot of the listener list, releases the lock and
//!    invokes every listener in subscription order.
//!
//! 3. Disposing removes exactly that listener. Because dispatch iterates a
//!    snapshot, a listener removed mid-dispatch may still run for the emit in
//!    progress, but never for a later one.
//!
//! # Known Limitation
//!
//! There is no error isolation between listeners: a panicking listener
//! aborts the rest of that dispatch.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

/// Unique identifier for a listener.
///
/// Used to remove exactly the listener a disposer was created for, even when
/// the same closure is subscribed more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

/// A shared listener callback.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

type ListenerList<T> = RwLock<Vec<(ListenerId, Listener<T>)>>;

/// An ordered list of listeners for values of type `T`.
///
/// Clones share the same listener list.
///
/// # Example
///
/// ```rust,ignore
/// let channel = Channel::new();
/// let disposer = channel.subscribe(|value: &i32| println!("got {value}"));
///
/// channel.emit(&1); // prints "got 1"
/// disposer.dispose();
/// channel.emit(&2); // prints nothing
/// ```
pub struct Channel<T: 'static> {
    listeners: Arc<ListenerList<T>>,
}

impl<T: 'static> Channel<T> {
    /// Create a channel with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Append a listener; it runs after every listener subscribed before it.
    pub fn subscribe<F>(&self, listener: F) -> Disposer
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_shared(Arc::new(listener))
    }

    /// Append an already shared listener.
    ///
    /// The tracking context uses this to attach one callback to many keys.
    pub fn subscribe_shared(&self, listener: Listener<T>) -> Disposer {
        let id = ListenerId::new();
        self.listeners.write().push((id, listener));

        let listeners: Weak<ListenerList<T>> = Arc::downgrade(&self.listeners);
        Disposer::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.write().retain(|(listener_id, _)| *listener_id != id);
            }
        })
    }

    /// Invoke every current listener with `value`, in subscription order.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            listener(value);
        }
    }

    /// Number of listeners currently subscribed.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl<T: 'static> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl<T: 'static> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

/// Removes a subscription when invoked.
///
/// Disposing is idempotent: the second and later calls do nothing. Dropping
/// a disposer without calling [`Disposer::dispose`] leaves the subscription
/// in place.
#[must_use = "dropping a Disposer keeps the listener subscribed forever"]
pub struct Disposer {
    dispose: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Disposer {
    /// Wrap a cleanup action that runs at most once.
    pub fn new<F>(dispose: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            dispose: Mutex::new(Some(Box::new(dispose))),
        }
    }

    /// A disposer that does nothing.
    pub fn noop() -> Self {
        Self {
            dispose: Mutex::new(None),
        }
    }

    /// Combine several disposers into one that disposes each of them.
    pub fn combine(disposers: Vec<Disposer>) -> Self {
        Self::new(move || {
            for disposer in &disposers {
                disposer.dispose();
            }
        })
    }

    /// Run the cleanup action if it has not run yet.
    pub fn dispose(&self) {
        // Take the action out before running it so a re-entrant dispose
        // from inside the action finds nothing left to do.
        let action = self.dispose.lock().take();
        if let Some(action) = action {
            action();
        }
    }

    /// Whether the cleanup action has already run (or there never was one).
    pub fn is_disposed(&self) -> bool {
        self.dispose.lock().is_none()
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn listener_ids_are_unique() {
        let id1 = ListenerId::new();
        let id2 = ListenerId::new();
        let id3 = ListenerId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn emit_reaches_listeners_in_order() {
        let channel = Channel::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = seen.clone();
        let _a = channel.subscribe(move |value: &i32| first.lock().push(("a", *value)));
        let second = seen.clone();
        let _b = channel.subscribe(move |value: &i32| second.lock().push(("b", *value)));

        channel.emit(&7);
        assert_eq!(*seen.lock(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn dispose_is_idempotent_and_silences_listener() {
        let channel = Channel::new();
        let result = Arc::new(AtomicI32::new(0));
        let result_clone = result.clone();

        let disposer = channel.subscribe(move |value: &i32| {
            result_clone.store(*value, Ordering::SeqCst);
        });

        channel.emit(&1);
        disposer.dispose();
        disposer.dispose();
        channel.emit(&2);

        assert_eq!(result.load(Ordering::SeqCst), 1);
        assert!(disposer.is_disposed());
        assert_eq!(channel.listener_count(), 0);
    }

    #[test]
    fn dispose_removes_only_its_own_listener() {
        let channel = Channel::new();
        let count = Arc::new(AtomicI32::new(0));

        let listener: Listener<()> = {
            let count = count.clone();
            Arc::new(move |_: &()| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        let first = channel.subscribe_shared(listener.clone());
        let _second = channel.subscribe_shared(listener);

        first.dispose();
        channel.emit(&());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disposing_during_dispatch_does_not_crash() {
        let channel: Channel<()> = Channel::new();
        let count = Arc::new(AtomicI32::new(0));
        let slot: Arc<Mutex<Option<Disposer>>> = Arc::new(Mutex::new(None));

        let slot_clone = slot.clone();
        let first = channel.subscribe(move |_| {
            if let Some(disposer) = slot_clone.lock().as_ref() {
                disposer.dispose();
            }
        });
        let count_clone = count.clone();
        *slot.lock() = Some(channel.subscribe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        channel.emit(&());
        channel.emit(&());

        // Ran at most once, during the emit that disposed it.
        assert!(count.load(Ordering::SeqCst) <= 1);
        first.dispose();
        assert_eq!(channel.listener_count(), 0);
    }

    #[test]
    fn combined_disposer_disposes_all() {
        let channel: Channel<()> = Channel::new();
        let disposers = vec![channel.subscribe(|_| {}), channel.subscribe(|_| {})];
        assert_eq!(channel.listener_count(), 2);

        let combined = Disposer::combine(disposers);
        combined.dispose();
        combined.dispose();
        assert_eq!(channel.listener_count(), 0);
    }

    #[test]
    fn disposer_outliving_channel_is_harmless() {
        let channel: Channel<()> = Channel::new();
        let disposer = channel.subscribe(|_| {});
        drop(channel);
        disposer.dispose();
        assert!(disposer.is_disposed());
    }

    #[test]
    fn noop_disposer_is_already_disposed() {
        let disposer = Disposer::noop();
        assert!(disposer.is_disposed());
        disposer.dispose();
    }
}
