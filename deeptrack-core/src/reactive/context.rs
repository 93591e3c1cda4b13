//! Tracking Context
//!
//! The tracking context records which keys are read while a tracked
//! computation runs, so that the computation's change callback can be
//! attached to every one of them.
//!
//! # Implementation
//!
//! Each thread owns at most one active session in a thread-local slot.
//! Independent threads therefore never see each other's dependencies.
//! Nesting does not stack: while a session is active, a nested [`track`]
//! just runs its action and subscribes nothing.
//!
//! The session is cleared by a drop guard, so it is torn down even if the
//! tracked action panics. Subscriptions made before the panic are removed
//! along with it.

use std::cell::RefCell;
use std::sync::Arc;

use tracing::trace;

use super::channel::{Disposer, Listener};
use crate::proxy::Wrapped;

thread_local! {
    static SESSION: RefCell<Option<Session>> = const { RefCell::new(None) };
}

/// The state of the active tracking session.
struct Session {
    /// Callback attached to every key read during the session.
    listener: Listener<Wrapped>,
    /// Disposers accumulated by reads, in read order.
    disposers: Vec<Disposer>,
}

/// Guard that clears the session when dropped.
pub struct TrackingContext {
    _private: (),
}

impl TrackingContext {
    /// Start a session on this thread.
    ///
    /// Returns `None` when a session is already active.
    pub fn enter(listener: Listener<Wrapped>) -> Option<Self> {
        SESSION.with(|session| {
            let mut session = session.borrow_mut();
            if session.is_some() {
                return None;
            }
            *session = Some(Session {
                listener,
                disposers: Vec::new(),
            });
            Some(Self { _private: () })
        })
    }

    /// Check if a session is active on this thread.
    pub fn is_active() -> bool {
        SESSION.with(|session| session.borrow().is_some())
    }

    /// The active session's listener, if any.
    pub fn current_listener() -> Option<Listener<Wrapped>> {
        SESSION.with(|session| {
            session
                .borrow()
                .as_ref()
                .map(|session| session.listener.clone())
        })
    }

    /// Record a subscription made on behalf of the active session.
    ///
    /// Without an active session the subscription is removed immediately.
    pub fn record(disposer: Disposer) {
        let leftover = SESSION.with(|session| match session.borrow_mut().as_mut() {
            Some(session) => {
                session.disposers.push(disposer);
                None
            }
            None => Some(disposer),
        });
        if let Some(disposer) = leftover {
            disposer.dispose();
        }
    }

    /// End the session and take the disposers it accumulated.
    pub fn finish(self) -> Vec<Disposer> {
        SESSION.with(|session| {
            session
                .borrow_mut()
                .as_mut()
                .map(|session| std::mem::take(&mut session.disposers))
                .unwrap_or_default()
        })
        // `self` drops here and clears the slot.
    }
}

impl Drop for TrackingContext {
    fn drop(&mut self) {
        // Disposers still present belong to a session that unwound before
        // finishing. Nobody else can reach them, so remove them here, after
        // the borrow is released.
        let leftover = SESSION.with(|session| session.borrow_mut().take());
        if let Some(session) = leftover {
            if !session.disposers.is_empty() {
                trace!(count = session.disposers.len(), "disposing unfinished session");
            }
            for disposer in session.disposers {
                disposer.dispose();
            }
        }
    }
}

/// Run `action` and subscribe `on_change` to every key it reads.
///
/// Returns one disposer that removes all of those subscriptions. When called
/// while another tracked action is running on this thread, `action` still
/// runs but the returned disposer does nothing and no subscriptions are made
/// beyond the outer session's.
///
/// # Example
///
/// ```rust,ignore
/// let state = wrap(json!({ "items": [] })).into_proxy().unwrap();
/// let disposer = track(
///     || { state.get("items").and_then(Wrapped::into_proxy).map(|items| items.len()); },
///     |_| println!("items changed"),
/// );
/// ```
pub fn track<A, F>(action: A, on_change: F) -> Disposer
where
    A: FnOnce(),
    F: Fn(&Wrapped) + Send + Sync + 'static,
{
    let Some(context) = TrackingContext::enter(Arc::new(on_change)) else {
        trace!("nested track call, running untracked");
        action();
        return Disposer::noop();
    };

    action();

    let disposers = context.finish();
    trace!(dependencies = disposers.len(), "tracking session finished");
    Disposer::combine(disposers)
}
