//! Reactive Primitives
//!
//! The building blocks the instrumentation layer dispatches through.
//!
//! # Concepts
//!
//! ## Channels
//!
//! A [`Channel`] is an ordered list of listeners for one value type.
//! Emitting runs every listener synchronously, in subscription order.
//! Subscribing returns a [`Disposer`] that removes exactly that listener.
//!
//! ## Tracking
//!
//! [`track`] runs an action inside a thread-local [`TrackingContext`]. Every
//! key read through a [`Proxy`](crate::proxy::Proxy) during the action gets
//! the change callback attached, and the returned disposer detaches all of
//! them at once.

mod channel;
mod context;

pub use channel::{Channel, Disposer, Listener, ListenerId};
pub use context::{track, TrackingContext};
