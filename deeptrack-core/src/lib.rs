//! Deeptrack Core
//!
//! Fine-grained change tracking over nested mutable data. It implements:
//!
//! - Lazy, identity-stable instrumentation of nested arrays and objects
//! - Per-key and per-node change channels
//! - Bubbling of every change to all structural ancestors
//! - Automatic dependency capture during a tracked computation
//! - Plain snapshots that preserve shared sub-structures
//!
//! # Architecture
//!
//! - `reactive`: the notification channel and the tracking context
//! - `proxy`: values, node metadata, handles, propagation and snapshots
//!
//! Notification is synchronous: a write returns only after every listener
//! it triggered has run.
//!
//! # Example
//!
//! ```rust,ignore
//! use deeptrack_core::{track, unwrap, wrap, Wrapped};
//! use serde_json::json;
//!
//! let state = wrap(json!({ "items": [{ "id": 0 }] })).into_proxy().unwrap();
//!
//! // Listen to the whole tree
//! let disposer = state.subscribe(|root| println!("{:?}", unwrap(root)));
//!
//! // Mutate a nested item; the root listener fires
//! let items = state.get("items").and_then(Wrapped::into_proxy).unwrap();
//! let first = items.get(0usize).and_then(Wrapped::into_proxy).unwrap();
//! first.set("id", 1);
//!
//! disposer.dispose();
//! ```

pub mod proxy;
pub mod reactive;
mod error;

pub use error::{ProxyError, Result};
pub use proxy::{
    is_wrapped, snapshot, subscribe, subscribe_to_key, unwrap, wrap, Array, Key, Object, Proxy,
    Shape, Value, Wrapped,
};
pub use reactive::{track, Disposer};
