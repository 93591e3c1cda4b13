//! Deep Instrumentation
//!
//! This module turns a plain data graph into an observable one.
//!
//! # Concepts
//!
//! ## Values
//!
//! [`Value`] is the raw graph: scalars plus shared, identity-bearing
//! containers ([`Array`], [`Object`]). The same container may be reachable
//! from several places.
//!
//! ## Nodes and Handles
//!
//! Wrapping a container attaches a node to it (once) and returns a
//! [`Proxy`], the handle all reads and writes go through. A node knows its
//! parents, has one aggregate channel and one channel per key.
//!
//! ## Propagation
//!
//! A write fires the key's channel, then the aggregate channel of the node
//! and of every ancestor. Listeners can attach at either level.
//!
//! ## Snapshots
//!
//! [`unwrap`] produces a plain copy of a graph that preserves sharing and
//! can be compared or serialized safely.

mod handle;
mod node;
mod propagate;
mod snapshot;
mod value;

pub use handle::{is_wrapped, subscribe, subscribe_to_key, unwrap, wrap, Proxy, Wrapped};
pub use node::NodeId;
pub use snapshot::snapshot;
pub use value::{Array, Key, Map, Object, Shape, Value};
