//! Node Metadata
//!
//! Every instrumented container has exactly one [`Node`] describing it: its
//! shape, its aggregate change channel, its lazily created per-key channels
//! and the set of nodes it is reachable from (its parents).
//!
//! # Side Table
//!
//! Metadata is not stored in the container. It lives in a process-wide
//! table keyed by the container's allocation address. A node only holds a
//! weak reference to its container, so metadata never extends the
//! container's lifetime; while the entry exists, that weak reference pins
//! the allocation, so the address cannot be reused by another container.
//! Entries whose container has died are swept from time to time as new
//! containers are instrumented.
//!
//! Entries hold their node strongly, and a node holds its listeners. A
//! listener that captures a handle to its own container therefore keeps
//! that container, and its entry, alive until the listener is disposed.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::handle::{Proxy, Wrapped};
use super::value::{Container, Key, Shape, WeakContainer};
use crate::reactive::Channel;

/// Unique identifier for an instrumented container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata attached to one instrumented container.
pub(crate) struct Node {
    id: NodeId,

    shape: Shape,

    /// The container itself. Weak: whoever provided it owns it.
    target: WeakContainer,

    /// Fires with this node's handle whenever anything in its subtree changes.
    signal: Channel<Proxy>,

    /// Per-key channels, created on first listen or first change.
    children: Mutex<IndexMap<Key, Channel<Wrapped>>>,

    /// Nodes holding a reference to this one. Back-references only.
    parents: Mutex<SmallVec<[Weak<Node>; 2]>>,
}

impl Node {
    fn new(container: &Container, parent: Option<&Arc<Node>>) -> Self {
        let mut parents = SmallVec::new();
        if let Some(parent) = parent {
            parents.push(Arc::downgrade(parent));
        }

        Self {
            id: NodeId::new(),
            shape: container.shape(),
            target: container.downgrade(),
            signal: Channel::new(),
            children: Mutex::new(IndexMap::new()),
            parents: Mutex::new(parents),
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn shape(&self) -> Shape {
        self.shape
    }

    /// The container, if it is still alive.
    pub(crate) fn target(&self) -> Option<Container> {
        self.target.upgrade()
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.target.is_alive()
    }

    pub(crate) fn signal(&self) -> &Channel<Proxy> {
        &self.signal
    }

    /// The channel for `key`, created if missing.
    pub(crate) fn key_channel(&self, key: &Key) -> Channel<Wrapped> {
        self.children
            .lock()
            .entry(key.clone())
            .or_default()
            .clone()
    }

    /// Forget the channel for `key`.
    pub(crate) fn remove_key_channel(&self, key: &Key) {
        self.children.lock().shift_remove(key);
    }

    pub(crate) fn key_channel_count(&self) -> usize {
        self.children.lock().len()
    }

    /// Record `parent` as holding a reference to this node.
    pub(crate) fn add_parent(&self, parent: &Arc<Node>) {
        let mut parents = self.parents.lock();
        parents.retain(|weak| weak.strong_count() > 0);
        if !parents.iter().any(|weak| is_same(weak, parent)) {
            parents.push(Arc::downgrade(parent));
        }
    }

    /// Drop `parent` from the parent set. Returns whether it was present.
    pub(crate) fn remove_parent(&self, parent: &Arc<Node>) -> bool {
        let mut parents = self.parents.lock();
        let before = parents.len();
        parents.retain(|weak| !is_same(weak, parent));
        parents.len() != before
    }

    /// The live parents, in the order they were linked.
    pub(crate) fn parents(&self) -> Vec<Arc<Node>> {
        self.parents
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|parent| parent.is_alive())
            .collect()
    }

    pub(crate) fn has_parent(&self, parent: &Arc<Node>) -> bool {
        self.parents.lock().iter().any(|weak| is_same(weak, parent))
    }
}

fn is_same(weak: &Weak<Node>, node: &Arc<Node>) -> bool {
    std::ptr::eq(weak.as_ptr(), Arc::as_ptr(node))
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("shape", &self.shape)
            .field("alive", &self.is_alive())
            .field("key_channels", &self.key_channel_count())
            .field("parents", &self.parents.lock().len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

/// Number of new entries between sweeps of dead entries.
const SWEEP_INTERVAL: usize = 256;

static REGISTRY: OnceLock<DashMap<usize, Arc<Node>>> = OnceLock::new();
static INSERTIONS: AtomicUsize = AtomicUsize::new(0);

fn registry() -> &'static DashMap<usize, Arc<Node>> {
    REGISTRY.get_or_init(DashMap::new)
}

/// The metadata of `container`, if it has been instrumented.
pub(crate) fn lookup(container: &Container) -> Option<Arc<Node>> {
    registry()
        .get(&container.addr())
        .map(|entry| Arc::clone(entry.value()))
        .filter(|node| node.is_alive())
}

/// The metadata of `container`, attaching fresh metadata on first use.
///
/// When `parent` is given it joins the node's parent set either way.
pub(crate) fn attach(container: &Container, parent: Option<&Arc<Node>>) -> Arc<Node> {
    let (node, created) = match registry().entry(container.addr()) {
        Entry::Occupied(entry) if entry.get().is_alive() => (Arc::clone(entry.get()), false),
        Entry::Occupied(mut entry) => {
            let node = Arc::new(Node::new(container, parent));
            entry.insert(Arc::clone(&node));
            (node, true)
        }
        Entry::Vacant(entry) => {
            let node = Arc::new(Node::new(container, parent));
            entry.insert(Arc::clone(&node));
            (node, true)
        }
    };

    if created {
        trace!(node = node.id.raw(), shape = %node.shape, "instrumented container");
        if INSERTIONS.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == SWEEP_INTERVAL - 1 {
            sweep();
        }
    } else if let Some(parent) = parent {
        node.add_parent(parent);
    }

    node
}

/// Drop entries whose container no longer exists.
pub(crate) fn sweep() {
    let registry = registry();
    let before = registry.len();
    registry.retain(|_, node| node.is_alive());
    let removed = before.saturating_sub(registry.len());
    if removed > 0 {
        debug!(removed, remaining = registry.len(), "swept dead node metadata");
    }
}
