//! Change Propagation
//!
//! When a key of a node changes:
//!
//! 1. The key's channel fires with the new (or removed) value.
//! 2. The node's aggregate channel fires with the node's handle.
//! 3. Step 2 repeats for every parent, depth first, all the way up.
//!
//! Ancestors only learn that something below them changed, never which key.
//! Each node fires at most once per change, so shared ancestors (diamonds)
//! are notified once and cyclic graphs terminate.
//!
//! Everything runs synchronously on the caller's stack. No lock is held while
//! a listener runs.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, trace};

use super::handle::{Proxy, Wrapped};
use super::node::{self, Node, NodeId};
use super::value::{Container, Key, Value};

/// Fire `key`'s channel on `node` with `value`, then bubble.
pub(crate) fn notify(node: &Arc<Node>, key: &Key, value: &Wrapped) {
    trace!(node = node.id().raw(), %key, "key changed");
    node.key_channel(key).emit(value);
    bubble(node);
}

/// Fire the aggregate channel of `node` and of every ancestor.
pub(crate) fn bubble(node: &Arc<Node>) {
    let mut visited = HashSet::new();
    bubble_from(node, &mut visited);
    trace!(node = node.id().raw(), notified = visited.len(), "change bubbled");
}

fn bubble_from(node: &Arc<Node>, visited: &mut HashSet<NodeId>) {
    if !visited.insert(node.id()) {
        return;
    }

    if let Some(handle) = Proxy::from_node(Arc::clone(node)) {
        node.signal().emit(&handle);
    }

    for parent in node.parents() {
        bubble_from(&parent, visited);
    }
}

/// Remove `parent` from `child`'s parent set unless `parent_target` still
/// refers to `child` from some other slot.
///
/// Returns whether a link was removed.
pub(crate) fn unlink_if_orphaned(parent: &Arc<Node>, parent_target: &Container, child: &Value) -> bool {
    let Some(child) = child.as_container() else {
        return false;
    };
    let Some(child_node) = node::lookup(&child) else {
        return false;
    };
    if parent_target.holds(&child) {
        return false;
    }

    let removed = child_node.remove_parent(parent);
    if removed {
        debug!(
            parent = parent.id().raw(),
            child = child_node.id().raw(),
            "unlinked orphaned child"
        );
    }
    removed
}
