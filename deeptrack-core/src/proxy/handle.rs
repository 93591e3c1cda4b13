//! Wrapped Handles
//!
//! A [`Proxy`] is the instrumented view of one container. Every read, write
//! and delete goes through it:
//!
//! - reads wrap container children on the way out (recording this node as
//!   their parent) and, inside [`track`](crate::reactive::track), subscribe
//!   the tracking callback to the key that was read;
//! - writes and deletes update the container, then fire the key's channel
//!   and bubble the change to every ancestor.
//!
//! There is exactly one node per container: wrapping the same container (or
//! a handle to it) again returns a handle to the same node.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use super::node::{self, Node, NodeId};
use super::propagate;
use super::snapshot::snapshot;
use super::value::{Container, Key, Shape, Value};
use crate::error::{ProxyError, Result};
use crate::reactive::{Disposer, TrackingContext};

/// The result of wrapping a value or reading through a handle.
#[derive(Clone, Debug, PartialEq)]
pub enum Wrapped {
    /// A container, instrumented.
    Node(Proxy),
    /// A scalar, returned unchanged.
    Plain(Value),
}

impl Wrapped {
    pub fn is_node(&self) -> bool {
        matches!(self, Wrapped::Node(_))
    }

    pub fn as_proxy(&self) -> Option<&Proxy> {
        match self {
            Wrapped::Node(proxy) => Some(proxy),
            Wrapped::Plain(_) => None,
        }
    }

    pub fn into_proxy(self) -> Option<Proxy> {
        match self {
            Wrapped::Node(proxy) => Some(proxy),
            Wrapped::Plain(_) => None,
        }
    }

    pub fn as_plain(&self) -> Option<&Value> {
        match self {
            Wrapped::Plain(value) => Some(value),
            Wrapped::Node(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_plain().and_then(Value::as_i64)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_plain().and_then(Value::as_str)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_plain().and_then(Value::as_bool)
    }

    /// The underlying value. Containers keep their identity.
    pub fn to_value(&self) -> Value {
        match self {
            Wrapped::Node(proxy) => proxy.to_value(),
            Wrapped::Plain(value) => value.clone(),
        }
    }

    /// A plain, wrapper-free copy.
    pub fn snapshot(&self) -> Value {
        unwrap(self.to_value())
    }
}

/// Instrumented handle over one container.
///
/// Cloning a handle is cheap; clones refer to the same node and compare
/// equal.
#[derive(Clone)]
pub struct Proxy {
    node: Arc<Node>,
    target: Container,
}

impl Proxy {
    /// Handle for `node`, if its container is still alive.
    pub(crate) fn from_node(node: Arc<Node>) -> Option<Self> {
        let target = node.target()?;
        Some(Self { node, target })
    }

    /// The node's unique ID.
    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    pub fn shape(&self) -> Shape {
        self.node.shape()
    }

    pub fn is_array(&self) -> bool {
        self.shape() == Shape::Sequence
    }

    /// The instrumented container as a value. Identity is preserved, so
    /// wrapping it again yields this handle.
    pub fn to_value(&self) -> Value {
        self.target.clone().into_value()
    }

    /// Number of nodes currently linked as parents of this one.
    pub fn parent_count(&self) -> usize {
        self.node.parents().len()
    }

    /// Whether `parent` is linked as a parent of this node.
    pub fn has_parent(&self, parent: &Proxy) -> bool {
        self.node.has_parent(&parent.node)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Read `key`.
    ///
    /// Container children come back wrapped, with this node as a parent.
    /// Inside a tracked action the read is recorded even when the key is
    /// absent.
    pub fn get(&self, key: impl Into<Key>) -> Option<Wrapped> {
        let key = key.into();
        if is_metadata(&key) {
            return None;
        }
        let key = key.normalize(self.shape())?;

        let value = self
            .read_raw(&key)
            .map(|raw| wrap_with_parent(raw, Some(&self.node)));
        self.track_read(&key);
        value
    }

    /// Whether `key` exists. Not tracked.
    pub fn has(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        if is_metadata(&key) {
            return true;
        }
        match (&self.target, key.normalize(self.shape())) {
            (Container::Array(array), Some(Key::Index(index))) => index < array.len(),
            (Container::Array(_), Some(Key::Length)) => true,
            (Container::Object(object), Some(Key::Field(field))) => {
                object.read().contains_key(&field)
            }
            _ => false,
        }
    }

    /// Number of items (sequences, tracked as a read of `length`) or
    /// fields (keyed containers, untracked).
    pub fn len(&self) -> usize {
        if self.is_array() {
            self.track_read(&Key::Length);
        }
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The keys currently present, in order. Not tracked.
    pub fn keys(&self) -> Vec<Key> {
        match &self.target {
            Container::Array(array) => (0..array.len()).map(Key::Index).collect(),
            Container::Object(object) => object.read().keys().cloned().map(Key::Field).collect(),
        }
    }

    /// Read every value through [`Proxy::get`].
    pub fn values(&self) -> Vec<Wrapped> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    /// Read every key and value through [`Proxy::get`].
    pub fn entries(&self) -> Vec<(Key, Wrapped)> {
        if self.is_array() {
            self.track_read(&Key::Length);
        }
        self.keys()
            .into_iter()
            .filter_map(|key| self.get(key.clone()).map(|value| (key, value)))
            .collect()
    }

    fn read_raw(&self, key: &Key) -> Option<Value> {
        match (&self.target, key) {
            (Container::Array(array), Key::Index(index)) => array.read().get(*index).cloned(),
            (Container::Array(array), Key::Length) => Some(Value::from(array.len())),
            (Container::Object(object), Key::Field(field)) => object.read().get(field).cloned(),
            _ => None,
        }
    }

    fn track_read(&self, key: &Key) {
        if let Some(listener) = TrackingContext::current_listener() {
            TrackingContext::record(self.node.key_channel(key).subscribe_shared(listener));
        }
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Write `value` at `key` and notify.
    ///
    /// Returns `false` without doing anything for the metadata key, for keys
    /// that cannot exist on this shape, and for indices past the end of a
    /// sequence. Writing at index `len` appends; writing `length` truncates
    /// or pads with nulls.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> bool {
        let key = key.into();
        if is_metadata(&key) {
            trace!(node = self.id().raw(), "rejected write to metadata slot");
            return false;
        }
        let Some(key) = key.normalize(self.shape()) else {
            return false;
        };
        let value = value.into();

        match (&self.target, key) {
            (Container::Object(object), Key::Field(field)) => {
                let wrapped = wrap_with_parent(value.clone(), Some(&self.node));
                let previous = object.write().insert(field.clone(), value);
                if let Some(previous) = previous {
                    propagate::unlink_if_orphaned(&self.node, &self.target, &previous);
                }
                propagate::notify(&self.node, &Key::Field(field), &wrapped);
                true
            }
            (Container::Array(array), Key::Index(index)) => {
                if index > array.len() {
                    return false;
                }
                let wrapped = wrap_with_parent(value.clone(), Some(&self.node));
                let previous = {
                    let mut items = array.write();
                    if index < items.len() {
                        Some(std::mem::replace(&mut items[index], value))
                    } else {
                        items.push(value);
                        None
                    }
                };
                let grew = previous.is_none();
                if let Some(previous) = previous {
                    propagate::unlink_if_orphaned(&self.node, &self.target, &previous);
                }
                propagate::notify(&self.node, &Key::Index(index), &wrapped);
                if grew {
                    self.notify_length();
                }
                true
            }
            (Container::Array(array), Key::Length) => {
                let Some(length) = value.as_u64().and_then(|n| usize::try_from(n).ok()) else {
                    return false;
                };
                let removed = {
                    let mut items = array.write();
                    if length <= items.len() {
                        items.split_off(length)
                    } else {
                        items.resize(length, Value::Null);
                        Vec::new()
                    }
                };
                for value in &removed {
                    propagate::unlink_if_orphaned(&self.node, &self.target, value);
                }
                self.notify_length();
                true
            }
            _ => false,
        }
    }

    /// Remove `key` and notify with the removed value.
    ///
    /// On sequences the slot is set to null and the length is unchanged.
    /// Returns `false` if nothing was removed.
    pub fn delete(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        if is_metadata(&key) {
            trace!(node = self.id().raw(), "rejected delete of metadata slot");
            return false;
        }
        let Some(key) = key.normalize(self.shape()) else {
            return false;
        };

        let removed = match (&self.target, &key) {
            (Container::Object(object), Key::Field(field)) => object.write().shift_remove(field),
            (Container::Array(array), Key::Index(index)) => array
                .write()
                .get_mut(*index)
                .map(|slot| std::mem::replace(slot, Value::Null)),
            _ => None,
        };

        match removed {
            Some(removed) => {
                self.finish_removal(&key, removed);
                true
            }
            None => false,
        }
    }

    /// Replace the whole contents with those of `value`.
    ///
    /// Fails with [`ProxyError::ProtocolViolation`] unless `value` is a
    /// container of the same shape. Every changed key is notified.
    pub fn replace(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let source = match value.as_container() {
            Some(source) if source.shape() == self.shape() => source,
            _ => {
                return Err(ProxyError::ProtocolViolation {
                    expected: self.shape(),
                    found: value.kind_name(),
                })
            }
        };
        if source.addr() == self.target.addr() {
            return Ok(());
        }

        match source {
            Container::Object(source) => {
                let entries = source.entries();
                let kept = |key: &Key| match key {
                    Key::Field(field) => entries.iter().any(|(name, _)| name == field),
                    _ => false,
                };
                let stale: Vec<Key> = self.keys().into_iter().filter(|key| !kept(key)).collect();
                for key in stale {
                    self.delete(key);
                }
                for (field, value) in entries {
                    self.set(Key::Field(field), value);
                }
            }
            Container::Array(source) => {
                let items = source.items();
                let length = items.len();
                for (index, value) in items.into_iter().enumerate() {
                    self.set(Key::Index(index), value);
                }
                if self.target.len() > length {
                    self.set(Key::Length, length);
                }
            }
        }
        Ok(())
    }

    fn finish_removal(&self, key: &Key, removed: Value) {
        let wrapped = wrap_existing(removed.clone());
        propagate::notify(&self.node, key, &wrapped);
        if wrapped.is_node() {
            propagate::unlink_if_orphaned(&self.node, &self.target, &removed);
            self.node.remove_key_channel(key);
        }
    }

    fn notify_length(&self) {
        let length = Wrapped::Plain(Value::from(self.target.len()));
        propagate::notify(&self.node, &Key::Length, &length);
    }

    // ------------------------------------------------------------------------
    // Sequence operations
    // ------------------------------------------------------------------------

    /// Append `value`. Notifies the new index, then `length`.
    ///
    /// Returns the new length, or `None` if this is not a sequence.
    pub fn push(&self, value: impl Into<Value>) -> Option<usize> {
        let Container::Array(array) = &self.target else {
            return None;
        };
        self.set(Key::Index(array.len()), value);
        Some(array.len())
    }

    /// Remove the last item. Notifies its index (as a delete), then `length`.
    pub fn pop(&self) -> Option<Wrapped> {
        let Container::Array(array) = &self.target else {
            return None;
        };
        let removed = array.write().pop()?;
        let index = array.len();

        self.finish_removal(&Key::Index(index), removed.clone());
        self.notify_length();
        Some(wrap_existing(removed))
    }

    /// Insert `value` at `index`, shifting later items up.
    ///
    /// Notifies the shifted indices from the end down, then `index`, then
    /// `length`. Returns `false` if this is not a sequence or `index` is past
    /// the end.
    pub fn insert(&self, index: usize, value: impl Into<Value>) -> bool {
        let Container::Array(array) = &self.target else {
            return false;
        };
        let old_length = array.len();
        if index > old_length {
            return false;
        }

        let value = value.into();
        let wrapped = wrap_with_parent(value.clone(), Some(&self.node));
        array.write().insert(index, value);

        for slot in (index + 1..=old_length).rev() {
            self.notify_slot(slot);
        }
        propagate::notify(&self.node, &Key::Index(index), &wrapped);
        self.notify_length();
        true
    }

    /// Remove the item at `index`, shifting later items down.
    ///
    /// Notifies the shifted indices from `index` up, the vacated last index
    /// (as a delete of the removed item), then `length`.
    pub fn remove(&self, index: usize) -> Option<Wrapped> {
        let Container::Array(array) = &self.target else {
            return None;
        };
        let removed = {
            let mut items = array.write();
            if index >= items.len() {
                return None;
            }
            items.remove(index)
        };
        let new_length = array.len();

        for slot in index..new_length {
            self.notify_slot(slot);
        }
        self.finish_removal(&Key::Index(new_length), removed.clone());
        self.notify_length();
        Some(wrap_existing(removed))
    }

    fn notify_slot(&self, index: usize) {
        if let Some(raw) = self.read_raw(&Key::Index(index)) {
            let wrapped = wrap_with_parent(raw, Some(&self.node));
            propagate::notify(&self.node, &Key::Index(index), &wrapped);
        }
    }

    // ------------------------------------------------------------------------
    // Listening
    // ------------------------------------------------------------------------

    /// Listen for any change inside this node's subtree.
    ///
    /// A listener that captures a handle into this subtree keeps its
    /// container alive for as long as it stays subscribed. Dispose such
    /// listeners, or the container and its metadata are never released.
    pub fn subscribe<F>(&self, listener: F) -> Disposer
    where
        F: Fn(&Proxy) + Send + Sync + 'static,
    {
        self.node.signal().subscribe(listener)
    }

    /// Listen for changes of one key of this node.
    pub fn subscribe_to_key<F>(&self, key: impl Into<Key>, listener: F) -> Disposer
    where
        F: Fn(&Wrapped) + Send + Sync + 'static,
    {
        let key = key.into();
        let key = key.clone().normalize(self.shape()).unwrap_or(key);
        self.node.key_channel(&key).subscribe(listener)
    }

    /// Bubble a change notification from this node without changing anything.
    pub fn notify(&self) {
        propagate::bubble(&self.node);
    }

    /// Run the full propagation for `key` with a caller-supplied value.
    pub fn notify_key(&self, key: impl Into<Key>, value: impl Into<Value>) {
        let key = key.into();
        let key = key.clone().normalize(self.shape()).unwrap_or(key);
        propagate::notify(&self.node, &key, &wrap(value));
    }

    /// A plain, wrapper-free copy of this node's subtree.
    pub fn snapshot(&self) -> Value {
        snapshot(&self.to_value())
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for Proxy {}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("id", &self.id())
            .field("shape", &self.shape())
            .field("len", &self.target.len())
            .finish()
    }
}

impl From<Proxy> for Value {
    fn from(proxy: Proxy) -> Self {
        proxy.target.into_value()
    }
}

impl From<&Proxy> for Value {
    fn from(proxy: &Proxy) -> Self {
        proxy.to_value()
    }
}

impl From<Wrapped> for Value {
    fn from(wrapped: Wrapped) -> Self {
        match wrapped {
            Wrapped::Node(proxy) => proxy.into(),
            Wrapped::Plain(value) => value,
        }
    }
}

fn is_metadata(key: &Key) -> bool {
    matches!(key, Key::Metadata)
}

// ----------------------------------------------------------------------------
// Entry points
// ----------------------------------------------------------------------------

/// Instrument `value`.
///
/// Scalars come back unchanged. A container gets a node on first use; after
/// that, wrapping it (or any handle to it) returns the same node.
pub fn wrap(value: impl Into<Value>) -> Wrapped {
    wrap_with_parent(value.into(), None)
}

pub(crate) fn wrap_with_parent(value: Value, parent: Option<&Arc<Node>>) -> Wrapped {
    match value.as_container() {
        Some(container) => {
            let node = node::attach(&container, parent);
            Wrapped::Node(Proxy {
                node,
                target: container,
            })
        }
        None => Wrapped::Plain(value),
    }
}

/// Wrap `value` only if it is already instrumented.
fn wrap_existing(value: Value) -> Wrapped {
    match value
        .as_container()
        .and_then(|container| node::lookup(&container))
        .and_then(Proxy::from_node)
    {
        Some(proxy) => Wrapped::Node(proxy),
        None => Wrapped::Plain(value),
    }
}

/// Strip instrumentation: a snapshot for instrumented containers, the value
/// itself otherwise.
pub fn unwrap(value: impl Into<Value>) -> Value {
    let value = value.into();
    if is_wrapped(&value) {
        snapshot(&value)
    } else {
        value
    }
}

/// Whether `value` is a container carrying node metadata.
pub fn is_wrapped(value: &Value) -> bool {
    value
        .as_container()
        .is_some_and(|container| node::lookup(&container).is_some())
}

fn instrumented(value: &Value) -> Result<Proxy> {
    value
        .as_container()
        .and_then(|container| node::lookup(&container))
        .and_then(Proxy::from_node)
        .ok_or(ProxyError::NotInstrumented)
}

/// Listen for any change inside `value`'s subtree.
///
/// Fails with [`ProxyError::NotInstrumented`] if `value` was never wrapped.
/// See [`Proxy::subscribe`] on listeners that capture the handle.
pub fn subscribe<F>(value: &Value, listener: F) -> Result<Disposer>
where
    F: Fn(&Proxy) + Send + Sync + 'static,
{
    Ok(instrumented(value)?.subscribe(listener))
}

/// Listen for changes of one key of `value`.
///
/// Fails with [`ProxyError::NotInstrumented`] if `value` was never wrapped.
pub fn subscribe_to_key<F>(value: &Value, key: impl Into<Key>, listener: F) -> Result<Disposer>
where
    F: Fn(&Wrapped) + Send + Sync + 'static,
{
    Ok(instrumented(value)?.subscribe_to_key(key, listener))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn proxy(value: serde_json::Value) -> Proxy {
        wrap(value).into_proxy().expect("container")
    }

    fn collect_keys(proxy: &Proxy, key: impl Into<Key>) -> (Arc<Mutex<Vec<Value>>>, Disposer) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let disposer = proxy.subscribe_to_key(key, move |value| sink.lock().push(value.to_value()));
        (seen, disposer)
    }

    #[test]
    fn scalars_pass_through_wrap() {
        assert_eq!(wrap(3), Wrapped::Plain(Value::from(3)));
        assert!(!is_wrapped(&Value::from("x")));
    }

    #[test]
    fn rewrapping_returns_the_same_handle() {
        let value = Value::from(json!({ "a": 1 }));
        let first = wrap(value.clone()).into_proxy().expect("container");
        let second = wrap(value.clone()).into_proxy().expect("container");
        let third = wrap(first.clone()).into_proxy().expect("container");

        assert_eq!(first, second);
        assert_eq!(first, third);
        assert!(is_wrapped(&value));
    }

    #[test]
    fn reads_wrap_children_and_link_parents() {
        let root = proxy(json!({ "child": { "id": 1 }, "n": 2 }));
        let child = root.get("child").and_then(Wrapped::into_proxy).expect("child");

        assert!(child.has_parent(&root));
        assert_eq!(root.get("n"), Some(Wrapped::Plain(Value::from(2))));
        assert_eq!(root.get("missing"), None);
        assert_eq!(root.get("child").and_then(Wrapped::into_proxy), Some(child));
    }

    #[test]
    fn metadata_slot_is_reserved() {
        let root = proxy(json!({}));
        assert!(root.has(Key::Metadata));
        assert!(!root.set(Key::Metadata, 1));
        assert!(!root.delete(Key::Metadata));
        assert_eq!(root.get(Key::Metadata), None);
        assert_eq!(root.snapshot(), json!({}));

        let list = proxy(json!([1]));
        assert!(list.has(Key::Metadata));
        assert!(!list.set(Key::Metadata, 2));
        assert_eq!(list.snapshot(), json!([1]));
    }

    #[test]
    fn disposing_a_self_capturing_listener_releases_the_container() {
        let state = proxy(json!({ "n": 0 }));
        let target = state.target.downgrade();
        let captured = state.clone();
        let disposer = state.subscribe(move |_| {
            let _ = captured.len();
        });

        drop(state);
        assert!(target.is_alive(), "subscribed listener holds the handle");

        disposer.dispose();
        assert!(!target.is_alive());
    }

    #[test]
    fn dollar_prefixed_fields_are_ordinary_data() {
        let root = proxy(json!({ "$metadata": 42, "a": 1 }));
        let (seen, _disposer) = collect_keys(&root, "$metadata");

        assert!(root.has("$metadata"));
        assert_eq!(root.get("$metadata"), Some(Wrapped::Plain(Value::from(42))));
        assert!(root.set("$metadata", 43));
        assert_eq!(root.snapshot(), json!({ "$metadata": 43, "a": 1 }));
        assert!(root.delete("$metadata"));
        assert!(!root.has("$metadata"));
        assert_eq!(root.snapshot(), json!({ "a": 1 }));
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn write_fires_key_then_node() {
        let root = proxy(json!({ "id": 0 }));
        let log = Arc::new(Mutex::new(Vec::new()));

        let key_log = log.clone();
        let _key = root.subscribe_to_key("id", move |value| {
            key_log.lock().push(format!("key:{}", value.as_i64().unwrap_or_default()))
        });
        let node_log = log.clone();
        let _node = root.subscribe(move |_| node_log.lock().push("node".to_owned()));

        assert!(root.set("id", 5));
        assert_eq!(*log.lock(), vec!["key:5".to_owned(), "node".to_owned()]);
    }

    #[test]
    fn overwrite_unlinks_replaced_child() {
        let root = proxy(json!({ "child": { "id": 1 } }));
        let child = root.get("child").and_then(Wrapped::into_proxy).expect("child");
        assert!(child.has_parent(&root));

        root.set("child", json!({ "id": 2 }));
        assert!(!child.has_parent(&root));
    }

    #[test]
    fn shared_child_keeps_link_until_last_reference_goes() {
        let root = proxy(json!({}));
        let shared = proxy(json!({ "id": 1 }));
        root.set("a", &shared);
        root.set("b", &shared);
        assert!(shared.has_parent(&root));

        root.delete("a");
        assert!(shared.has_parent(&root));
        root.delete("b");
        assert!(!shared.has_parent(&root));
    }

    #[test]
    fn delete_fires_with_removed_value_and_drops_channel() {
        let root = proxy(json!({ "child": { "id": 1 }, "msg": "hi" }));
        let (seen, _disposer) = collect_keys(&root, "msg");

        assert!(root.delete("msg"));
        assert!(!root.delete("msg"));
        assert_eq!(*seen.lock(), vec![Value::from("hi")]);
        assert!(!root.has("msg"));

        let child = root.get("child").and_then(Wrapped::into_proxy).expect("child");
        let (_, _child_disposer) = collect_keys(&root, "child");
        let before = root.node.key_channel_count();
        assert!(root.delete("child"));
        assert_eq!(root.node.key_channel_count(), before - 1);
        assert!(!child.has_parent(&root));
    }

    #[test]
    fn sequence_index_rules() {
        let list = proxy(json!([1, 2]));
        assert!(!list.set(5usize, 9));
        assert!(!list.set("name", 9));
        assert!(list.set(2usize, 3));
        assert_eq!(list.len(), 3);

        assert!(list.delete(0usize));
        assert_eq!(list.snapshot(), json!([null, 2, 3]));

        assert!(list.set(Key::Length, 1));
        assert_eq!(list.snapshot(), json!([null]));
        assert!(list.set("length", 2));
        assert_eq!(list.snapshot(), json!([null, null]));
    }

    #[test]
    fn push_notifies_index_then_length() {
        let list = proxy(json!([]));
        let log = Arc::new(Mutex::new(Vec::new()));
        for key in [Key::Index(0), Key::Length] {
            let log = log.clone();
            let label = key.to_string();
            let _ = list.subscribe_to_key(key, move |_| log.lock().push(label.clone()));
        }

        assert_eq!(list.push(json!({ "id": 1 })), Some(1));
        assert_eq!(*log.lock(), vec!["0".to_owned(), "length".to_owned()]);
    }

    #[test]
    fn pop_insert_remove() {
        let list = proxy(json!([1, 2, 3]));

        assert_eq!(list.pop(), Some(Wrapped::Plain(Value::from(3))));
        assert!(list.insert(0, 0));
        assert_eq!(list.snapshot(), json!([0, 1, 2]));
        assert_eq!(list.remove(1), Some(Wrapped::Plain(Value::from(1))));
        assert_eq!(list.snapshot(), json!([0, 2]));
        assert_eq!(list.remove(7), None);
        assert!(!list.insert(9, 1));

        let record = proxy(json!({}));
        assert_eq!(record.push(1), None);
        assert_eq!(record.pop(), None);
    }

    #[test]
    fn removed_child_is_unlinked() {
        let list = proxy(json!([{ "id": 1 }, { "id": 2 }]));
        let first = list.get(0usize).and_then(Wrapped::into_proxy).expect("first");

        let removed = list.remove(0).and_then(Wrapped::into_proxy).expect("removed");
        assert_eq!(removed, first);
        assert!(!first.has_parent(&list));
    }

    #[test]
    fn replace_requires_matching_shape() {
        let root = proxy(json!({ "a": 1, "b": 2 }));
        assert_eq!(
            root.replace(json!([1])),
            Err(ProxyError::ProtocolViolation {
                expected: Shape::Keyed,
                found: "an array",
            })
        );
        assert!(root.replace(3).is_err());

        root.replace(json!({ "b": 3, "c": 4 })).expect("same shape");
        assert_eq!(root.snapshot(), json!({ "b": 3, "c": 4 }));

        let list = proxy(json!([1, 2, 3]));
        list.replace(json!([9])).expect("same shape");
        assert_eq!(list.snapshot(), json!([9]));
    }

    #[test]
    fn subscribe_requires_instrumentation() {
        let plain = Value::from(json!({ "a": 1 }));
        assert_eq!(subscribe(&plain, |_| {}).err(), Some(ProxyError::NotInstrumented));
        assert_eq!(
            subscribe_to_key(&plain, "a", |_| {}).err(),
            Some(ProxyError::NotInstrumented)
        );
        assert_eq!(subscribe(&Value::from(1), |_| {}).err(), Some(ProxyError::NotInstrumented));

        let wrapped = wrap(plain.clone());
        assert!(wrapped.is_node());
        assert!(subscribe(&plain, |_| {}).is_ok());
    }

    #[test]
    fn manual_notification() {
        let root = proxy(json!({ "child": {} }));
        let child = root.get("child").and_then(Wrapped::into_proxy).expect("child");
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        let _disposer = root.subscribe(move |_| *counter.lock() += 1);

        child.notify();
        child.notify_key("anything", 1);
        assert_eq!(*hits.lock(), 2);
    }
}
