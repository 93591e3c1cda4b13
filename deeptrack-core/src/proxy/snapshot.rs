//! Snapshots
//!
//! A snapshot is a fresh copy of a data graph that shares nothing with the
//! live one, so it can be compared, stored or serialized while the original
//! keeps changing.
//!
//! Copies are memoised by container identity for the duration of one call:
//! a container reachable along several paths is copied once and the copy
//! appears at every one of those paths. The copy is registered before its
//! children are visited, which also makes cyclic graphs terminate (the copy
//! reproduces the cycle).

use std::collections::HashMap;

use super::value::{Array, Container, Object, Value};

/// Copy `value`, deduplicating shared containers.
///
/// Scalars are returned as they are.
pub fn snapshot(value: &Value) -> Value {
    let mut seen = HashMap::new();
    snapshot_with(value, &mut seen)
}

fn snapshot_with(value: &Value, seen: &mut HashMap<usize, Value>) -> Value {
    let Some(container) = value.as_container() else {
        return value.clone();
    };
    let addr = container.addr();
    if let Some(copy) = seen.get(&addr) {
        return copy.clone();
    }

    match container {
        Container::Array(array) => {
            let copy = Array::new();
            seen.insert(addr, Value::Array(copy.clone()));
            for item in array.items() {
                let item = snapshot_with(&item, seen);
                copy.push(item);
            }
            Value::Array(copy)
        }
        Container::Object(object) => {
            let copy = Object::new();
            seen.insert(addr, Value::Object(copy.clone()));
            for (field, child) in object.entries() {
                let child = snapshot_with(&child, seen);
                copy.insert(field, child);
            }
            Value::Object(copy)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn copies_are_detached() {
        let original = Value::from(json!({ "items": [{ "id": 1 }] }));
        let copy = snapshot(&original);
        assert_eq!(copy, original);

        let items = copy
            .as_object()
            .and_then(|object| object.get("items"))
            .expect("items");
        items.as_array().expect("array").push(2);

        assert_eq!(original, json!({ "items": [{ "id": 1 }] }));
    }

    #[test]
    fn shared_containers_are_copied_once() {
        let shared = Object::new();
        shared.insert("id", 7);
        let root = Object::new();
        root.insert("a", shared.clone());
        root.insert("b", shared);

        let copy = snapshot(&Value::from(root));
        let copy = copy.as_object().expect("object");
        let a = copy.get("a").expect("a");
        let b = copy.get("b").expect("b");

        let (a, b) = (a.as_object().expect("a"), b.as_object().expect("b"));
        assert!(a.ptr_eq(b));
    }

    #[test]
    fn cycles_terminate() {
        let root = Array::new();
        root.push(root.clone());

        let copy = snapshot(&Value::from(root.clone()));
        let copy = copy.as_array().expect("array");
        let inner = copy.get(0).expect("self reference");

        assert!(inner.as_array().expect("array").ptr_eq(copy));
        assert!(!copy.ptr_eq(&root));
    }

    #[test]
    fn scalars_are_returned_unchanged() {
        assert_eq!(snapshot(&Value::from("x")), Value::from("x"));
        assert!(snapshot(&Value::Null).is_null());
    }
}
