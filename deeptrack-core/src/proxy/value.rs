//! Raw Values
//!
//! The plain data graph that nodes instrument. Containers ([`Array`] and
//! [`Object`]) are shared references with identity: cloning one clones the
//! reference, so the same container can sit in several slots of the graph.
//! Scalars are ordinary owned values.
//!
//! Mutating a container directly (rather than through a
//! [`Proxy`](super::Proxy)) is allowed but notifies nobody.

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Number;

/// Ordered map backing an [`Object`].
pub type Map = IndexMap<String, Value>;

/// Whether a container is an ordered sequence or a keyed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// An [`Array`].
    Sequence,
    /// An [`Object`].
    Keyed,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Sequence => f.write_str("sequence"),
            Shape::Keyed => f.write_str("keyed container"),
        }
    }
}

/// Address of a slot inside a container.
///
/// Keys are interpreted against the container's shape: on an object,
/// `Index(3)` is the field `"3"` and `Length` is the field `"length"`; on an
/// array, the field `"length"` is `Length` and numeric fields are indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A named field.
    Field(String),
    /// A sequence position.
    Index(usize),
    /// The length of a sequence.
    Length,
    /// The node metadata slot.
    ///
    /// No field name maps to it, so data stored under any string key stays
    /// reachable. It always reports as present, reads as nothing, and cannot
    /// be written or deleted.
    Metadata,
}

impl Key {
    /// Interpret this key for a container of the given shape.
    ///
    /// Returns `None` for keys that cannot exist on that shape.
    pub fn normalize(self, shape: Shape) -> Option<Key> {
        match (shape, self) {
            (Shape::Keyed, Key::Field(field)) => Some(Key::Field(field)),
            (Shape::Keyed, Key::Index(index)) => Some(Key::Field(index.to_string())),
            (Shape::Keyed, Key::Length) => Some(Key::Field("length".to_owned())),
            (Shape::Keyed, Key::Metadata) => Some(Key::Metadata),
            (Shape::Sequence, Key::Field(field)) if field == "length" => Some(Key::Length),
            (Shape::Sequence, Key::Field(field)) => field.parse().ok().map(Key::Index),
            (Shape::Sequence, key) => Some(key),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(field) => f.write_str(field),
            Key::Index(index) => write!(f, "{index}"),
            Key::Length => f.write_str("length"),
            Key::Metadata => f.write_str("<metadata>"),
        }
    }
}

impl From<&str> for Key {
    fn from(field: &str) -> Self {
        Key::Field(field.to_owned())
    }
}

impl From<String> for Key {
    fn from(field: String) -> Self {
        Key::Field(field)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

// ----------------------------------------------------------------------------
// Containers
// ----------------------------------------------------------------------------

/// A shared, identity-bearing sequence of values.
#[derive(Clone, Default)]
pub struct Array(Arc<RwLock<Vec<Value>>>);

impl Array {
    /// Create an empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an array holding `items`.
    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Arc::new(RwLock::new(items)))
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Whether the array has no items.
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Raw read of one item. Not instrumented.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.read().get(index).cloned()
    }

    /// Raw append. Not instrumented.
    pub fn push(&self, value: impl Into<Value>) {
        self.0.write().push(value.into());
    }

    /// A copy of the item references, in order.
    pub fn items(&self) -> Vec<Value> {
        self.0.read().clone()
    }

    /// Whether both handles refer to the same array.
    pub fn ptr_eq(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Vec<Value>> {
        self.0.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Vec<Value>> {
        self.0.write()
    }
}

/// A shared, identity-bearing record of named values.
///
/// Fields keep their insertion order.
#[derive(Clone, Default)]
pub struct Object(Arc<RwLock<Map>>);

impl Object {
    /// Create an empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an object holding `fields`.
    pub fn from_map(fields: Map) -> Self {
        Self(Arc::new(RwLock::new(fields)))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Whether the object has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// Raw read of one field. Not instrumented.
    pub fn get(&self, field: &str) -> Option<Value> {
        self.0.read().get(field).cloned()
    }

    /// Raw write of one field. Not instrumented.
    pub fn insert(&self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.write().insert(field.into(), value.into());
    }

    /// A copy of the field names and value references, in order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .read()
            .iter()
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect()
    }

    /// Whether both handles refer to the same object.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Map> {
        self.0.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Map> {
        self.0.write()
    }
}

/// Either kind of container, viewed by identity.
#[derive(Clone)]
pub(crate) enum Container {
    Array(Array),
    Object(Object),
}

impl Container {
    /// Identity of the container: the address of its shared allocation.
    pub(crate) fn addr(&self) -> usize {
        match self {
            Container::Array(array) => Arc::as_ptr(&array.0) as *const () as usize,
            Container::Object(object) => Arc::as_ptr(&object.0) as *const () as usize,
        }
    }

    pub(crate) fn shape(&self) -> Shape {
        match self {
            Container::Array(_) => Shape::Sequence,
            Container::Object(_) => Shape::Keyed,
        }
    }

    pub(crate) fn downgrade(&self) -> WeakContainer {
        match self {
            Container::Array(array) => WeakContainer::Array(Arc::downgrade(&array.0)),
            Container::Object(object) => WeakContainer::Object(Arc::downgrade(&object.0)),
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Container::Array(array) => array.len(),
            Container::Object(object) => object.len(),
        }
    }

    /// Whether any slot of this container refers to `child`.
    pub(crate) fn holds(&self, child: &Container) -> bool {
        let addr = child.addr();
        let refers = |value: &Value| value.as_container().is_some_and(|c| c.addr() == addr);
        match self {
            Container::Array(array) => array.read().iter().any(refers),
            Container::Object(object) => object.read().values().any(refers),
        }
    }

    pub(crate) fn into_value(self) -> Value {
        match self {
            Container::Array(array) => Value::Array(array),
            Container::Object(object) => Value::Object(object),
        }
    }
}

/// A container reference that does not keep the container alive.
pub(crate) enum WeakContainer {
    Array(Weak<RwLock<Vec<Value>>>),
    Object(Weak<RwLock<Map>>),
}

impl WeakContainer {
    pub(crate) fn upgrade(&self) -> Option<Container> {
        match self {
            WeakContainer::Array(weak) => weak.upgrade().map(|inner| Container::Array(Array(inner))),
            WeakContainer::Object(weak) => {
                weak.upgrade().map(|inner| Container::Object(Object(inner)))
            }
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        match self {
            WeakContainer::Array(weak) => weak.strong_count() > 0,
            WeakContainer::Object(weak) => weak.strong_count() > 0,
        }
    }
}

// ----------------------------------------------------------------------------
// Value
// ----------------------------------------------------------------------------

/// A node of the raw data graph.
///
/// Equality is structural: two distinct containers with equal contents are
/// equal. Use [`Array::ptr_eq`] / [`Object::ptr_eq`] for identity.
#[derive(Clone, Default)]
pub enum Value {
    /// Absence of a value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(Number),
    /// A string.
    String(String),
    /// A shared sequence.
    Array(Array),
    /// A shared record.
    Object(Object),
}

impl Value {
    /// Create a new empty object value.
    pub fn object() -> Self {
        Value::Object(Object::new())
    }

    /// Create a new empty array value.
    pub fn array() -> Self {
        Value::Array(Array::new())
    }

    /// Human-readable kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "a boolean",
            Value::Number(_) => "a number",
            Value::String(_) => "a string",
            Value::Array(_) => "an array",
            Value::Object(_) => "an object",
        }
    }

    /// Whether this value is a container.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(number) => number.as_i64(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Number(number) => number.as_u64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(number) => number.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub(crate) fn as_container(&self) -> Option<Container> {
        match self {
            Value::Array(array) => Some(Container::Array(array.clone())),
            Value::Object(object) => Some(Container::Object(object.clone())),
            _ => None,
        }
    }

    /// Deep copy into a `serde_json::Value`.
    ///
    /// # Panics
    ///
    /// Overflows the stack on cyclic graphs. Snapshots reproduce cycles, so
    /// taking one first does not help.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(value) => serde_json::Value::Bool(*value),
            Value::Number(number) => serde_json::Value::Number(number.clone()),
            Value::String(value) => serde_json::Value::String(value.clone()),
            Value::Array(array) => {
                serde_json::Value::Array(array.read().iter().map(Value::to_json).collect())
            }
            Value::Object(object) => serde_json::Value::Object(
                object
                    .read()
                    .iter()
                    .map(|(field, value)| (field.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    a == b || matches!((a.as_f64(), b.as_f64()), (Some(x), Some(y)) if x == y)
}

/// Structural equality. Containers that are the same allocation are equal
/// without being walked.
///
/// # Panics
///
/// Comparing two distinct cyclic graphs recurses without bound and
/// overflows the stack.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => numbers_equal(a, b),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b) || *a.read() == *b.read(),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b) || *a.read() == *b.read(),
            _ => false,
        }
    }
}

impl PartialEq<serde_json::Value> for Value {
    fn eq(&self, other: &serde_json::Value) -> bool {
        *self == Value::from(other.clone())
    }
}

/// # Panics
///
/// Formatting a cyclic graph recurses without bound and overflows the stack.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Number(number) => write!(f, "{number}"),
            Value::String(value) => write!(f, "{value:?}"),
            Value::Array(array) => f.debug_list().entries(array.read().iter()).finish(),
            Value::Object(object) => f.debug_map().entries(object.read().iter()).finish(),
        }
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.read().iter()).finish()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.read().iter()).finish()
    }
}

/// # Panics
///
/// Serializing a cyclic graph recurses without bound and overflows the
/// stack. Snapshots reproduce cycles, so this applies to them as well.
impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(value) => serializer.serialize_bool(*value),
            Value::Number(number) => number.serialize(serializer),
            Value::String(value) => serializer.serialize_str(value),
            Value::Array(array) => {
                let items = array.items();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in &items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(object) => {
                let entries = object.entries();
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (field, value) in &entries {
                    map.serialize_entry(field, value)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

// ----------------------------------------------------------------------------
// Conversions
// ----------------------------------------------------------------------------

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(value) => Value::Bool(value),
            serde_json::Value::Number(number) => Value::Number(number),
            serde_json::Value::String(value) => Value::String(value),
            serde_json::Value::Array(items) => Value::Array(Array::from_vec(
                items.into_iter().map(Value::from).collect(),
            )),
            serde_json::Value::Object(fields) => Value::Object(Object::from_map(
                fields
                    .into_iter()
                    .map(|(field, value)| (field, Value::from(value)))
                    .collect(),
            )),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value.into())
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Number(value.into())
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(value.into())
    }
}

/// Non-finite floats become `Null`, as in JSON.
impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Array> for Value {
    fn from(array: Array) -> Self {
        Value::Array(array)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Array::from_vec(items))
    }
}

impl From<Map> for Value {
    fn from(fields: Map) -> Self {
        Value::Object(Object::from_map(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_normalize_against_shape() {
        assert_eq!(Key::Index(2).normalize(Shape::Keyed), Some(Key::from("2")));
        assert_eq!(Key::Length.normalize(Shape::Keyed), Some(Key::from("length")));
        assert_eq!(Key::from("length").normalize(Shape::Sequence), Some(Key::Length));
        assert_eq!(Key::from("3").normalize(Shape::Sequence), Some(Key::Index(3)));
        assert_eq!(Key::from("name").normalize(Shape::Sequence), None);
        assert_eq!(Key::Metadata.normalize(Shape::Keyed), Some(Key::Metadata));
        assert_eq!(Key::Metadata.normalize(Shape::Sequence), Some(Key::Metadata));
        assert_ne!(Key::from("$metadata"), Key::Metadata);
    }

    #[test]
    fn clones_share_identity() {
        let object = Object::new();
        let alias = object.clone();
        alias.insert("id", 1);

        assert!(object.ptr_eq(&alias));
        assert_eq!(object.get("id"), Some(Value::from(1)));
    }

    #[test]
    fn equality_is_structural() {
        let a = Value::from(json!({ "items": [{ "id": 1 }] }));
        let b = Value::from(json!({ "items": [{ "id": 1 }] }));
        let c = Value::from(json!({ "items": [{ "id": 2 }] }));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(Value::from(1), Value::from(1.0));
        assert_eq!(a, json!({ "items": [{ "id": 1 }] }));
    }

    #[test]
    fn cyclic_values_equal_themselves_by_identity() {
        let cyclic = Array::new();
        cyclic.push(cyclic.clone());
        let value = Value::from(cyclic);

        assert!(value == value.clone());
    }

    #[test]
    fn json_conversion_keeps_field_order() {
        let value = Value::from(json!({ "b": 1, "a": [true, null, "x"] }));
        assert_eq!(value.to_json().to_string(), r#"{"b":1,"a":[true,null,"x"]}"#);
    }

    #[test]
    fn serializes_through_serde() {
        let value = Value::from(json!({ "id": 2, "msg": "hi" }));
        let text = serde_json::to_string(&value).expect("serialize");
        assert_eq!(text, r#"{"id":2,"msg":"hi"}"#);

        let back: Value = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(back, value);
    }

    #[test]
    fn container_holds_by_identity() {
        let child = Object::new();
        let parent = Array::from_vec(vec![Value::from(child.clone())]);
        let lookalike = Object::new();

        let parent = Container::Array(parent);
        assert!(parent.holds(&Container::Object(child)));
        assert!(!parent.holds(&Container::Object(lookalike)));
    }

    #[test]
    fn non_finite_floats_become_null() {
        assert!(Value::from(f64::NAN).is_null());
    }
}
