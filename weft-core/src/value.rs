//! Dynamic value model.
//!
//! The engine observes heterogeneous data: scalars, keyed mappings,
//! ordered sequences, sets, signal cells, and reactive views over any of
//! the aggregates. `Value` is the single carrier type for all of them.
//! Aggregates are `Arc`-shared and identity-bearing; cloning a `Value`
//! clones a handle, never the underlying data.
//!
//! Change detection uses [`Value::same`], a NaN-aware identity comparison:
//! `NaN` is the same as `NaN` (so a cell holding `NaN` does not re-trigger
//! on every write), scalars compare by value, and aggregates, cells, and
//! reactive handles compare by identity.

use std::fmt;
use std::sync::Arc;

use ordered_float::OrderedFloat;

use crate::error::ReactiveError;
use crate::proxy::handle::ReactiveHandle;
use crate::proxy::target::{ListTarget, MapTarget, ObjTarget, SetTarget};
use crate::reactive::signal::Signal;

/// Scalar key for keyed containers and object fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(Arc<str>),
}

impl Key {
    /// Interpret the key as a sequence index.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Int(i) if *i >= 0 => Some(*i as usize),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a scalar value into a key. Aggregates have no key form.
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::Bool(b) => Some(Key::Bool(*b)),
            Value::Int(i) => Some(Key::Int(*i)),
            Value::Float(f) => Some(Key::Float(OrderedFloat(*f))),
            Value::Str(s) => Some(Key::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Bool(b) => write!(f, "{b}"),
            Key::Int(i) => write!(f, "{i}"),
            Key::Float(x) => write!(f, "{x}"),
            Key::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(Arc::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(Arc::from(s.as_str()))
    }
}

impl From<Arc<str>> for Key {
    fn from(s: Arc<str>) -> Self {
        Key::Str(s)
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Int(i as i64)
    }
}

impl From<bool> for Key {
    fn from(b: bool) -> Self {
        Key::Bool(b)
    }
}

impl From<f64> for Key {
    fn from(f: f64) -> Self {
        Key::Float(OrderedFloat(f))
    }
}

/// A dynamic reactive-engine value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    /// Plain string-keyed mapping (raw, untracked until wrapped).
    Obj(Arc<ObjTarget>),
    /// Ordered sequence (raw, untracked until wrapped).
    List(Arc<ListTarget>),
    /// Keyed container with scalar keys (raw, untracked until wrapped).
    Map(Arc<MapTarget>),
    /// Set of scalar elements (raw, untracked until wrapped).
    Set(Arc<SetTarget>),
    /// A signal cell embedded as data.
    Cell(Signal),
    /// A reactive view over an aggregate.
    Reactive(ReactiveHandle),
}

impl Value {
    pub fn str(s: impl Into<Arc<str>>) -> Value {
        Value::Str(s.into())
    }

    /// New empty plain mapping.
    pub fn new_obj() -> Value {
        Value::Obj(Arc::new(ObjTarget::new()))
    }

    pub fn obj_from<K, I>(pairs: I) -> Value
    where
        K: Into<Arc<str>>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Obj(Arc::new(ObjTarget::from_pairs(
            pairs.into_iter().map(|(k, v)| (k.into(), v)),
        )))
    }

    pub fn new_list(items: impl IntoIterator<Item = Value>) -> Value {
        Value::List(Arc::new(ListTarget::new(items.into_iter().collect())))
    }

    pub fn new_map() -> Value {
        Value::Map(Arc::new(MapTarget::new()))
    }

    pub fn map_from<K, I>(pairs: I) -> Value
    where
        K: Into<Key>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(Arc::new(MapTarget::from_pairs(
            pairs.into_iter().map(|(k, v)| (k.into(), v)),
        )))
    }

    pub fn new_set() -> Value {
        Value::Set(Arc::new(SetTarget::new()))
    }

    pub fn set_from<K, I>(keys: I) -> Value
    where
        K: Into<Key>,
        I: IntoIterator<Item = K>,
    {
        Value::Set(Arc::new(SetTarget::from_keys(
            keys.into_iter().map(Into::into),
        )))
    }

    /// NaN-aware identity comparison; see the module docs.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => (a.is_nan() && b.is_nan()) || a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Obj(a), Value::Obj(b)) => Arc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            (Value::Set(a), Value::Set(b)) => Arc::ptr_eq(a, b),
            (Value::Cell(a), Value::Cell(b)) => a.ptr_eq(b),
            (Value::Reactive(a), Value::Reactive(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Raw aggregate (not a reactive view, not a cell).
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            Value::Obj(_) | Value::List(_) | Value::Map(_) | Value::Set(_)
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Obj(_) => "obj",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Cell(_) => "cell",
            Value::Reactive(_) => "reactive",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Read a keyed entry. Routes through the reactive view (tracked) when
    /// this value is one; raw aggregates are read untracked; cells
    /// delegate to their current value. Missing entries read as `Null`.
    pub fn get_key(&self, key: impl Into<Key>) -> Value {
        let key = key.into();
        match self {
            Value::Reactive(handle) => handle.get(key),
            Value::Obj(t) => key
                .as_str()
                .and_then(|name| t.get_field(name))
                .unwrap_or(Value::Null),
            Value::List(t) => key
                .as_index()
                .and_then(|i| t.get_item(i))
                .unwrap_or(Value::Null),
            Value::Map(t) => t.get_entry(&key).unwrap_or(Value::Null),
            Value::Cell(cell) => cell.get().get_key(key),
            _ => Value::Null,
        }
    }

    /// Write a keyed entry, with the same routing as [`Value::get_key`].
    pub fn set_key(
        &self,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Result<(), ReactiveError> {
        let key = key.into();
        let value = value.into();
        match self {
            Value::Reactive(handle) => handle.set(key, value),
            Value::Obj(t) => match key {
                Key::Str(name) => {
                    t.set_field(name, value);
                    Ok(())
                }
                other => Err(ReactiveError::InvalidKey(other.to_string())),
            },
            Value::List(t) => match key.as_index() {
                Some(i) => {
                    t.set_item(i, value);
                    Ok(())
                }
                None => Err(ReactiveError::InvalidKey(key.to_string())),
            },
            Value::Map(t) => {
                t.set_entry(key, value);
                Ok(())
            }
            Value::Cell(cell) => cell.get().set_key(key, value),
            _ => Err(ReactiveError::UnsupportedOperation),
        }
    }

    pub fn has_key(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        match self {
            Value::Reactive(handle) => handle.has(key),
            Value::Obj(t) => key.as_str().is_some_and(|name| t.has_field(name)),
            Value::List(t) => key.as_index().is_some_and(|i| i < t.len()),
            Value::Map(t) => t.has_entry(&key),
            Value::Set(t) => t.contains(&key),
            Value::Cell(cell) => cell.get().has_key(key),
            _ => false,
        }
    }

    pub fn len_of(&self) -> Option<usize> {
        match self {
            Value::Reactive(handle) => Some(handle.len()),
            Value::Obj(t) => Some(t.len()),
            Value::List(t) => Some(t.len()),
            Value::Map(t) => Some(t.len()),
            Value::Set(t) => Some(t.len()),
            Value::Str(s) => Some(s.chars().count()),
            Value::Cell(cell) => cell.get().len_of(),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s.as_str()))
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        match key {
            Key::Bool(b) => Value::Bool(b),
            Key::Int(i) => Value::Int(i),
            Key::Float(f) => Value::Float(f.into_inner()),
            Key::Str(s) => Value::Str(s),
        }
    }
}

impl From<Signal> for Value {
    fn from(cell: Signal) -> Self {
        Value::Cell(cell)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Obj(t) => write!(f, "Obj(#{})", t.id()),
            Value::List(t) => write!(f, "List(#{})", t.id()),
            Value::Map(t) => write!(f, "Map(#{})", t.id()),
            Value::Set(t) => write!(f, "Set(#{})", t.id()),
            Value::Cell(cell) => write!(f, "Cell(#{})", cell.id()),
            Value::Reactive(handle) => write!(f, "Reactive(#{})", handle.target_id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_is_nan_aware() {
        assert!(Value::Float(f64::NAN).same(&Value::Float(f64::NAN)));
        assert!(!Value::Float(f64::NAN).same(&Value::Float(0.0)));
        assert!(Value::Int(1).same(&Value::Float(1.0)));
        assert!(Value::from("a").same(&Value::from("a")));
        assert!(!Value::from("a").same(&Value::from("b")));
        assert!(!Value::Null.same(&Value::Bool(false)));
    }

    #[test]
    fn aggregates_compare_by_identity() {
        let a = Value::new_list([Value::Int(1)]);
        let b = Value::new_list([Value::Int(1)]);
        assert!(a.same(&a.clone()));
        assert!(!a.same(&b));
    }

    #[test]
    fn raw_key_access_round_trips() {
        let obj = Value::obj_from([("name", Value::from("weft"))]);
        assert_eq!(obj.get_key("name").as_str(), Some("weft"));
        assert!(obj.get_key("missing").same(&Value::Null));

        obj.set_key("version", Value::Int(1)).unwrap();
        assert_eq!(obj.get_key("version").as_int(), Some(1));
        assert!(obj.has_key("version"));
        assert_eq!(obj.len_of(), Some(2));
    }

    #[test]
    fn list_index_access() {
        let list = Value::new_list([Value::Int(10), Value::Int(20)]);
        assert_eq!(list.get_key(1usize).as_int(), Some(20));
        list.set_key(0usize, Value::Int(11)).unwrap();
        assert_eq!(list.get_key(0usize).as_int(), Some(11));
        assert!(list
            .set_key("name", Value::Null)
            .is_err_and(|e| matches!(e, ReactiveError::InvalidKey(_))));
    }

    #[test]
    fn key_conversions() {
        assert_eq!(Key::from(3usize).as_index(), Some(3));
        assert_eq!(Key::from(-1i64).as_index(), None);
        assert_eq!(Key::from("abc").as_str(), Some("abc"));
        assert_eq!(Key::from_value(&Value::Int(2)), Some(Key::Int(2)));
        assert_eq!(Key::from_value(&Value::new_obj()), None);
    }
}
