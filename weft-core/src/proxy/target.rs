//! Aggregate targets.
//!
//! A target is the raw, identity-bearing storage behind a reactive view:
//! a plain string-keyed mapping (`ObjTarget`), an ordered sequence
//! (`ListTarget`), a keyed container (`MapTarget`), or a set
//! (`SetTarget`). Each target owns:
//!
//! - its entries,
//! - a [`DepMap`]: the key -> Dep table reads register against and writes
//!   trigger through,
//! - the cache of reactive wrappers built over it (one per variant),
//! - a `skip` flag set by `mark_raw`.
//!
//! Embedding the dep table and wrapper cache in the target (instead of a
//! process-wide weak table keyed by target identity) gives the same
//! lifetime behavior with no global registry: when the target dies, its
//! deps and wrappers die with it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use indexmap::{IndexMap, IndexSet};

use crate::reactive::dep::Dep;
use crate::value::{Key, Value};

use super::handle::HandleInner;

/// Counter for generating unique target IDs.
static TARGET_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_target_id() -> u64 {
    TARGET_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Key under which a dep is registered in a target's dep table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum DepKey {
    /// A concrete entry (object field, sequence index, map key, set
    /// element).
    Entry(Key),
    /// The length of an ordered sequence.
    Length,
    /// "Any key" iteration over the container.
    Iterate,
    /// Key-only iteration over a keyed container.
    MapKeyIterate,
}

/// The per-target key -> Dep table.
pub(crate) struct DepMap {
    inner: Arc<RwLock<HashMap<DepKey, Arc<Dep>>>>,
}

impl DepMap {
    fn new() -> Self {
        DepMap {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get or create the dep for `key`. The dep's cleanup hook removes the
    /// key entry once the last subscriber leaves.
    pub(crate) fn ensure(&self, key: DepKey) -> Arc<Dep> {
        if let Some(dep) = self
            .inner
            .read()
            .expect("dep map lock poisoned")
            .get(&key)
        {
            return dep.clone();
        }
        let mut map = self.inner.write().expect("dep map lock poisoned");
        map.entry(key.clone())
            .or_insert_with(|| {
                let weak = Arc::downgrade(&self.inner);
                Dep::new(
                    Box::new(move || {
                        if let Some(map) = weak.upgrade() {
                            map.write().expect("dep map lock poisoned").remove(&key);
                        }
                    }),
                    None,
                )
            })
            .clone()
    }

    pub(crate) fn get(&self, key: &DepKey) -> Option<Arc<Dep>> {
        self.inner
            .read()
            .expect("dep map lock poisoned")
            .get(key)
            .cloned()
    }

    pub(crate) fn all(&self) -> Vec<Arc<Dep>> {
        self.inner
            .read()
            .expect("dep map lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub(crate) fn entries(&self) -> Vec<(DepKey, Arc<Dep>)> {
        self.inner
            .read()
            .expect("dep map lock poisoned")
            .iter()
            .map(|(k, d)| (k.clone(), d.clone()))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn key_count(&self) -> usize {
        self.inner.read().expect("dep map lock poisoned").len()
    }
}

/// Cache of reactive wrappers built over one target, keyed by variant
/// code. Weak so an unused wrapper can die with its last handle.
pub(crate) struct WrapperCache {
    slots: RwLock<HashMap<u8, Weak<HandleInner>>>,
}

impl WrapperCache {
    fn new() -> Self {
        WrapperCache {
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn get(&self, code: u8) -> Option<Arc<HandleInner>> {
        self.slots
            .read()
            .expect("wrapper cache lock poisoned")
            .get(&code)
            .and_then(Weak::upgrade)
    }

    pub(crate) fn insert(&self, code: u8, inner: &Arc<HandleInner>) {
        self.slots
            .write()
            .expect("wrapper cache lock poisoned")
            .insert(code, Arc::downgrade(inner));
    }
}

/// Plain string-keyed mapping.
pub struct ObjTarget {
    id: u64,
    pub(crate) entries: RwLock<IndexMap<Arc<str>, Value>>,
    pub(crate) deps: DepMap,
    pub(crate) cache: WrapperCache,
    skip: AtomicBool,
}

impl ObjTarget {
    pub fn new() -> Self {
        Self::from_pairs(std::iter::empty::<(Arc<str>, Value)>())
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (Arc<str>, Value)>) -> Self {
        ObjTarget {
            id: next_target_id(),
            entries: RwLock::new(pairs.into_iter().collect()),
            deps: DepMap::new(),
            cache: WrapperCache::new(),
            skip: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.entries
            .read()
            .expect("obj entries lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn set_field(&self, name: impl Into<Arc<str>>, value: Value) -> Option<Value> {
        self.entries
            .write()
            .expect("obj entries lock poisoned")
            .insert(name.into(), value)
    }

    pub fn remove_field(&self, name: &str) -> Option<Value> {
        self.entries
            .write()
            .expect("obj entries lock poisoned")
            .shift_remove(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.entries
            .read()
            .expect("obj entries lock poisoned")
            .contains_key(name)
    }

    pub fn field_names(&self) -> Vec<Arc<str>> {
        self.entries
            .read()
            .expect("obj entries lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("obj entries lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ObjTarget {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordered sequence.
pub struct ListTarget {
    id: u64,
    pub(crate) items: RwLock<Vec<Value>>,
    pub(crate) deps: DepMap,
    pub(crate) cache: WrapperCache,
    skip: AtomicBool,
}

impl ListTarget {
    pub fn new(items: Vec<Value>) -> Self {
        ListTarget {
            id: next_target_id(),
            items: RwLock::new(items),
            deps: DepMap::new(),
            cache: WrapperCache::new(),
            skip: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn get_item(&self, index: usize) -> Option<Value> {
        self.items
            .read()
            .expect("list items lock poisoned")
            .get(index)
            .cloned()
    }

    /// Raw positional write; writing past the end pads with `Null`.
    pub fn set_item(&self, index: usize, value: Value) -> Option<Value> {
        let mut items = self.items.write().expect("list items lock poisoned");
        if index < items.len() {
            Some(std::mem::replace(&mut items[index], value))
        } else {
            while items.len() < index {
                items.push(Value::Null);
            }
            items.push(value);
            None
        }
    }

    pub fn items_snapshot(&self) -> Vec<Value> {
        self.items.read().expect("list items lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.items.read().expect("list items lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keyed container with scalar keys.
pub struct MapTarget {
    id: u64,
    pub(crate) entries: RwLock<IndexMap<Key, Value>>,
    pub(crate) deps: DepMap,
    pub(crate) cache: WrapperCache,
    skip: AtomicBool,
}

impl MapTarget {
    pub fn new() -> Self {
        Self::from_pairs(std::iter::empty())
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (Key, Value)>) -> Self {
        MapTarget {
            id: next_target_id(),
            entries: RwLock::new(pairs.into_iter().collect()),
            deps: DepMap::new(),
            cache: WrapperCache::new(),
            skip: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn get_entry(&self, key: &Key) -> Option<Value> {
        self.entries
            .read()
            .expect("map entries lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn set_entry(&self, key: Key, value: Value) -> Option<Value> {
        self.entries
            .write()
            .expect("map entries lock poisoned")
            .insert(key, value)
    }

    pub fn remove_entry(&self, key: &Key) -> Option<Value> {
        self.entries
            .write()
            .expect("map entries lock poisoned")
            .shift_remove(key)
    }

    pub fn has_entry(&self, key: &Key) -> bool {
        self.entries
            .read()
            .expect("map entries lock poisoned")
            .contains_key(key)
    }

    pub fn keys_snapshot(&self) -> Vec<Key> {
        self.entries
            .read()
            .expect("map entries lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("map entries lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MapTarget {
    fn default() -> Self {
        Self::new()
    }
}

/// Set of scalar elements.
pub struct SetTarget {
    id: u64,
    pub(crate) items: RwLock<IndexSet<Key>>,
    pub(crate) deps: DepMap,
    pub(crate) cache: WrapperCache,
    skip: AtomicBool,
}

impl SetTarget {
    pub fn new() -> Self {
        Self::from_keys(std::iter::empty())
    }

    pub fn from_keys(keys: impl IntoIterator<Item = Key>) -> Self {
        SetTarget {
            id: next_target_id(),
            items: RwLock::new(keys.into_iter().collect()),
            deps: DepMap::new(),
            cache: WrapperCache::new(),
            skip: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.items
            .read()
            .expect("set items lock poisoned")
            .contains(key)
    }

    pub fn insert_key(&self, key: Key) -> bool {
        self.items
            .write()
            .expect("set items lock poisoned")
            .insert(key)
    }

    pub fn remove_key(&self, key: &Key) -> bool {
        self.items
            .write()
            .expect("set items lock poisoned")
            .shift_remove(key)
    }

    pub fn keys_snapshot(&self) -> Vec<Key> {
        self.items
            .read()
            .expect("set items lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.read().expect("set items lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SetTarget {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased handle to any target kind.
#[derive(Clone)]
pub(crate) enum Target {
    Obj(Arc<ObjTarget>),
    List(Arc<ListTarget>),
    Map(Arc<MapTarget>),
    Set(Arc<SetTarget>),
}

impl Target {
    pub(crate) fn from_value(value: &Value) -> Option<Target> {
        match value {
            Value::Obj(t) => Some(Target::Obj(t.clone())),
            Value::List(t) => Some(Target::List(t.clone())),
            Value::Map(t) => Some(Target::Map(t.clone())),
            Value::Set(t) => Some(Target::Set(t.clone())),
            _ => None,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        match self {
            Target::Obj(t) => t.id,
            Target::List(t) => t.id,
            Target::Map(t) => t.id,
            Target::Set(t) => t.id,
        }
    }

    pub(crate) fn deps(&self) -> &DepMap {
        match self {
            Target::Obj(t) => &t.deps,
            Target::List(t) => &t.deps,
            Target::Map(t) => &t.deps,
            Target::Set(t) => &t.deps,
        }
    }

    pub(crate) fn cache(&self) -> &WrapperCache {
        match self {
            Target::Obj(t) => &t.cache,
            Target::List(t) => &t.cache,
            Target::Map(t) => &t.cache,
            Target::Set(t) => &t.cache,
        }
    }

    pub(crate) fn is_list(&self) -> bool {
        matches!(self, Target::List(_))
    }

    pub(crate) fn is_map(&self) -> bool {
        matches!(self, Target::Map(_))
    }

    pub(crate) fn to_value(&self) -> Value {
        match self {
            Target::Obj(t) => Value::Obj(t.clone()),
            Target::List(t) => Value::List(t.clone()),
            Target::Map(t) => Value::Map(t.clone()),
            Target::Set(t) => Value::Set(t.clone()),
        }
    }

    pub(crate) fn ptr_eq(&self, other: &Target) -> bool {
        self.id() == other.id()
    }
}

/// `mark_raw` support: flag a raw aggregate so it is never wrapped.
pub(crate) fn mark_skip(value: &Value) -> bool {
    match value {
        Value::Obj(t) => t.skip.store(true, Ordering::Relaxed),
        Value::List(t) => t.skip.store(true, Ordering::Relaxed),
        Value::Map(t) => t.skip.store(true, Ordering::Relaxed),
        Value::Set(t) => t.skip.store(true, Ordering::Relaxed),
        _ => return false,
    }
    true
}

pub(crate) fn is_skipped(value: &Value) -> bool {
    match value {
        Value::Obj(t) => t.skip.load(Ordering::Relaxed),
        Value::List(t) => t.skip.load(Ordering::Relaxed),
        Value::Map(t) => t.skip.load(Ordering::Relaxed),
        Value::Set(t) => t.skip.load(Ordering::Relaxed),
        _ => false,
    }
}
