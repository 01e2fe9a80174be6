//! Operations on reactive views.
//!
//! Every read records a dependency for the active effect (under the key it
//! addressed, or a reserved iteration key), every successful write
//! triggers the deps its fan-out rule names. Readonly wrappers reject
//! writes with a development warning and no state change.
//!
//! The length-mutating sequence operations (`push`, `pop`, `shift`,
//! `unshift`, `splice`) run under paused tracking and paused scheduling:
//! internal length reads must not become dependencies of the calling
//! effect (they would self-trigger), and subscribers drain exactly once
//! when the operation completes.

use std::sync::Arc;

use crate::dev_warn;
use crate::error::ReactiveError;
use crate::reactive::context::PauseTracking;
use crate::reactive::debug::OpKind;
use crate::reactive::scheduler::PauseScheduling;
use crate::value::{Key, Value};

use super::handle::{
    is_readonly as value_is_readonly, is_shallow as value_is_shallow, reactive, to_raw,
    wrap_target, ReactiveHandle,
};
use super::target::{is_skipped, DepKey, ListTarget, MapTarget, SetTarget, Target};
use super::track::{track_target, trigger_length_set, trigger_target};

impl ReactiveHandle {
    fn raw_get(&self, key: &Key) -> Option<Value> {
        match &self.inner.target {
            Target::Obj(t) => key.as_str().and_then(|name| t.get_field(name)),
            Target::List(t) => key.as_index().and_then(|i| t.get_item(i)),
            Target::Map(t) => t.get_entry(key),
            Target::Set(_) => None,
        }
    }

    /// Apply the deep-read rules to a raw entry value: unwrap cells on
    /// non-sequence targets, wrap nested aggregates with this wrapper's
    /// polarity. Shallow wrappers return the raw value untouched.
    fn wrap_read_result(&self, raw: Value) -> Value {
        if self.inner.shallow {
            return raw;
        }
        match raw {
            Value::Cell(cell) => {
                if self.inner.target.is_list() {
                    Value::Cell(cell)
                } else {
                    cell.get()
                }
            }
            other if other.is_aggregate() => {
                if self.inner.readonly {
                    if is_skipped(&other) {
                        return other;
                    }
                    match Target::from_value(&other) {
                        Some(target) => Value::Reactive(wrap_target(
                            target,
                            true,
                            false,
                            self.inner.inner_reactive,
                        )),
                        None => other,
                    }
                } else {
                    reactive(other)
                }
            }
            other => other,
        }
    }

    /// Tracked raw read; `None` when the key is absent.
    pub(crate) fn get_opt(&self, key: &Key) -> Option<Value> {
        if self.tracks_reads() {
            track_target(&self.inner.target, OpKind::Get, DepKey::Entry(key.clone()));
        }
        self.raw_get(key)
    }

    pub(crate) fn get_wrapped_opt(&self, key: &Key) -> Option<Value> {
        self.get_opt(key).map(|v| self.wrap_read_result(v))
    }

    /// Read an entry. Missing entries read as `Null`.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let key = key.into();
        self.get_wrapped_opt(&key).unwrap_or(Value::Null)
    }

    /// Membership test, tracked under the key.
    pub fn has(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        if self.tracks_reads() {
            track_target(&self.inner.target, OpKind::Has, DepKey::Entry(key.clone()));
        }
        match &self.inner.target {
            Target::Obj(t) => key.as_str().is_some_and(|name| t.has_field(name)),
            Target::List(t) => key.as_index().is_some_and(|i| i < t.len()),
            Target::Map(t) => t.has_entry(&key),
            Target::Set(t) => t.contains(&key),
        }
    }

    /// Element count, tracked as an iteration (`Length` for sequences).
    pub fn len(&self) -> usize {
        if self.tracks_reads() {
            let key = if self.inner.target.is_list() {
                DepKey::Length
            } else {
                DepKey::Iterate
            };
            track_target(&self.inner.target, OpKind::Iterate, key);
        }
        match &self.inner.target {
            Target::Obj(t) => t.len(),
            Target::List(t) => t.len(),
            Target::Map(t) => t.len(),
            Target::Set(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Key iteration. Keyed containers track key-only iteration, so value
    /// overwrites do not re-run key iterators.
    pub fn keys(&self) -> Vec<Key> {
        if self.tracks_reads() {
            match &self.inner.target {
                Target::List(_) => {
                    track_target(&self.inner.target, OpKind::Iterate, DepKey::Length)
                }
                Target::Map(_) => {
                    track_target(&self.inner.target, OpKind::Iterate, DepKey::MapKeyIterate)
                }
                _ => track_target(&self.inner.target, OpKind::Iterate, DepKey::Iterate),
            }
        }
        match &self.inner.target {
            Target::Obj(t) => t.field_names().into_iter().map(Key::Str).collect(),
            Target::List(t) => (0..t.len()).map(|i| Key::Int(i as i64)).collect(),
            Target::Map(t) => t.keys_snapshot(),
            Target::Set(t) => t.keys_snapshot(),
        }
    }

    /// Entry iteration with deep-read semantics applied to each value.
    ///
    /// Plain mappings and sequences also track each visited entry, which is
    /// what an interceptor-based loop over them would have recorded; keyed
    /// containers rely on the `Set -> Iterate` fan-out instead.
    pub fn entries(&self) -> Vec<(Key, Value)> {
        let target = self.inner.target.clone();
        match &target {
            Target::Obj(t) => {
                if self.tracks_reads() {
                    track_target(&target, OpKind::Iterate, DepKey::Iterate);
                }
                let pairs: Vec<(Arc<str>, Value)> = t
                    .entries
                    .read()
                    .expect("obj entries lock poisoned")
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                pairs
                    .into_iter()
                    .map(|(name, value)| {
                        let key = Key::Str(name);
                        if self.tracks_reads() {
                            track_target(&target, OpKind::Get, DepKey::Entry(key.clone()));
                        }
                        (key, self.wrap_read_result(value))
                    })
                    .collect()
            }
            Target::List(t) => {
                if self.tracks_reads() {
                    track_target(&target, OpKind::Iterate, DepKey::Length);
                }
                t.items_snapshot()
                    .into_iter()
                    .enumerate()
                    .map(|(i, value)| {
                        let key = Key::Int(i as i64);
                        if self.tracks_reads() {
                            track_target(&target, OpKind::Get, DepKey::Entry(key.clone()));
                        }
                        (key, self.wrap_read_result(value))
                    })
                    .collect()
            }
            Target::Map(t) => {
                if self.tracks_reads() {
                    track_target(&target, OpKind::Iterate, DepKey::Iterate);
                }
                let pairs: Vec<(Key, Value)> = t
                    .entries
                    .read()
                    .expect("map entries lock poisoned")
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                pairs
                    .into_iter()
                    .map(|(key, value)| (key, self.wrap_read_result(value)))
                    .collect()
            }
            Target::Set(t) => {
                if self.tracks_reads() {
                    track_target(&target, OpKind::Iterate, DepKey::Iterate);
                }
                t.keys_snapshot()
                    .into_iter()
                    .map(|key| (key.clone(), Value::from(key)))
                    .collect()
            }
        }
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    /// Write an entry. Emits `Add` for new keys, `Set` when the value
    /// actually changed (NaN-aware), and nothing otherwise.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<(), ReactiveError> {
        let key = key.into();
        let mut value = value.into();
        if self.inner.readonly {
            dev_warn!("set operation on key `{key}` failed: target is readonly");
            return Err(ReactiveError::ReadonlyWrite);
        }
        let target = self.inner.target.clone();
        if matches!(target, Target::Set(_)) {
            return Err(ReactiveError::UnsupportedOperation);
        }

        let mut old = self.raw_get(&key);
        if !self.inner.shallow {
            if !value_is_shallow(&value) && !value_is_readonly(&value) {
                old = old.map(|o| to_raw(&o));
                value = to_raw(&value);
            }
            // A cell already in the slot absorbs a non-cell write.
            if !target.is_list() {
                if let Some(Value::Cell(cell)) = &old {
                    if !matches!(value, Value::Cell(_)) {
                        if cell.is_readonly() {
                            dev_warn!(
                                "set operation on key `{key}` failed: slot holds a readonly cell"
                            );
                            return Err(ReactiveError::ReadonlyWrite);
                        }
                        cell.set(value);
                        return Ok(());
                    }
                }
            }
        }

        let had_key = match &target {
            Target::Obj(t) => {
                let name = match &key {
                    Key::Str(name) => name.clone(),
                    other => return Err(ReactiveError::InvalidKey(other.to_string())),
                };
                let had = t.has_field(&name);
                t.set_field(name, value.clone());
                had
            }
            Target::List(t) => {
                let index = key
                    .as_index()
                    .ok_or_else(|| ReactiveError::InvalidKey(key.to_string()))?;
                let had = index < t.len();
                t.set_item(index, value.clone());
                had
            }
            Target::Map(t) => {
                let had = t.has_entry(&key);
                t.set_entry(key.clone(), value.clone());
                had
            }
            Target::Set(_) => unreachable!("rejected above"),
        };

        if !had_key {
            trigger_target(&target, OpKind::Add, Some(key), Some(&value), None, None);
        } else if !value.same(old.as_ref().unwrap_or(&Value::Null)) {
            trigger_target(
                &target,
                OpKind::Set,
                Some(key),
                Some(&value),
                old.as_ref(),
                None,
            );
        }
        Ok(())
    }

    /// Delete an entry. Returns whether the key was present.
    pub fn remove(&self, key: impl Into<Key>) -> Result<bool, ReactiveError> {
        let key = key.into();
        if self.inner.readonly {
            dev_warn!("delete operation on key `{key}` failed: target is readonly");
            return Err(ReactiveError::ReadonlyWrite);
        }
        let target = self.inner.target.clone();
        let old = match &target {
            Target::Obj(t) => match key.as_str() {
                Some(name) => t.remove_field(name),
                None => None,
            },
            Target::Map(t) => t.remove_entry(&key),
            Target::Set(t) => {
                if t.remove_key(&key) {
                    Some(Value::from(key.clone()))
                } else {
                    None
                }
            }
            Target::List(t) => match key.as_index() {
                // Deleting a sequence slot leaves a hole; the length is
                // untouched.
                Some(index) if index < t.len() => t.set_item(index, Value::Null),
                _ => None,
            },
        };
        match old {
            Some(old) => {
                trigger_target(&target, OpKind::Delete, Some(key), None, Some(&old), None);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Insert an element into a set.
    pub fn add(&self, key: impl Into<Key>) -> Result<(), ReactiveError> {
        let key = key.into();
        if self.inner.readonly {
            dev_warn!("add operation failed: target is readonly");
            return Err(ReactiveError::ReadonlyWrite);
        }
        let Target::Set(t) = &self.inner.target else {
            return Err(ReactiveError::UnsupportedOperation);
        };
        if t.insert_key(key.clone()) {
            let value = Value::from(key.clone());
            trigger_target(
                &self.inner.target,
                OpKind::Add,
                Some(key),
                Some(&value),
                None,
                None,
            );
        }
        Ok(())
    }

    /// Empty a keyed container or set, triggering every registered dep.
    pub fn clear(&self) -> Result<(), ReactiveError> {
        if self.inner.readonly {
            dev_warn!("clear operation failed: target is readonly");
            return Err(ReactiveError::ReadonlyWrite);
        }
        let target = self.inner.target.clone();
        let old_target = match &target {
            Target::Map(t) => {
                let mut entries = t.entries.write().expect("map entries lock poisoned");
                if entries.is_empty() {
                    return Ok(());
                }
                let snapshot = Value::Map(Arc::new(MapTarget::from_pairs(entries.clone())));
                entries.clear();
                snapshot
            }
            Target::Set(t) => {
                let mut items = t.items.write().expect("set items lock poisoned");
                if items.is_empty() {
                    return Ok(());
                }
                let snapshot = Value::Set(Arc::new(SetTarget::from_keys(items.iter().cloned())));
                items.clear();
                snapshot
            }
            _ => return Err(ReactiveError::UnsupportedOperation),
        };
        trigger_target(&target, OpKind::Clear, None, None, None, Some(old_target));
        Ok(())
    }

    fn expect_list(&self) -> Result<Arc<ListTarget>, ReactiveError> {
        match &self.inner.target {
            Target::List(t) => Ok(t.clone()),
            _ => Err(ReactiveError::UnsupportedOperation),
        }
    }

    /// Append to a sequence. Returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> Result<usize, ReactiveError> {
        let list = self.expect_list()?;
        let _track = PauseTracking::new();
        let _sched = PauseScheduling::new();
        let len = list.len();
        self.set(Key::Int(len as i64), value)?;
        Ok(len + 1)
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Result<Option<Value>, ReactiveError> {
        if self.inner.readonly {
            dev_warn!("pop operation failed: target is readonly");
            return Err(ReactiveError::ReadonlyWrite);
        }
        let list = self.expect_list()?;
        let _track = PauseTracking::new();
        let _sched = PauseScheduling::new();
        let (removed, new_len) = {
            let mut items = list.items.write().expect("list items lock poisoned");
            match items.pop() {
                Some(value) => {
                    let len = items.len();
                    (Some(value), len)
                }
                None => (None, 0),
            }
        };
        if let Some(old) = &removed {
            trigger_target(
                &self.inner.target,
                OpKind::Delete,
                Some(Key::Int(new_len as i64)),
                None,
                Some(old),
                None,
            );
            trigger_length_set(&self.inner.target, new_len);
        }
        Ok(removed.map(|value| self.wrap_read_result(value)))
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Result<Option<Value>, ReactiveError> {
        let mut removed = self.splice(0, 1, Vec::new())?;
        Ok(if removed.is_empty() {
            None
        } else {
            Some(removed.remove(0))
        })
    }

    /// Prepend an element. Returns the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> Result<usize, ReactiveError> {
        self.splice(0, 0, vec![value.into()])?;
        Ok(self.expect_list()?.len())
    }

    /// Replace `delete_count` elements starting at `start` with `inserts`,
    /// returning the removed elements.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        inserts: Vec<Value>,
    ) -> Result<Vec<Value>, ReactiveError> {
        if self.inner.readonly {
            dev_warn!("splice operation failed: target is readonly");
            return Err(ReactiveError::ReadonlyWrite);
        }
        let list = self.expect_list()?;
        let _track = PauseTracking::new();
        let _sched = PauseScheduling::new();

        let inserts: Vec<Value> = inserts
            .into_iter()
            .map(|value| {
                if !self.inner.shallow && !value_is_shallow(&value) && !value_is_readonly(&value) {
                    to_raw(&value)
                } else {
                    value
                }
            })
            .collect();

        let (old_items, new_items, removed) = {
            let mut items = list.items.write().expect("list items lock poisoned");
            let old = items.clone();
            let start = start.min(items.len());
            let end = (start + delete_count).min(items.len());
            let removed: Vec<Value> = items.splice(start..end, inserts).collect();
            (old, items.clone(), removed)
        };

        let target = &self.inner.target;
        let old_len = old_items.len();
        let new_len = new_items.len();
        for i in 0..old_len.min(new_len) {
            if !new_items[i].same(&old_items[i]) {
                trigger_target(
                    target,
                    OpKind::Set,
                    Some(Key::Int(i as i64)),
                    Some(&new_items[i]),
                    Some(&old_items[i]),
                    None,
                );
            }
        }
        if new_len > old_len {
            for (i, item) in new_items.iter().enumerate().take(new_len).skip(old_len) {
                trigger_target(
                    target,
                    OpKind::Add,
                    Some(Key::Int(i as i64)),
                    Some(item),
                    None,
                    None,
                );
            }
        } else if new_len < old_len {
            trigger_length_set(target, new_len);
        }

        Ok(removed
            .into_iter()
            .map(|value| self.wrap_read_result(value))
            .collect())
    }

    /// Resize a sequence, truncating or padding with `Null`.
    pub fn set_len(&self, new_len: usize) -> Result<(), ReactiveError> {
        if self.inner.readonly {
            dev_warn!("length write failed: target is readonly");
            return Err(ReactiveError::ReadonlyWrite);
        }
        let list = self.expect_list()?;
        let old_len = {
            let mut items = list.items.write().expect("list items lock poisoned");
            let old_len = items.len();
            if new_len < old_len {
                items.truncate(new_len);
            } else {
                while items.len() < new_len {
                    items.push(Value::Null);
                }
            }
            old_len
        };
        if old_len != new_len {
            trigger_length_set(&self.inner.target, new_len);
        }
        Ok(())
    }

    /// Identity-sensitive search: tracks every index, and retries with the
    /// raw-unwrapped needle so wrapped elements are found transparently.
    pub fn includes(&self, value: &Value) -> bool {
        self.search(value, false).is_some()
    }

    pub fn index_of(&self, value: &Value) -> i64 {
        self.search(value, false).map(|i| i as i64).unwrap_or(-1)
    }

    pub fn last_index_of(&self, value: &Value) -> i64 {
        self.search(value, true).map(|i| i as i64).unwrap_or(-1)
    }

    fn search(&self, value: &Value, from_end: bool) -> Option<usize> {
        let Target::List(list) = &self.inner.target else {
            return None;
        };
        let items = list.items_snapshot();
        if self.tracks_reads() {
            for i in 0..items.len() {
                track_target(
                    &self.inner.target,
                    OpKind::Get,
                    DepKey::Entry(Key::Int(i as i64)),
                );
            }
        }
        let find = |needle: &Value| {
            if from_end {
                items.iter().rposition(|item| item.same(needle))
            } else {
                items.iter().position(|item| item.same(needle))
            }
        };
        find(value).or_else(|| {
            let raw = to_raw(value);
            if raw.same(value) {
                None
            } else {
                find(&raw)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::handle::{readonly, shallow_reactive};
    use crate::reactive::effect::effect;
    use crate::reactive::signal::signal;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn as_handle(value: &Value) -> ReactiveHandle {
        match value {
            Value::Reactive(handle) => handle.clone(),
            other => panic!("expected reactive value, got {}", other.type_name()),
        }
    }

    fn counting_effect<F>(f: F) -> Arc<AtomicI32>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            f();
        });
        runs
    }

    #[test]
    fn deep_read_wraps_nested_aggregates() {
        let inner = Value::new_obj();
        let outer = reactive(Value::obj_from([("inner", inner)]));
        let handle = as_handle(&outer);

        let child = handle.get("inner");
        assert!(matches!(child, Value::Reactive(_)));

        // Shallow wrappers return the raw child.
        let raw = to_raw(&outer);
        let shallow = shallow_reactive(raw);
        let child = as_handle(&shallow).get("inner");
        assert!(matches!(child, Value::Obj(_)));
    }

    #[test]
    fn cell_in_mapping_unwraps_and_absorbs_writes() {
        let cell = signal(1);
        let obj = reactive(Value::obj_from([("count", Value::Cell(cell.clone()))]));
        let handle = as_handle(&obj);

        assert_eq!(handle.get("count").as_int(), Some(1));

        handle.set("count", Value::Int(5)).unwrap();
        assert_eq!(cell.get_untracked().as_int(), Some(5));
        // The slot still holds the cell.
        assert!(matches!(handle.raw_get(&Key::from("count")), Some(Value::Cell(_))));
    }

    #[test]
    fn cells_in_sequences_are_not_unwrapped() {
        let cell = signal(1);
        let list = reactive(Value::new_list([Value::Cell(cell.clone())]));
        let handle = as_handle(&list);
        assert!(matches!(handle.get(0usize), Value::Cell(_)));
    }

    #[test]
    fn add_and_delete_retrigger_mapping_iteration() {
        let obj = reactive(Value::new_obj());
        let handle = as_handle(&obj);

        let h = handle.clone();
        let runs = counting_effect(move || {
            let _ = h.len();
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        handle.set("a", Value::Int(1)).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // Overwriting an existing key does not change the key set.
        handle.set("a", Value::Int(2)).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        handle.remove("a").unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn keyed_container_set_retriggers_value_iteration_but_not_key_iteration() {
        let map = reactive(Value::map_from([("a", Value::Int(1))]));
        let handle = as_handle(&map);

        let h = handle.clone();
        let value_runs = counting_effect(move || {
            let _ = h.entries();
        });
        let h = handle.clone();
        let key_runs = counting_effect(move || {
            let _ = h.keys();
        });

        handle.set("a", Value::Int(2)).unwrap();
        assert_eq!(value_runs.load(Ordering::SeqCst), 2);
        assert_eq!(key_runs.load(Ordering::SeqCst), 1);

        handle.set("b", Value::Int(3)).unwrap();
        assert_eq!(value_runs.load(Ordering::SeqCst), 3);
        assert_eq!(key_runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_triggers_every_registered_dep() {
        let map = reactive(Value::map_from([("a", Value::Int(1))]));
        let handle = as_handle(&map);

        let h = handle.clone();
        let reader_runs = counting_effect(move || {
            let _ = h.get("a");
        });
        let h = handle.clone();
        let size_runs = counting_effect(move || {
            let _ = h.len();
        });

        handle.clear().unwrap();
        assert_eq!(reader_runs.load(Ordering::SeqCst), 2);
        assert_eq!(size_runs.load(Ordering::SeqCst), 2);

        // Clearing an already-empty container is a no-op.
        handle.clear().unwrap();
        assert_eq!(size_runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn push_triggers_a_length_effect_exactly_once() {
        let list = reactive(Value::new_list([Value::Int(1), Value::Int(2)]));
        let handle = as_handle(&list);

        let h = handle.clone();
        let runs = counting_effect(move || {
            let _ = h.len();
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        handle.push(Value::Int(3)).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(handle.len(), 3);
    }

    #[test]
    fn shrinking_length_retriggers_truncated_index_readers() {
        let list = reactive(Value::new_list([
            Value::Int(0),
            Value::Int(1),
            Value::Int(2),
        ]));
        let handle = as_handle(&list);

        let h = handle.clone();
        let tail_runs = counting_effect(move || {
            let _ = h.get(2usize);
        });
        let h = handle.clone();
        let head_runs = counting_effect(move || {
            let _ = h.get(0usize);
        });

        handle.set_len(1).unwrap();
        assert_eq!(tail_runs.load(Ordering::SeqCst), 2);
        assert_eq!(head_runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shift_reindexes_and_retriggers_readers() {
        let list = reactive(Value::new_list([Value::Int(10), Value::Int(20)]));
        let handle = as_handle(&list);

        let h = handle.clone();
        let runs = counting_effect(move || {
            let _ = h.get(0usize);
        });

        let removed = handle.shift().unwrap().unwrap();
        assert_eq!(removed.as_int(), Some(10));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(handle.get(0usize).as_int(), Some(20));
        assert_eq!(handle.len(), 1);
    }

    #[test]
    fn search_is_transparent_over_wrapped_elements() {
        let element = Value::new_obj();
        let list = reactive(Value::new_list([Value::Int(1), element.clone()]));
        let handle = as_handle(&list);

        // Searching for the wrapped element falls back to raw comparison.
        let wrapped = reactive(element);
        assert_eq!(handle.index_of(&wrapped), 1);
        assert!(handle.includes(&wrapped));
        assert_eq!(handle.index_of(&Value::Int(7)), -1);
    }

    #[test]
    fn search_tracks_indices() {
        let list = reactive(Value::new_list([Value::Int(1), Value::Int(2)]));
        let handle = as_handle(&list);

        let h = handle.clone();
        let runs = counting_effect(move || {
            let _ = h.includes(&Value::Int(9));
        });

        handle.set(1usize, Value::Int(9)).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn readonly_rejects_mutation_without_state_change() {
        let raw = Value::obj_from([("a", Value::Int(1))]);
        let ro = readonly(raw.clone());
        let handle = as_handle(&ro);

        assert_eq!(
            handle.set("a", Value::Int(2)),
            Err(ReactiveError::ReadonlyWrite)
        );
        assert_eq!(handle.remove("a"), Err(ReactiveError::ReadonlyWrite));
        assert_eq!(raw.get_key("a").as_int(), Some(1));
    }

    #[test]
    fn readonly_over_reactive_still_tracks() {
        let r = reactive(Value::obj_from([("a", Value::Int(1))]));
        let ro = readonly(r.clone());
        let ro_handle = as_handle(&ro);

        let runs = counting_effect(move || {
            let _ = ro_handle.get("a");
        });

        as_handle(&r).set("a", Value::Int(2)).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn readonly_over_raw_does_not_track() {
        let raw = Value::obj_from([("a", Value::Int(1))]);
        let r = reactive(raw.clone());
        let ro = readonly(raw);
        let ro_handle = as_handle(&ro);

        let runs = counting_effect(move || {
            let _ = ro_handle.get("a");
        });

        as_handle(&r).set("a", Value::Int(2)).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn set_membership_and_iteration() {
        let set = reactive(Value::set_from(["a"]));
        let handle = as_handle(&set);

        let h = handle.clone();
        let member_runs = counting_effect(move || {
            let _ = h.has("b");
        });
        let h = handle.clone();
        let iter_runs = counting_effect(move || {
            let _ = h.len();
        });

        handle.add("b").unwrap();
        assert_eq!(member_runs.load(Ordering::SeqCst), 2);
        assert_eq!(iter_runs.load(Ordering::SeqCst), 2);

        // Re-adding an existing element changes nothing.
        handle.add("b").unwrap();
        assert_eq!(iter_runs.load(Ordering::SeqCst), 2);

        assert!(handle.remove("a").unwrap());
        assert_eq!(iter_runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn nan_writes_do_not_retrigger() {
        let list = reactive(Value::new_list([Value::Float(f64::NAN)]));
        let handle = as_handle(&list);

        let h = handle.clone();
        let runs = counting_effect(move || {
            let _ = h.get(0usize);
        });

        handle.set(0usize, Value::Float(f64::NAN)).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
