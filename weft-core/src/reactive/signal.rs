//! Signal Cells
//!
//! A signal cell is a one-slot value carrier. Reads inside a running
//! effect register the effect against the cell's dep; writes compare the
//! new value against the stored raw value (NaN-aware) and trigger
//! subscribers only on an actual change.
//!
//! A deep cell keeps two views of its value: `raw` (unwrapped) and `view`
//! (the reactive wrapper, when the value is an aggregate). Reads return
//! the view, so nested mutation through a cell is tracked by the proxy
//! layer. Shallow cells store the value as given.
//!
//! Beyond the plain cell, this module provides the cell utilities:
//! user-defined cells ([`custom_signal`]), two-way key projections
//! ([`project`], [`project_all`]), read-only getter cells
//! ([`from_getter`]), and the `unwrap`/`to_value`/`is_signal`/
//! [`trigger_signal`] helpers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::dev_warn;
use crate::proxy::handle::{is_proxy, is_readonly, is_shallow, to_raw, to_reactive};
use crate::proxy::track::trigger_target;
use crate::value::{Key, Value};

use super::context;
use super::debug::{DebugEvent, OpKind};
use super::dep::{Dep, LazyDep};
use super::effect::DirtyLevel;

/// Counter for generating unique cell IDs.
static CELL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_cell_id() -> u64 {
    CELL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Common behavior of every cell flavor (plain, custom, projection,
/// getter, derivation).
pub trait SignalLike: Send + Sync {
    /// Tracked read.
    fn get(&self) -> Value;
    /// Write; read-only flavors warn and ignore.
    fn set(&self, value: Value);
    /// Read without registering a dependency.
    fn get_untracked(&self) -> Value;
    /// The cell's dep, if it has materialized.
    fn dep_handle(&self) -> Option<Arc<Dep>>;
    fn id(&self) -> u64;
    fn is_readonly(&self) -> bool {
        false
    }
    fn is_shallow(&self) -> bool {
        false
    }
    /// Force a full-strength trigger without a value change.
    fn force_trigger(&self);
}

/// A signal cell handle. Cloning shares the cell.
#[derive(Clone)]
pub struct Signal(pub(crate) Arc<dyn SignalLike>);

impl Signal {
    /// Read the current value, registering the running effect as a
    /// subscriber.
    pub fn get(&self) -> Value {
        self.0.get()
    }

    /// Write a new value, triggering subscribers if it actually changed.
    pub fn set(&self, value: impl Into<Value>) {
        self.0.set(value.into());
    }

    /// Read without establishing a dependency.
    pub fn get_untracked(&self) -> Value {
        self.0.get_untracked()
    }

    /// Update based on the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&Value) -> Value,
    {
        let next = f(&self.0.get_untracked());
        self.0.set(next);
    }

    pub fn id(&self) -> u64 {
        self.0.id()
    }

    pub fn is_readonly(&self) -> bool {
        self.0.is_readonly()
    }

    pub fn is_shallow(&self) -> bool {
        self.0.is_shallow()
    }

    /// Number of effects currently subscribed to this cell.
    pub fn subscriber_count(&self) -> usize {
        self.0.dep_handle().map(|dep| dep.len()).unwrap_or(0)
    }

    pub(crate) fn dep_handle(&self) -> Option<Arc<Dep>> {
        self.0.dep_handle()
    }

    pub fn ptr_eq(&self, other: &Signal) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.0.id())
            .field("readonly", &self.0.is_readonly())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

struct CellSlots {
    raw: Value,
    view: Value,
}

/// The standard single-value cell.
struct PlainCell {
    id: u64,
    shallow: bool,
    dep: LazyDep,
    slots: RwLock<CellSlots>,
}

impl SignalLike for PlainCell {
    fn get(&self) -> Value {
        let id = self.id;
        self.dep
            .track(None, &|effect| DebugEvent::new(effect, id, OpKind::Get));
        self.slots.read().expect("cell slots lock poisoned").view.clone()
    }

    fn set(&self, value: Value) {
        let use_direct = self.shallow || is_shallow(&value) || is_readonly(&value);
        let next_raw = if use_direct {
            value.clone()
        } else {
            to_raw(&value)
        };
        let changed = {
            let mut slots = self.slots.write().expect("cell slots lock poisoned");
            if next_raw.same(&slots.raw) {
                false
            } else {
                slots.view = if use_direct {
                    value
                } else {
                    to_reactive(&next_raw)
                };
                slots.raw = next_raw.clone();
                true
            }
        };
        if changed {
            let id = self.id;
            self.dep.trigger(DirtyLevel::Dirty, &|effect| {
                let mut event = DebugEvent::new(effect, id, OpKind::Set);
                event.new_value = Some(next_raw.clone());
                event
            });
        }
    }

    fn get_untracked(&self) -> Value {
        self.slots.read().expect("cell slots lock poisoned").view.clone()
    }

    fn dep_handle(&self) -> Option<Arc<Dep>> {
        self.dep.current()
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn is_shallow(&self) -> bool {
        self.shallow
    }

    fn force_trigger(&self) {
        let id = self.id;
        self.dep.trigger(DirtyLevel::Dirty, &|effect| {
            DebugEvent::new(effect, id, OpKind::Set)
        });
    }
}

/// Create a deep signal cell. An aggregate initial value is stored raw and
/// served through a reactive wrapper.
pub fn signal(value: impl Into<Value>) -> Signal {
    let value = value.into();
    let raw = to_raw(&value);
    let view = to_reactive(&raw);
    Signal(Arc::new(PlainCell {
        id: next_cell_id(),
        shallow: false,
        dep: LazyDep::new(),
        slots: RwLock::new(CellSlots { raw, view }),
    }))
}

/// Create a shallow signal cell: the value is stored and served as given,
/// with no wrapping and no unwrapping.
pub fn shallow_signal(value: impl Into<Value>) -> Signal {
    let value = value.into();
    Signal(Arc::new(PlainCell {
        id: next_cell_id(),
        shallow: true,
        dep: LazyDep::new(),
        slots: RwLock::new(CellSlots {
            raw: value.clone(),
            view: value,
        }),
    }))
}

/// Hook handed to a [`custom_signal`] factory: records the running effect
/// against the cell's dep.
pub type TrackHook = Arc<dyn Fn() + Send + Sync>;
/// Hook handed to a [`custom_signal`] factory: triggers the cell's
/// subscribers at full strength.
pub type TriggerHook = Arc<dyn Fn() + Send + Sync>;

/// Getter returned by a [`custom_signal`] factory.
pub type GetterFn = Box<dyn Fn() -> Value + Send + Sync>;
/// Setter returned by a [`custom_signal`] factory.
pub type SetterFn = Box<dyn Fn(Value) + Send + Sync>;

struct CustomCell {
    id: u64,
    dep: LazyDep,
    getter: GetterFn,
    setter: SetterFn,
}

impl SignalLike for CustomCell {
    fn get(&self) -> Value {
        (self.getter)()
    }

    fn set(&self, value: Value) {
        (self.setter)(value);
    }

    fn get_untracked(&self) -> Value {
        let _pause = context::PauseTracking::new();
        (self.getter)()
    }

    fn dep_handle(&self) -> Option<Arc<Dep>> {
        self.dep.current()
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn force_trigger(&self) {
        let id = self.id;
        self.dep.trigger(DirtyLevel::Dirty, &|effect| {
            DebugEvent::new(effect, id, OpKind::Set)
        });
    }
}

/// Create a cell whose read/write behavior is supplied by `factory`. The
/// factory receives `(track, trigger)` hooks bound to the cell's dep and
/// returns the getter/setter pair.
pub fn custom_signal<F>(factory: F) -> Signal
where
    F: FnOnce(TrackHook, TriggerHook) -> (GetterFn, SetterFn),
{
    let id = next_cell_id();
    let dep = LazyDep::new();

    let track: TrackHook = {
        let dep = dep.clone();
        Arc::new(move || {
            dep.track(None, &|effect| DebugEvent::new(effect, id, OpKind::Get));
        })
    };
    let trigger: TriggerHook = {
        let dep = dep.clone();
        Arc::new(move || {
            dep.trigger(DirtyLevel::Dirty, &|effect| {
                DebugEvent::new(effect, id, OpKind::Set)
            });
        })
    };

    let (getter, setter) = factory(track, trigger);
    Signal(Arc::new(CustomCell {
        id,
        dep,
        getter,
        setter,
    }))
}

/// Two-way projection of one key of a reactive target.
struct PropertyCell {
    id: u64,
    source: Value,
    key: Key,
    default: Option<Value>,
}

impl SignalLike for PropertyCell {
    fn get(&self) -> Value {
        let current = match &self.source {
            Value::Reactive(handle) => handle.get_wrapped_opt(&self.key),
            other => {
                let value = other.get_key(self.key.clone());
                if value.same(&Value::Null) {
                    None
                } else {
                    Some(value)
                }
            }
        };
        current
            .or_else(|| self.default.clone())
            .unwrap_or(Value::Null)
    }

    fn set(&self, value: Value) {
        match &self.source {
            Value::Reactive(handle) => {
                if handle.is_readonly() {
                    dev_warn!(
                        "projection write on key `{}` failed: source is readonly",
                        self.key
                    );
                } else {
                    let _ = handle.set(self.key.clone(), value);
                }
            }
            other => {
                let _ = other.set_key(self.key.clone(), value);
            }
        }
    }

    fn get_untracked(&self) -> Value {
        let _pause = context::PauseTracking::new();
        self.get()
    }

    fn dep_handle(&self) -> Option<Arc<Dep>> {
        match &self.source {
            Value::Reactive(handle) => handle
                .inner
                .target
                .deps()
                .get(&crate::proxy::target::DepKey::Entry(self.key.clone())),
            _ => None,
        }
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn is_readonly(&self) -> bool {
        match &self.source {
            Value::Reactive(handle) => handle.is_readonly(),
            _ => false,
        }
    }

    fn force_trigger(&self) {
        if let Value::Reactive(handle) = &self.source {
            trigger_target(
                &handle.inner.target,
                OpKind::Set,
                Some(self.key.clone()),
                None,
                None,
                None,
            );
        }
    }
}

/// Project `key` of a reactive target as a two-way bound cell.
pub fn project(target: &Value, key: impl Into<Key>) -> Signal {
    Signal(Arc::new(PropertyCell {
        id: next_cell_id(),
        source: target.clone(),
        key: key.into(),
        default: None,
    }))
}

/// [`project`] with a fallback for a missing entry.
pub fn project_with_default(
    target: &Value,
    key: impl Into<Key>,
    default: impl Into<Value>,
) -> Signal {
    Signal(Arc::new(PropertyCell {
        id: next_cell_id(),
        source: target.clone(),
        key: key.into(),
        default: Some(default.into()),
    }))
}

/// Fan a reactive container out into one projection per key.
///
/// Warns on a non-reactive target but still produces a snapshot-style
/// collection of cells.
pub fn project_all(target: &Value) -> Vec<(Key, Signal)> {
    if !is_proxy(target) {
        dev_warn!("project_all() expects a reactive target");
    }
    let raw = to_raw(target);
    let keys: Vec<Key> = match &raw {
        Value::Obj(t) => t.field_names().into_iter().map(Key::Str).collect(),
        Value::List(t) => (0..t.len()).map(Key::from).collect(),
        Value::Map(t) => t.keys_snapshot(),
        _ => Vec::new(),
    };
    keys.into_iter()
        .map(|key| (key.clone(), project(target, key)))
        .collect()
}

/// Read-only cell over a zero-argument closure.
struct GetterCell {
    id: u64,
    getter: GetterFn,
}

impl SignalLike for GetterCell {
    fn get(&self) -> Value {
        (self.getter)()
    }

    fn set(&self, _value: Value) {
        dev_warn!("write operation failed: getter cell is readonly");
    }

    fn get_untracked(&self) -> Value {
        let _pause = context::PauseTracking::new();
        (self.getter)()
    }

    fn dep_handle(&self) -> Option<Arc<Dep>> {
        None
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn is_readonly(&self) -> bool {
        true
    }

    fn force_trigger(&self) {
        dev_warn!("trigger_signal() has no effect on a getter cell");
    }
}

/// Wrap a zero-arg closure as a read-only cell.
pub fn from_getter<F>(getter: F) -> Signal
where
    F: Fn() -> Value + Send + Sync + 'static,
{
    Signal(Arc::new(GetterCell {
        id: next_cell_id(),
        getter: Box::new(getter),
    }))
}

/// Whether a value is a signal cell.
pub fn is_signal(value: &Value) -> bool {
    matches!(value, Value::Cell(_))
}

/// Return the cell's current value, or the value itself when it is not a
/// cell. The cell read is tracked.
pub fn unwrap(value: &Value) -> Value {
    match value {
        Value::Cell(cell) => cell.get(),
        other => other.clone(),
    }
}

/// Normalize a possibly-cell value to a plain value. Getter cells are
/// invoked; everything else behaves like [`unwrap`].
pub fn to_value(value: &Value) -> Value {
    unwrap(value)
}

/// Force a full-strength trigger on a cell without changing its value.
/// Used to refresh subscribers of a shallow cell after deep mutation.
pub fn trigger_signal(cell: &Signal) {
    cell.0.force_trigger();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::handle::{is_reactive, reactive, readonly};
    use crate::reactive::effect::effect;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn signal_get_and_set() {
        let cell = signal(0);
        assert_eq!(cell.get().as_int(), Some(0));

        cell.set(42);
        assert_eq!(cell.get().as_int(), Some(42));
    }

    #[test]
    fn signal_update() {
        let cell = signal(10);
        cell.update(|v| Value::Int(v.as_int().unwrap() + 5));
        assert_eq!(cell.get().as_int(), Some(15));
    }

    #[test]
    fn signal_ids_are_unique() {
        let a = signal(0);
        let b = signal(0);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn unchanged_write_does_not_trigger() {
        let cell = signal(1);
        let runs = Arc::new(AtomicI32::new(0));

        let cell_clone = cell.clone();
        let runs_clone = runs.clone();
        effect(move || {
            let _ = cell_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        cell.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        cell.set(Value::Float(f64::NAN));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        cell.set(Value::Float(f64::NAN));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn deep_signal_wraps_aggregate_values() {
        let cell = signal(Value::new_obj());
        assert!(is_reactive(&cell.get()));

        let shallow = shallow_signal(Value::new_obj());
        assert!(!is_reactive(&shallow.get()));
        assert!(shallow.is_shallow());
    }

    #[test]
    fn deep_mutation_through_the_view_is_tracked() {
        let cell = signal(Value::new_obj());
        let runs = Arc::new(AtomicI32::new(0));

        let cell_clone = cell.clone();
        let runs_clone = runs.clone();
        effect(move || {
            let _ = cell_clone.get().get_key("name");
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        cell.get_untracked().set_key("name", "weft").unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn subscriber_count_follows_effect_lifecycle() {
        let cell = signal(0);
        assert_eq!(cell.subscriber_count(), 0);

        let cell_clone = cell.clone();
        let runner = effect(move || {
            let _ = cell_clone.get();
        });
        assert_eq!(cell.subscriber_count(), 1);

        runner.stop();
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn trigger_signal_forces_subscribers() {
        let cell = shallow_signal(Value::new_obj());
        let runs = Arc::new(AtomicI32::new(0));

        let cell_clone = cell.clone();
        let runs_clone = runs.clone();
        effect(move || {
            let _ = cell_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        // Deep mutation of a shallow cell's value is invisible...
        cell.get_untracked().set_key("k", 1).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // ...until the cell is force-triggered.
        trigger_signal(&cell);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn custom_signal_controls_its_own_tracking() {
        let stored = Arc::new(RwLock::new(Value::Int(0)));
        let stored_cell = stored.clone();
        let cell = custom_signal(move |track, trigger| {
            let stored_get = stored_cell.clone();
            let stored_set = stored_cell.clone();
            (
                Box::new(move || {
                    track();
                    stored_get.read().unwrap().clone()
                }),
                Box::new(move |value| {
                    *stored_set.write().unwrap() = value;
                    trigger();
                }),
            )
        });

        let runs = Arc::new(AtomicI32::new(0));
        let cell_clone = cell.clone();
        let runs_clone = runs.clone();
        effect(move || {
            let _ = cell_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        cell.set(5);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(cell.get().as_int(), Some(5));
    }

    #[test]
    fn projection_is_two_way() {
        let obj = reactive(Value::obj_from([("count", Value::Int(1))]));
        let cell = project(&obj, "count");

        assert_eq!(cell.get().as_int(), Some(1));

        cell.set(2);
        assert_eq!(obj.get_key("count").as_int(), Some(2));

        obj.set_key("count", 3).unwrap();
        assert_eq!(cell.get().as_int(), Some(3));
    }

    #[test]
    fn projection_tracks_through_the_source() {
        let obj = reactive(Value::obj_from([("count", Value::Int(1))]));
        let cell = project(&obj, "count");
        let runs = Arc::new(AtomicI32::new(0));

        let cell_clone = cell.clone();
        let runs_clone = runs.clone();
        effect(move || {
            let _ = cell_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        obj.set_key("count", 2).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn projection_default_covers_missing_entries() {
        let obj = reactive(Value::new_obj());
        let cell = project_with_default(&obj, "missing", 7);
        assert_eq!(cell.get().as_int(), Some(7));

        obj.set_key("missing", 1).unwrap();
        assert_eq!(cell.get().as_int(), Some(1));
    }

    #[test]
    fn readonly_projection_warns_and_ignores() {
        let ro = readonly(Value::obj_from([("a", Value::Int(1))]));
        let cell = project(&ro, "a");
        assert!(cell.is_readonly());

        cell.set(9);
        assert_eq!(cell.get().as_int(), Some(1));
    }

    #[test]
    fn project_all_covers_every_key() {
        let obj = reactive(Value::obj_from([
            ("a", Value::Int(1)),
            ("b", Value::Int(2)),
        ]));
        let cells = project_all(&obj);
        assert_eq!(cells.len(), 2);

        let (key, cell) = &cells[0];
        assert_eq!(key.as_str(), Some("a"));
        cell.set(10);
        assert_eq!(obj.get_key("a").as_int(), Some(10));
    }

    #[test]
    fn getter_cell_is_readonly() {
        let cell = from_getter(|| Value::Int(3));
        assert!(cell.is_readonly());
        assert_eq!(cell.get().as_int(), Some(3));
        cell.set(9);
        assert_eq!(cell.get().as_int(), Some(3));
    }

    #[test]
    fn unwrap_and_is_signal() {
        let cell = signal(5);
        let as_value = Value::Cell(cell.clone());
        assert!(is_signal(&as_value));
        assert!(!is_signal(&Value::Int(5)));
        assert_eq!(unwrap(&as_value).as_int(), Some(5));
        assert_eq!(to_value(&Value::Int(9)).as_int(), Some(9));
    }
}
