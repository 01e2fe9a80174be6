//! Reactive wrappers over aggregate targets.
//!
//! Instead of intercepting property access on arbitrary objects, the
//! engine uses a closed set of statically-typed wrapper variants over the
//! four target kinds: `{mutable, readonly} x {deep, shallow}`. A wrapper
//! is a [`ReactiveHandle`]; every operation on it runs the same
//! track/trigger discipline the dynamic-language original implements with
//! proxy traps.
//!
//! Layering `readonly` over an already-reactive value does not build a
//! second proxy level. The handle instead records `inner_reactive`, which
//! preserves the two observable consequences of layering: such a wrapper
//! still tracks reads, and `is_reactive` still answers true for it.
//!
//! Wrappers are cached per target and variant, so wrapping the same
//! target twice yields the identical handle.

use std::sync::Arc;

use crate::dev_warn;
use crate::value::Value;

use super::target::{is_skipped, mark_skip, Target};

pub(crate) struct HandleInner {
    pub(crate) target: Target,
    pub(crate) readonly: bool,
    pub(crate) shallow: bool,
    /// True when this readonly wrapper was layered over a reactive one.
    pub(crate) inner_reactive: bool,
}

/// A reactive view over an aggregate target.
#[derive(Clone)]
pub struct ReactiveHandle {
    pub(crate) inner: Arc<HandleInner>,
}

impl ReactiveHandle {
    pub fn ptr_eq(&self, other: &ReactiveHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.readonly
    }

    pub fn is_shallow(&self) -> bool {
        self.inner.shallow
    }

    pub fn target_id(&self) -> u64 {
        self.inner.target.id()
    }

    /// The raw aggregate behind this view.
    pub fn raw(&self) -> Value {
        self.inner.target.to_value()
    }

    /// Whether reads through this wrapper record dependencies.
    pub(crate) fn tracks_reads(&self) -> bool {
        !self.inner.readonly || self.inner.inner_reactive
    }
}

impl std::fmt::Debug for ReactiveHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveHandle")
            .field("target", &self.inner.target.id())
            .field("readonly", &self.inner.readonly)
            .field("shallow", &self.inner.shallow)
            .finish()
    }
}

fn variant_code(readonly: bool, shallow: bool, inner_reactive: bool) -> u8 {
    (readonly as u8) | (shallow as u8) << 1 | (inner_reactive as u8) << 2
}

pub(crate) fn wrap_target(
    target: Target,
    readonly: bool,
    shallow: bool,
    inner_reactive: bool,
) -> ReactiveHandle {
    let code = variant_code(readonly, shallow, inner_reactive);
    if let Some(inner) = target.cache().get(code) {
        return ReactiveHandle { inner };
    }
    let inner = Arc::new(HandleInner {
        target: target.clone(),
        readonly,
        shallow,
        inner_reactive,
    });
    target.cache().insert(code, &inner);
    ReactiveHandle { inner }
}

fn create_wrapper(value: Value, readonly: bool, shallow: bool) -> Value {
    match &value {
        Value::Reactive(handle) => {
            if readonly && !handle.inner.readonly {
                let target = handle.inner.target.clone();
                Value::Reactive(wrap_target(target, true, shallow, true))
            } else {
                // Wrapping an existing wrapper of the same polarity (or a
                // readonly one with `reactive`) answers the wrapper itself.
                value
            }
        }
        Value::Cell(_) => value,
        _ => match Target::from_value(&value) {
            Some(target) => {
                if is_skipped(&value) {
                    return value;
                }
                Value::Reactive(wrap_target(target, readonly, shallow, false))
            }
            None => {
                dev_warn!("value cannot be made reactive: {}", value.type_name());
                value
            }
        },
    }
}

/// Deep mutable reactive view.
pub fn reactive(value: Value) -> Value {
    create_wrapper(value, false, false)
}

/// Mutable view that does not wrap nested aggregates or unwrap cells.
pub fn shallow_reactive(value: Value) -> Value {
    create_wrapper(value, false, true)
}

/// Deep readonly view: writes warn and are rejected.
pub fn readonly(value: Value) -> Value {
    create_wrapper(value, true, false)
}

/// Readonly view without deep wrapping.
pub fn shallow_readonly(value: Value) -> Value {
    create_wrapper(value, true, true)
}

/// Recover the raw aggregate behind a reactive view. Other values pass
/// through unchanged (cells included).
pub fn to_raw(value: &Value) -> Value {
    match value {
        Value::Reactive(handle) => handle.raw(),
        other => other.clone(),
    }
}

/// Flag an aggregate so `reactive`/`readonly` leave it unwrapped.
pub fn mark_raw(value: Value) -> Value {
    mark_skip(&value);
    value
}

/// Wrap `value` reactively if it is an aggregate; scalars pass through.
pub(crate) fn to_reactive(value: &Value) -> Value {
    if value.is_aggregate() {
        reactive(value.clone())
    } else {
        value.clone()
    }
}

pub fn is_reactive(value: &Value) -> bool {
    match value {
        Value::Reactive(handle) => !handle.inner.readonly || handle.inner.inner_reactive,
        _ => false,
    }
}

pub fn is_readonly(value: &Value) -> bool {
    match value {
        Value::Reactive(handle) => handle.inner.readonly,
        Value::Cell(cell) => cell.is_readonly(),
        _ => false,
    }
}

pub fn is_shallow(value: &Value) -> bool {
    match value {
        Value::Reactive(handle) => handle.inner.shallow,
        Value::Cell(cell) => cell.is_shallow(),
        _ => false,
    }
}

pub fn is_proxy(value: &Value) -> bool {
    matches!(value, Value::Reactive(_))
}
