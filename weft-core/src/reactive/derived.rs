//! Derivations
//!
//! A derivation is a lazy, memoized reader: a cell whose value is computed
//! from other cells by a getter. Nothing runs at construction; the first
//! read runs the getter, caches its value, and records the read sites.
//! When an upstream value changes, the derivation is only *marked*
//! (`Dirty` from a direct write, `MaybeDirty` through another derivation);
//! the next read decides whether a recompute is actually needed.
//!
//! Downstream propagation is value-change-gated: only when a recompute
//! yields a different value (NaN-aware) does the derivation re-trigger its
//! own subscribers at full strength. This is what keeps long derivation
//! chains from re-running on writes that do not change intermediate
//! results.

use std::sync::{Arc, RwLock, Weak};

use crate::dev_warn;
use crate::value::Value;

use super::context;
use super::debug::{DebugEvent, DebugHook, OpKind};
use super::dep::{Dep, DepOwner, LazyDep};
use super::effect::{DirtyLevel, ReactiveEffect};
use super::signal::{Signal, SignalLike};

use std::sync::atomic::{AtomicU64, Ordering};

/// Derivation ids live in a range disjoint from cell ids, so debug events
/// can address both uniformly.
static DERIVED_ID_COUNTER: AtomicU64 = AtomicU64::new(1 << 32);

fn next_derived_id() -> u64 {
    DERIVED_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Debug hooks accepted by [`derived_with_debug`].
#[derive(Default)]
pub struct DebugOptions {
    pub on_track: Option<DebugHook>,
    pub on_trigger: Option<DebugHook>,
}

pub(crate) struct DerivedInner {
    id: u64,
    weak_self: Weak<DerivedInner>,
    effect: Arc<ReactiveEffect>,
    dep: LazyDep,
    value: RwLock<Option<Value>>,
    setter: Option<Box<dyn Fn(Value) + Send + Sync>>,
    readonly: bool,
    /// False under snapshot mode: every read recomputes.
    cacheable: bool,
}

impl DerivedInner {
    fn read(&self) -> Value {
        let must_run = !self.cacheable || self.effect.dirty();
        if must_run {
            let new_value = self.effect.run();
            let changed = {
                let mut slot = self.value.write().expect("derived value lock poisoned");
                let changed = match slot.as_ref() {
                    Some(old) => !old.same(&new_value),
                    None => true,
                };
                *slot = Some(new_value);
                changed
            };
            if changed {
                let id = self.id;
                self.dep.trigger(DirtyLevel::Dirty, &|effect| {
                    DebugEvent::new(effect, id, OpKind::Set)
                });
            }
        }

        let id = self.id;
        let owner: Weak<dyn DepOwner> = self.weak_self.clone();
        self.dep.track(Some(owner), &|effect| {
            DebugEvent::new(effect, id, OpKind::Get)
        });

        // A two-step chain can leave this derivation marked maybe-dirty
        // even when its own value did not change; subscribers registered
        // above must observe that level.
        if self.effect.dirty_level() >= DirtyLevel::MaybeDirty {
            self.dep.trigger(DirtyLevel::MaybeDirty, &|effect| {
                DebugEvent::new(effect, id, OpKind::Set)
            });
        }

        self.value
            .read()
            .expect("derived value lock poisoned")
            .clone()
            .unwrap_or(Value::Null)
    }
}

impl DepOwner for DerivedInner {
    fn refresh(&self) {
        let _ = self.read();
    }
}

impl SignalLike for DerivedInner {
    fn get(&self) -> Value {
        self.read()
    }

    fn set(&self, value: Value) {
        match &self.setter {
            Some(setter) if !self.readonly => setter(value),
            _ => dev_warn!("write operation failed: derived value is readonly"),
        }
    }

    fn get_untracked(&self) -> Value {
        let _pause = context::PauseTracking::new();
        self.read()
    }

    fn dep_handle(&self) -> Option<Arc<Dep>> {
        self.dep.current()
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn is_readonly(&self) -> bool {
        self.readonly
    }

    fn force_trigger(&self) {
        let id = self.id;
        self.dep.trigger(DirtyLevel::Dirty, &|effect| {
            DebugEvent::new(effect, id, OpKind::Set)
        });
    }
}

/// A lazy, memoized derivation handle. Cloning shares the derivation.
#[derive(Clone)]
pub struct Derived {
    inner: Arc<DerivedInner>,
}

impl Derived {
    /// Read the (possibly recomputed) value, registering the running
    /// effect as a subscriber.
    pub fn get(&self) -> Value {
        self.inner.read()
    }

    /// Write through the setter; warns when the derivation is read-only.
    pub fn set(&self, value: impl Into<Value>) {
        SignalLike::set(&*self.inner, value.into());
    }

    pub fn get_untracked(&self) -> Value {
        self.inner.get_untracked()
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.readonly
    }

    /// The derivation's own dep, if any reader has materialized it.
    /// Diagnostic; the dep-order tests compare these by identity.
    pub fn dep_handle(&self) -> Option<Arc<Dep>> {
        self.inner.dep.current()
    }

    /// The wrapped effect. Diagnostic.
    pub fn effect(&self) -> &Arc<ReactiveEffect> {
        &self.inner.effect
    }

    /// View this derivation as a signal cell (for embedding in data).
    pub fn as_signal(&self) -> Signal {
        Signal(self.inner.clone())
    }
}

impl std::fmt::Debug for Derived {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Derived")
            .field("id", &self.inner.id)
            .field("readonly", &self.inner.readonly)
            .field("dirty_level", &self.inner.effect.dirty_level())
            .finish()
    }
}

fn build<F>(
    getter: F,
    setter: Option<Box<dyn Fn(Value) + Send + Sync>>,
    readonly: bool,
    cacheable: bool,
    debug: DebugOptions,
) -> Derived
where
    F: Fn() -> Value + Send + Sync + 'static,
{
    let inner = Arc::new_cyclic(|weak: &Weak<DerivedInner>| {
        let announce = {
            let weak = weak.clone();
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let id = inner.id;
                    inner.dep.trigger(DirtyLevel::MaybeDirty, &|effect| {
                        DebugEvent::new(effect, id, OpKind::Set)
                    });
                }
            })
        };
        let effect = ReactiveEffect::new(Box::new(getter), announce);
        if !cacheable {
            effect.deactivate();
        }
        if let Some(hook) = debug.on_track {
            effect.set_on_track(hook);
        }
        if let Some(hook) = debug.on_trigger {
            effect.set_on_trigger(hook);
        }
        DerivedInner {
            id: next_derived_id(),
            weak_self: weak.clone(),
            effect,
            dep: LazyDep::new(),
            value: RwLock::new(None),
            setter,
            readonly,
            cacheable,
        }
    });
    Derived { inner }
}

/// Create a read-only derivation over `getter`.
pub fn derived<F>(getter: F) -> Derived
where
    F: Fn() -> Value + Send + Sync + 'static,
{
    build(getter, None, true, true, DebugOptions::default())
}

/// Create a writable derivation from a getter/setter pair.
pub fn derived_writable<F, S>(getter: F, setter: S) -> Derived
where
    F: Fn() -> Value + Send + Sync + 'static,
    S: Fn(Value) + Send + Sync + 'static,
{
    build(
        getter,
        Some(Box::new(setter)),
        false,
        true,
        DebugOptions::default(),
    )
}

/// Create a derivation that never caches (snapshot mode): every read runs
/// the getter, with no dependency bookkeeping retained.
pub fn derived_uncached<F>(getter: F) -> Derived
where
    F: Fn() -> Value + Send + Sync + 'static,
{
    build(getter, None, true, false, DebugOptions::default())
}

/// [`derived`] with `on_track`/`on_trigger` debug hooks on its effect.
pub fn derived_with_debug<F>(getter: F, debug: DebugOptions) -> Derived
where
    F: Fn() -> Value + Send + Sync + 'static,
{
    build(getter, None, true, true, debug)
}
