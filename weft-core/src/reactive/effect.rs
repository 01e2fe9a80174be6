//! Effect Implementation
//!
//! A `ReactiveEffect` is the unit of re-execution: it owns a closure, the
//! ordered list of deps that closure read on its latest run, and a
//! three-level dirty marker. Everything else in the engine is built out of
//! effects: `effect()` wraps one with a scheduler that re-runs it, and a
//! derivation wraps one whose closure recomputes the cached value.
//!
//! # Dirty levels
//!
//! - `Clean`: the last run is still valid.
//! - `MaybeDirty`: some transitive dependency changed, but only through a
//!   derivation whose output may not actually differ. Resolved lazily by
//!   the sequential dirty query in [`ReactiveEffect::dirty`].
//! - `Dirty`: a dependency definitely changed; the next run is required.
//!
//! Levels only rise between runs; `run` resets to `Clean` on entry.
//!
//! # Re-entrancy
//!
//! `runnings` counts nested invocations. While an effect is running, its
//! own scheduler is not enqueued unless `allow_recurse` is set, so a
//! closure that invalidates its own dependencies does not storm.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use crate::value::Value;

use super::context;
use super::debug::{DebugEvent, DebugHook};
use super::dep::{cleanup_dep_effect, Dep};
use super::scope::{self, EffectScope};

/// Counter for generating unique effect IDs.
static EFFECT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId(u64);

impl EffectId {
    pub fn new() -> Self {
        Self(EFFECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

/// Staleness marker for an effect or derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DirtyLevel {
    /// The latest run is still valid.
    Clean = 0,
    /// An upstream derivation changed; the output may or may not differ.
    MaybeDirty = 1,
    /// A dependency definitely changed.
    Dirty = 2,
}

/// A scheduler callback: decides when (and whether) a dirty effect re-runs.
pub type SchedulerFn = Arc<dyn Fn() + Send + Sync>;

pub(crate) type EffectFn = Box<dyn Fn() -> Value + Send + Sync>;
type HookFn = Box<dyn Fn() + Send + Sync>;
type OnStopFn = Box<dyn FnOnce() + Send + Sync>;

pub(crate) struct EffectState {
    pub(crate) active: bool,
    pub(crate) allow_recurse: bool,
    pub(crate) dirty_level: DirtyLevel,
    pub(crate) should_schedule: bool,
    pub(crate) track_id: u64,
    pub(crate) runnings: u32,
    pub(crate) deps: Vec<Arc<Dep>>,
    pub(crate) deps_len: usize,
}

/// The unit of re-execution.
pub struct ReactiveEffect {
    id: EffectId,
    weak_self: Weak<ReactiveEffect>,
    func: EffectFn,
    /// Announce hook: called on the `Clean -> dirty` transition, before any
    /// scheduler drains. Derivations use it to propagate `MaybeDirty`.
    trigger_hook: HookFn,
    scheduler: RwLock<Option<SchedulerFn>>,
    on_stop: RwLock<Option<OnStopFn>>,
    on_track: RwLock<Option<DebugHook>>,
    on_trigger: RwLock<Option<DebugHook>>,
    state: RwLock<EffectState>,
}

impl ReactiveEffect {
    pub(crate) fn new(func: EffectFn, trigger_hook: HookFn) -> Arc<ReactiveEffect> {
        Self::new_in(func, trigger_hook, None)
    }

    /// Create an effect and record it into `scope` (or the currently
    /// active scope when `scope` is `None`).
    pub(crate) fn new_in(
        func: EffectFn,
        trigger_hook: HookFn,
        scope: Option<&EffectScope>,
    ) -> Arc<ReactiveEffect> {
        let effect = Arc::new_cyclic(|weak| ReactiveEffect {
            id: EffectId::new(),
            weak_self: weak.clone(),
            func,
            trigger_hook,
            scheduler: RwLock::new(None),
            on_stop: RwLock::new(None),
            on_track: RwLock::new(None),
            on_trigger: RwLock::new(None),
            state: RwLock::new(EffectState {
                active: true,
                allow_recurse: false,
                dirty_level: DirtyLevel::Dirty,
                should_schedule: false,
                track_id: 0,
                runnings: 0,
                deps: Vec::new(),
                deps_len: 0,
            }),
        });
        scope::record_effect_scope(&effect, scope);
        effect
    }

    pub fn id(&self) -> EffectId {
        self.id
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut EffectState) -> R) -> R {
        let mut state = self.state.write().expect("effect state lock poisoned");
        f(&mut state)
    }

    pub fn is_active(&self) -> bool {
        self.state.read().expect("effect state lock poisoned").active
    }

    pub fn dirty_level(&self) -> DirtyLevel {
        self.state
            .read()
            .expect("effect state lock poisoned")
            .dirty_level
    }

    /// Number of deps recorded by the latest run.
    pub fn dep_count(&self) -> usize {
        self.state
            .read()
            .expect("effect state lock poisoned")
            .deps_len
    }

    /// Snapshot of the deps recorded by the latest run, in first-read
    /// order. Diagnostic; the dep-order tests compare these by identity.
    pub fn deps(&self) -> Vec<Arc<Dep>> {
        self.with_state(|st| st.deps[..st.deps_len].to_vec())
    }

    /// The sequential dirty query.
    ///
    /// `MaybeDirty` is resolved by walking the deps in recorded-read order:
    /// each dep owned by a derivation forces that derivation to refresh,
    /// and the walk stops as soon as this effect has been raised to a real
    /// `Dirty`. If no refresh produced a change, the level falls back to
    /// `Clean`.
    pub fn dirty(&self) -> bool {
        if self.dirty_level() == DirtyLevel::MaybeDirty {
            let _pause = context::PauseTracking::new();
            let deps = self.deps();
            for dep in deps {
                if let Some(owner) = dep.owner() {
                    owner.refresh();
                    if self.dirty_level() >= DirtyLevel::Dirty {
                        break;
                    }
                }
            }
            self.with_state(|st| {
                if st.dirty_level == DirtyLevel::MaybeDirty {
                    st.dirty_level = DirtyLevel::Clean;
                }
            });
        }
        self.dirty_level() >= DirtyLevel::Dirty
    }

    /// Execute the closure with dependency tracking.
    ///
    /// The previous run's deps are rewritten in place: `deps_len` restarts
    /// at zero, reads splice deps back in read order, and the guard's drop
    /// sweeps everything past the final high-water mark. The guard also
    /// restores the ambient context, so a panicking closure leaks no
    /// tracking state.
    pub fn run(&self) -> Value {
        let proceed = self.with_state(|st| {
            st.dirty_level = DirtyLevel::Clean;
            if !st.active {
                return false;
            }
            st.runnings += 1;
            st.track_id = st.track_id.wrapping_add(1);
            st.deps_len = 0;
            true
        });
        if !proceed {
            return (self.func)();
        }
        let this = self
            .weak_self
            .upgrade()
            .expect("effect must be held in an Arc to run");
        let _guard = RunGuard::enter(this);
        (self.func)()
    }

    /// Sever all dep memberships and mark the effect inactive. Idempotent.
    pub fn stop(&self) {
        let id = self.id;
        let deps = self.with_state(|st| {
            if !st.active {
                return None;
            }
            st.active = false;
            st.track_id = st.track_id.wrapping_add(1);
            st.deps_len = 0;
            Some(st.deps.drain(..).collect::<Vec<_>>())
        });
        let Some(deps) = deps else {
            return;
        };
        for dep in deps {
            dep.remove(id);
        }
        if let Some(cb) = self
            .on_stop
            .write()
            .expect("effect on_stop lock poisoned")
            .take()
        {
            cb();
        }
    }

    /// Raise the dirty level in response to a trigger whose recorded epoch
    /// is `epoch`. Returns whether the announce hook must fire and the
    /// scheduler job to enqueue, if any.
    pub(crate) fn raise(&self, epoch: u64, level: DirtyLevel) -> (bool, Option<SchedulerFn>) {
        let scheduler = self
            .scheduler
            .read()
            .expect("effect scheduler lock poisoned")
            .clone();
        self.with_state(|st| {
            if epoch != st.track_id {
                return (false, None);
            }
            let mut announce = false;
            if st.dirty_level < level {
                let was_clean = st.dirty_level == DirtyLevel::Clean;
                st.dirty_level = level;
                if was_clean {
                    st.should_schedule = true;
                    announce = true;
                }
            }
            let mut job = None;
            if st.should_schedule && (st.runnings == 0 || st.allow_recurse) {
                if let Some(scheduler) = scheduler {
                    st.should_schedule = false;
                    job = Some(scheduler);
                }
            }
            (announce, job)
        })
    }

    pub(crate) fn announce(&self) {
        (self.trigger_hook)();
    }

    pub(crate) fn set_scheduler(&self, scheduler: SchedulerFn) {
        *self
            .scheduler
            .write()
            .expect("effect scheduler lock poisoned") = Some(scheduler);
    }

    pub(crate) fn set_allow_recurse(&self, allow: bool) {
        self.with_state(|st| st.allow_recurse = allow);
    }

    pub(crate) fn deactivate(&self) {
        self.with_state(|st| st.active = false);
    }

    pub(crate) fn set_on_stop(&self, cb: OnStopFn) {
        *self.on_stop.write().expect("effect on_stop lock poisoned") = Some(cb);
    }

    pub(crate) fn set_on_track(&self, hook: DebugHook) {
        *self
            .on_track
            .write()
            .expect("effect on_track lock poisoned") = Some(hook);
    }

    pub(crate) fn set_on_trigger(&self, hook: DebugHook) {
        *self
            .on_trigger
            .write()
            .expect("effect on_trigger lock poisoned") = Some(hook);
    }

    pub(crate) fn has_on_track(&self) -> bool {
        self.on_track
            .read()
            .expect("effect on_track lock poisoned")
            .is_some()
    }

    pub(crate) fn fire_on_track(&self, event: &DebugEvent) {
        let hook = self
            .on_track
            .read()
            .expect("effect on_track lock poisoned")
            .clone();
        if let Some(hook) = hook {
            hook(event);
        }
    }

    pub(crate) fn has_on_trigger(&self) -> bool {
        self.on_trigger
            .read()
            .expect("effect on_trigger lock poisoned")
            .is_some()
    }

    pub(crate) fn fire_on_trigger(&self, event: &DebugEvent) {
        let hook = self
            .on_trigger
            .read()
            .expect("effect on_trigger lock poisoned")
            .clone();
        if let Some(hook) = hook {
            hook(event);
        }
    }
}

impl std::fmt::Debug for ReactiveEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state.read().expect("effect state lock poisoned");
        f.debug_struct("ReactiveEffect")
            .field("id", &self.id)
            .field("active", &st.active)
            .field("dirty_level", &st.dirty_level)
            .field("dep_count", &st.deps_len)
            .finish()
    }
}

/// Guard installed around one effect run. Restores the ambient context and
/// sweeps stale deps on drop, panics included.
struct RunGuard {
    effect: Arc<ReactiveEffect>,
    prev: Option<(Option<Arc<ReactiveEffect>>, bool)>,
}

impl RunGuard {
    fn enter(effect: Arc<ReactiveEffect>) -> RunGuard {
        let prev = context::replace_active(Some(effect.clone()));
        RunGuard {
            effect,
            prev: Some(prev),
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let id = self.effect.id();
        let (stale, track_id) = self.effect.with_state(|st| {
            let stale: Vec<Arc<Dep>> = st.deps.drain(st.deps_len..).collect();
            st.runnings = st.runnings.saturating_sub(1);
            (stale, st.track_id)
        });
        for dep in stale {
            cleanup_dep_effect(&dep, id, track_id);
        }
        if let Some(prev) = self.prev.take() {
            context::restore_active(prev);
        }
    }
}

/// Options accepted by [`effect_with_options`].
pub struct EffectOptions {
    /// Do not run the effect on creation; the caller invokes the runner.
    pub lazy: bool,
    /// Custom scheduler; defaults to "re-run when dirty".
    pub scheduler: Option<SchedulerFn>,
    /// Record the effect into this scope instead of the active one.
    pub scope: Option<EffectScope>,
    /// Permit self-triggering re-runs.
    pub allow_recurse: bool,
    pub on_stop: Option<Box<dyn FnOnce() + Send + Sync>>,
    pub on_track: Option<DebugHook>,
    pub on_trigger: Option<DebugHook>,
}

impl Default for EffectOptions {
    fn default() -> Self {
        EffectOptions {
            lazy: false,
            scheduler: None,
            scope: None,
            allow_recurse: false,
            on_stop: None,
            on_track: None,
            on_trigger: None,
        }
    }
}

/// Handle returned by [`effect`]: runs the effect on demand and exposes it
/// for [`stop`].
#[derive(Clone)]
pub struct EffectRunner {
    effect: Arc<ReactiveEffect>,
}

impl EffectRunner {
    /// Run the effect now, returning the closure's value.
    pub fn run(&self) -> Value {
        self.effect.run()
    }

    pub fn effect(&self) -> &Arc<ReactiveEffect> {
        &self.effect
    }

    pub fn stop(&self) {
        self.effect.stop();
    }
}

/// Stop a runner's underlying effect. Idempotent.
pub fn stop(runner: &EffectRunner) {
    runner.stop();
}

/// Create an effect that runs `f` now and re-runs it whenever a tracked
/// dependency changes.
pub fn effect<F>(f: F) -> EffectRunner
where
    F: Fn() + Send + Sync + 'static,
{
    effect_with_options(f, EffectOptions::default())
}

/// Create an effect with explicit options.
pub fn effect_with_options<F>(f: F, options: EffectOptions) -> EffectRunner
where
    F: Fn() + Send + Sync + 'static,
{
    let func: EffectFn = Box::new(move || {
        f();
        Value::Null
    });
    let effect = ReactiveEffect::new_in(func, Box::new(|| {}), options.scope.as_ref());
    if options.allow_recurse {
        effect.set_allow_recurse(true);
    }
    if let Some(hook) = options.on_track {
        effect.set_on_track(hook);
    }
    if let Some(hook) = options.on_trigger {
        effect.set_on_trigger(hook);
    }
    if let Some(cb) = options.on_stop {
        effect.set_on_stop(cb);
    }
    let scheduler = options.scheduler.unwrap_or_else(|| {
        let weak = Arc::downgrade(&effect);
        Arc::new(move || {
            if let Some(effect) = weak.upgrade() {
                if effect.dirty() {
                    effect.run();
                }
            }
        })
    });
    effect.set_scheduler(scheduler);
    if !options.lazy {
        effect.run();
    }
    EffectRunner { effect }
}
