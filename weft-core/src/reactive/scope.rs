//! Effect Scopes
//!
//! A scope is a lifetime container: effects, derivations, and user cleanup
//! callbacks created while the scope is active are collected into it, and
//! `stop()` tears all of them down in one call. Scopes nest; stopping a
//! parent stops its children, except children created with `detached`.
//!
//! The active scope is thread-local, installed for the duration of
//! [`EffectScope::run`] by a guard that restores the previous scope on
//! drop.

use std::cell::RefCell;
use std::sync::{Arc, RwLock, Weak};

use crate::dev_warn;

use super::effect::ReactiveEffect;

thread_local! {
    static ACTIVE_SCOPE: RefCell<Option<EffectScope>> = const { RefCell::new(None) };
}

struct ScopeState {
    active: bool,
    effects: Vec<Arc<ReactiveEffect>>,
    cleanups: Vec<Box<dyn FnOnce() + Send + Sync>>,
    scopes: Vec<EffectScope>,
    parent: Weak<ScopeInner>,
    /// Position in the parent's child list, for O(1) self-detach.
    index: usize,
}

struct ScopeInner {
    detached: bool,
    state: RwLock<ScopeState>,
}

/// A hierarchical lifetime container for effects and cleanups.
#[derive(Clone)]
pub struct EffectScope {
    inner: Arc<ScopeInner>,
}

impl EffectScope {
    /// Create a scope. A non-detached scope registers itself as a child of
    /// the currently active scope (if any) and is stopped with it; a
    /// detached scope only remembers its parent for [`EffectScope::off`].
    pub fn new(detached: bool) -> Self {
        let scope = EffectScope {
            inner: Arc::new(ScopeInner {
                detached,
                state: RwLock::new(ScopeState {
                    active: true,
                    effects: Vec::new(),
                    cleanups: Vec::new(),
                    scopes: Vec::new(),
                    parent: Weak::new(),
                    index: 0,
                }),
            }),
        };
        if let Some(parent) = get_current_scope() {
            {
                let mut state = scope.state_mut();
                state.parent = Arc::downgrade(&parent.inner);
            }
            if !detached {
                let mut parent_state = parent.state_mut();
                let index = parent_state.scopes.len();
                parent_state.scopes.push(scope.clone());
                drop(parent_state);
                scope.state_mut().index = index;
            }
        }
        scope
    }

    fn state_mut(&self) -> std::sync::RwLockWriteGuard<'_, ScopeState> {
        self.inner.state.write().expect("scope state lock poisoned")
    }

    pub fn is_active(&self) -> bool {
        self.inner
            .state
            .read()
            .expect("scope state lock poisoned")
            .active
    }

    pub fn ptr_eq(&self, other: &EffectScope) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `f` with this scope active. Returns `None` (with a development
    /// warning) if the scope was already stopped.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if !self.is_active() {
            dev_warn!("cannot run an inactive effect scope");
            return None;
        }
        let _guard = ScopeGuard::enter(self.clone());
        Some(f())
    }

    /// Install this scope as the active one until [`EffectScope::off`].
    /// Host integrations use this around code they cannot wrap in `run`.
    pub fn on(&self) {
        ACTIVE_SCOPE.with(|active| {
            *active.borrow_mut() = Some(self.clone());
        });
    }

    /// Restore the scope's parent as the active scope.
    pub fn off(&self) {
        let parent = self
            .inner
            .state
            .read()
            .expect("scope state lock poisoned")
            .parent
            .upgrade()
            .map(|inner| EffectScope { inner });
        ACTIVE_SCOPE.with(|active| {
            *active.borrow_mut() = parent;
        });
    }

    /// Stop every effect and child scope created inside this scope, run
    /// the dispose callbacks in registration order, and detach from the
    /// parent. Idempotent.
    pub fn stop(&self) {
        self.stop_inner(false);
    }

    fn stop_inner(&self, from_parent: bool) {
        let (effects, cleanups, scopes, parent, index) = {
            let mut state = self.state_mut();
            if !state.active {
                return;
            }
            state.active = false;
            (
                std::mem::take(&mut state.effects),
                std::mem::take(&mut state.cleanups),
                std::mem::take(&mut state.scopes),
                std::mem::replace(&mut state.parent, Weak::new()),
                state.index,
            )
        };

        for effect in effects {
            effect.stop();
        }
        for cleanup in cleanups {
            cleanup();
        }
        for scope in scopes {
            scope.stop_inner(true);
        }

        // Self-detach: swap the parent's last child into our slot and fix
        // its index. Skipped when the parent itself initiated the stop.
        if !self.inner.detached && !from_parent {
            if let Some(parent) = parent.upgrade() {
                let moved = {
                    let mut parent_state =
                        parent.state.write().expect("scope state lock poisoned");
                    match parent_state.scopes.pop() {
                        Some(last) if !Arc::ptr_eq(&last.inner, &self.inner) => {
                            parent_state.scopes[index] = last.clone();
                            Some(last)
                        }
                        _ => None,
                    }
                };
                if let Some(moved) = moved {
                    moved.state_mut().index = index;
                }
            }
        }
    }
}

impl std::fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read().expect("scope state lock poisoned");
        f.debug_struct("EffectScope")
            .field("active", &state.active)
            .field("detached", &self.inner.detached)
            .field("effects", &state.effects.len())
            .field("scopes", &state.scopes.len())
            .finish()
    }
}

/// Guard that installs a scope as active and restores the previous one.
struct ScopeGuard {
    prev: Option<EffectScope>,
}

impl ScopeGuard {
    fn enter(scope: EffectScope) -> ScopeGuard {
        let prev = ACTIVE_SCOPE.with(|active| active.borrow_mut().replace(scope));
        ScopeGuard { prev }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        ACTIVE_SCOPE.with(|active| {
            *active.borrow_mut() = prev;
        });
    }
}

/// The scope currently collecting effects, if any.
pub fn get_current_scope() -> Option<EffectScope> {
    ACTIVE_SCOPE.with(|active| active.borrow().clone())
}

/// Register a callback to run when the active scope stops. Warns (and
/// drops the callback) when no scope is active.
pub fn on_scope_dispose<F>(f: F)
where
    F: FnOnce() + Send + Sync + 'static,
{
    match get_current_scope() {
        Some(scope) => {
            let mut state = scope.state_mut();
            if state.active {
                state.cleanups.push(Box::new(f));
            }
        }
        None => {
            dev_warn!("on_scope_dispose() is called when there is no active effect scope");
        }
    }
}

/// Record an effect into `explicit` or, failing that, the active scope.
pub(crate) fn record_effect_scope(effect: &Arc<ReactiveEffect>, explicit: Option<&EffectScope>) {
    let scope = explicit.cloned().or_else(get_current_scope);
    if let Some(scope) = scope {
        let mut state = scope.state_mut();
        if state.active {
            state.effects.push(effect.clone());
        }
    }
}
