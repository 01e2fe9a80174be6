//! Reactive Primitives
//!
//! This module implements the core reactive graph: signal cells,
//! derivations, and effects, together with the dependency-tracking
//! protocol that connects them.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A [`Signal`] is a one-slot container for observable state. Reading it
//! inside a running effect records a dependency; writing it triggers the
//! recorded subscribers, but only when the value actually changed.
//!
//! ## Derivations
//!
//! A [`Derived`] is a lazy, memoized reader over other cells. It
//! recomputes at most once per upstream change, and only re-triggers its
//! own subscribers when the recomputed value differs from the cache.
//!
//! ## Effects
//!
//! An effect re-runs a closure whenever its observed cells change. Effects
//! synchronize reactive state with the outside world; a renderer is one
//! big effect.
//!
//! # Implementation Notes
//!
//! Dependency detection is automatic: a thread-local tracking context
//! records which effect is running, and every tracked read registers that
//! effect as a subscriber. Staleness propagates at three levels
//! ([`DirtyLevel`]): direct writes mark subscribers `Dirty`, derivations
//! announce `MaybeDirty`, and the sequential dirty query resolves the
//! difference at read time.

pub(crate) mod context;
pub(crate) mod debug;
pub(crate) mod dep;
pub(crate) mod derived;
pub(crate) mod effect;
pub(crate) mod scheduler;
pub(crate) mod scope;
pub(crate) mod signal;

pub use context::{enable_tracking, pause_tracking, reset_tracking};
pub use debug::{DebugEvent, DebugHook, OpKind};
pub use dep::Dep;
pub use derived::{
    derived, derived_uncached, derived_with_debug, derived_writable, DebugOptions, Derived,
};
pub use effect::{
    effect, effect_with_options, stop, DirtyLevel, EffectId, EffectOptions, EffectRunner,
    ReactiveEffect, SchedulerFn,
};
pub use scheduler::{pause_scheduling, reset_scheduling};
pub use scope::{get_current_scope, on_scope_dispose, EffectScope};
pub use signal::{
    custom_signal, from_getter, is_signal, project, project_all, project_with_default,
    shallow_signal, signal, to_value, trigger_signal, unwrap, GetterFn, SetterFn, Signal,
    SignalLike, TrackHook, TriggerHook,
};
