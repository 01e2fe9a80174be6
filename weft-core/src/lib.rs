//! Weft Core
//!
//! This crate is the reactivity engine at the heart of the Weft UI
//! runtime: it turns mutable data into observable *signals*, lets user
//! code declare *derivations* (memoized readers) and *effects*
//! (side-effectful subscribers), and re-executes effects when, and only
//! when, observed data has actually changed.
//!
//! # Architecture
//!
//! The crate is organized into three modules:
//!
//! - [`reactive`]: the signal/derivation/effect graph, its dependency
//!   tracking protocol, dirty-level propagation, effect scopes, and the
//!   scheduler FIFO
//! - [`proxy`]: reactive wrappers over aggregate values (mappings,
//!   sequences, sets) with per-key dependency tables
//! - [`value`]: the dynamic [`Value`] model shared by both
//!
//! # Example
//!
//! ```rust,ignore
//! use weft_core::{derived, effect, signal, Value};
//!
//! let count = signal(0);
//!
//! let count_for_doubled = count.clone();
//! let doubled = derived(move || {
//!     Value::Int(count_for_doubled.get().as_int().unwrap() * 2)
//! });
//!
//! let doubled_for_effect = doubled.clone();
//! effect(move || {
//!     println!("doubled = {:?}", doubled_for_effect.get());
//! });
//!
//! count.set(5); // prints: doubled = Int(10)
//! ```

/// Development-mode warning. Compiled out of release builds; routed
/// through the `log` facade otherwise.
macro_rules! dev_warn {
    ($($arg:tt)*) => {
        if cfg!(debug_assertions) {
            log::warn!($($arg)*);
        }
    };
}
pub(crate) use dev_warn;

pub mod error;
pub mod proxy;
pub mod reactive;
pub mod value;

pub use error::ReactiveError;
// The `reactive` function and the `reactive` module live in different
// namespaces; both are importable from the crate root.
pub use proxy::{
    is_proxy, is_reactive, is_readonly, is_shallow, mark_raw, reactive, readonly,
    shallow_reactive, shallow_readonly, to_raw, ReactiveHandle,
};
pub use reactive::{
    custom_signal, derived, derived_uncached, derived_with_debug, derived_writable, effect,
    effect_with_options, enable_tracking, from_getter, get_current_scope, is_signal,
    on_scope_dispose, pause_scheduling, pause_tracking, project, project_all,
    project_with_default, reset_scheduling, reset_tracking, shallow_signal, signal, stop,
    to_value, trigger_signal, unwrap, DebugEvent, DebugHook, DebugOptions, Derived, DirtyLevel,
    EffectId, EffectOptions, EffectRunner, EffectScope, OpKind, ReactiveEffect, SchedulerFn,
    Signal, SignalLike,
};
pub use value::{Key, Value};
