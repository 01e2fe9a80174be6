//! Reactive Aggregates
//!
//! The proxy layer turns plain aggregate data (mappings, sequences, sets)
//! into tracked state. A wrapper built by [`reactive`] (or one of its
//! readonly/shallow variants) intercepts every operation: reads register
//! the running effect against a per-target `key -> Dep` table, writes
//! trigger exactly the deps their fan-out rule names.
//!
//! See [`ReactiveHandle`] and its operations for the wrapper variants,
//! predicates, and interception rules.

pub(crate) mod handle;
pub(crate) mod ops;
pub(crate) mod target;
pub(crate) mod track;

pub use handle::{
    is_proxy, is_reactive, is_readonly, is_shallow, mark_raw, reactive, readonly,
    shallow_reactive, shallow_readonly, to_raw, ReactiveHandle,
};
pub use target::{ListTarget, MapTarget, ObjTarget, SetTarget};
