//! Track/trigger plumbing for aggregate targets.
//!
//! Reads on a reactive view register the active effect against the
//! target's per-key dep table; writes collect the affected deps according
//! to the fan-out rules and raise their subscribers to `Dirty`. The whole
//! fan-out of one write runs under a scheduling pause so every announce
//! hook fires before any user scheduler drains.
//!
//! Fan-out rules:
//!
//! - `Add` on a non-sequence also hits `Iterate` (and `MapKeyIterate` for
//!   keyed containers); `Add` at an integer key on a sequence hits
//!   `Length`.
//! - `Delete` on a non-sequence also hits `Iterate` (+ `MapKeyIterate`
//!   for keyed containers).
//! - `Set` on a keyed container also hits `Iterate`.
//! - `Clear` hits every dep registered on the target.
//! - Setting a sequence's length hits `Length` and every index dep at or
//!   past the new length.

use crate::reactive::context;
use crate::reactive::debug::{DebugEvent, OpKind};
use crate::reactive::dep::{track_effect, trigger_effects};
use crate::reactive::effect::DirtyLevel;
use crate::reactive::scheduler;
use crate::value::{Key, Value};

use super::target::{DepKey, Target};

/// Record a read of `key` on `target` for the active effect.
pub(crate) fn track_target(target: &Target, op: OpKind, key: DepKey) {
    if !context::is_tracking() {
        return;
    }
    let Some(effect) = context::active_effect() else {
        return;
    };
    let dep = target.deps().ensure(key.clone());
    let target_id = target.id();
    track_effect(&effect, &dep, &|id| {
        let mut event = DebugEvent::new(id, target_id, op);
        if let DepKey::Entry(key) = &key {
            event.key = Some(key.clone());
        }
        event
    });
}

/// Raise subscribers affected by a keyed mutation of `target`.
pub(crate) fn trigger_target(
    target: &Target,
    op: OpKind,
    key: Option<Key>,
    new_value: Option<&Value>,
    old_value: Option<&Value>,
    old_target: Option<Value>,
) {
    let dep_map = target.deps();
    let mut deps = Vec::new();

    if matches!(op, OpKind::Clear) {
        deps = dep_map.all();
    } else {
        if let Some(key) = &key {
            if let Some(dep) = dep_map.get(&DepKey::Entry(key.clone())) {
                deps.push(dep);
            }
        }
        match op {
            OpKind::Add => {
                if !target.is_list() {
                    deps.extend(dep_map.get(&DepKey::Iterate));
                    if target.is_map() {
                        deps.extend(dep_map.get(&DepKey::MapKeyIterate));
                    }
                } else if matches!(key, Some(Key::Int(_))) {
                    deps.extend(dep_map.get(&DepKey::Length));
                }
            }
            OpKind::Delete => {
                if !target.is_list() {
                    deps.extend(dep_map.get(&DepKey::Iterate));
                    if target.is_map() {
                        deps.extend(dep_map.get(&DepKey::MapKeyIterate));
                    }
                }
            }
            OpKind::Set => {
                if target.is_map() {
                    deps.extend(dep_map.get(&DepKey::Iterate));
                }
            }
            _ => {}
        }
    }

    let target_id = target.id();
    scheduler::pause_scheduling();
    for dep in deps {
        trigger_effects(&dep, DirtyLevel::Dirty, &|id| {
            let mut event = DebugEvent::new(id, target_id, op);
            event.key = key.clone();
            event.new_value = new_value.cloned();
            event.old_value = old_value.cloned();
            event.old_target = old_target.clone();
            event
        });
    }
    scheduler::reset_scheduling();
}

/// Raise subscribers affected by a sequence length change: the `Length`
/// dep plus every index dep at or past the new length.
pub(crate) fn trigger_length_set(target: &Target, new_len: usize) {
    let mut deps = Vec::new();
    for (key, dep) in target.deps().entries() {
        match key {
            DepKey::Length => deps.push(dep),
            DepKey::Entry(Key::Int(i)) if i >= new_len as i64 => deps.push(dep),
            _ => {}
        }
    }

    let target_id = target.id();
    scheduler::pause_scheduling();
    for dep in deps {
        trigger_effects(&dep, DirtyLevel::Dirty, &|id| {
            let mut event = DebugEvent::new(id, target_id, OpKind::Set);
            event.new_value = Some(Value::Int(new_len as i64));
            event
        });
    }
    scheduler::reset_scheduling();
}
