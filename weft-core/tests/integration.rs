//! Integration tests for the reactive engine.
//!
//! These exercise signals, derivations, effects, scopes, and the proxy
//! layer together: lazy recomputation, dep-order stability, convergence of
//! self-invalidating getters, scope teardown, and batched scheduling.

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use weft_core::{
    derived, effect, is_reactive, on_scope_dispose, pause_scheduling, pause_tracking, reactive,
    readonly, reset_scheduling, reset_tracking, signal, EffectScope, ReactiveError, Value,
};

/// A derivation over a wrapped object is computed lazily: creation runs
/// nothing, reads are cached, and a write only marks it stale.
#[test]
fn lazy_compute_over_a_wrapped_object() {
    let calls = Arc::new(AtomicUsize::new(0));
    let v = signal(Value::new_obj());

    let calls_clone = calls.clone();
    let v_clone = v.clone();
    let c = derived(move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        v_clone.get().get_key("foo")
    });

    // Not computed yet.
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // First read computes once and sees the missing key as Null.
    assert!(c.get().same(&Value::Null));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Second read is served from cache.
    assert!(c.get().same(&Value::Null));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Writing through the view marks the derivation but does not run it.
    v.get_untracked().set_key("foo", 1).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The next read recomputes.
    assert_eq!(c.get().as_int(), Some(1));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// The dep list of an effect equals the deps read on the latest run, in
/// read order, and the sequential dirty query visits them in that order
/// (so the expensive branch is recomputed at most once per actual need).
#[test]
fn dep_order_matches_the_last_read_order() {
    let a = signal(0);

    let a_for_b = a.clone();
    let b = derived(move || Value::Bool(a_for_b.get().as_int().unwrap() % 3 != 0));

    let a_for_d = a.clone();
    let d = derived(move || Value::Bool(a_for_d.get().as_int().unwrap() % 3 == 2));

    let expensive_calls = Arc::new(AtomicUsize::new(0));
    let a_for_c = a.clone();
    let expensive_clone = expensive_calls.clone();
    let c = derived(move || {
        expensive_clone.fetch_add(1, Ordering::SeqCst);
        Value::Int(a_for_c.get().as_int().unwrap() + 100)
    });

    let (b2, d2, c2) = (b.clone(), d.clone(), c.clone());
    let e = derived(move || {
        if b2.get().as_bool().unwrap() {
            if d2.get().as_bool().unwrap() {
                Value::from("avoid")
            } else {
                c2.get()
            }
        } else {
            c2.get()
        }
    });

    // a = 0: b is false, so e reads [b, c].
    assert_eq!(e.get().as_int(), Some(100));

    // a = 1: b is true, d is false, so e reads [b, d, c].
    a.set(1);
    assert_eq!(e.get().as_int(), Some(101));

    let deps = e.effect().deps();
    assert_eq!(deps.len(), 3);
    assert!(Arc::ptr_eq(&deps[0], &b.dep_handle().unwrap()));
    assert!(Arc::ptr_eq(&deps[1], &d.dep_handle().unwrap()));
    assert!(Arc::ptr_eq(&deps[2], &c.dep_handle().unwrap()));

    // The expensive getter ran once per read of e, never during the
    // dirty query walk.
    assert!(expensive_calls.load(Ordering::SeqCst) <= 2);
}

/// A getter that mutates its own dependency settles after one further
/// read.
#[test]
fn self_invalidating_chain_converges_in_one_further_read() {
    let v = signal(0);

    let v_for_c1 = v.clone();
    let c1 = derived(move || {
        if v_for_c1.get().as_int() == Some(0) {
            v_for_c1.set(1);
        }
        Value::from("foo")
    });

    let v_for_c2 = v.clone();
    let c1_clone = c1.clone();
    let c2 = derived(move || {
        let n = v_for_c2.get();
        let s = c1_clone.get();
        Value::from(format!("{}{}", n.as_int().unwrap(), s.as_str().unwrap()))
    });

    assert_eq!(c2.get().as_str(), Some("0foo"));
    assert_eq!(c2.get().as_str(), Some("1foo"));
    assert_eq!(c2.get().as_str(), Some("1foo"));
}

/// Stopping a scope silences every effect created inside it and runs the
/// dispose callbacks exactly once, in registration order.
#[test]
fn scope_teardown_silences_effects_and_orders_cleanups() {
    let counter = signal(0);
    let first_runs = Arc::new(AtomicI32::new(0));
    let second_runs = Arc::new(AtomicI32::new(0));
    let dispose_order = Arc::new(Mutex::new(Vec::new()));

    let scope = EffectScope::new(false);
    let _ = scope.run(|| {
        let counter_clone = counter.clone();
        let runs = first_runs.clone();
        effect(move || {
            let _ = counter_clone.get();
            runs.fetch_add(1, Ordering::SeqCst);
        });

        let counter_clone = counter.clone();
        let runs = second_runs.clone();
        effect(move || {
            let _ = counter_clone.get();
            runs.fetch_add(1, Ordering::SeqCst);
        });

        let order = dispose_order.clone();
        on_scope_dispose(move || order.lock().unwrap().push("first"));
        let order = dispose_order.clone();
        on_scope_dispose(move || order.lock().unwrap().push("second"));
    });

    counter.set(1);
    assert_eq!(first_runs.load(Ordering::SeqCst), 2);
    assert_eq!(second_runs.load(Ordering::SeqCst), 2);

    scope.stop();
    scope.stop();
    assert_eq!(*dispose_order.lock().unwrap(), vec!["first", "second"]);

    counter.set(2);
    assert_eq!(first_runs.load(Ordering::SeqCst), 2);
    assert_eq!(second_runs.load(Ordering::SeqCst), 2);
    assert_eq!(counter.subscriber_count(), 0);
}

/// A detached child scope is not torn down by its parent.
#[test]
fn detached_child_scope_survives_parent_stop() {
    let counter = signal(0);
    let runs = Arc::new(AtomicI32::new(0));

    let parent = EffectScope::new(false);
    let child = parent
        .run(|| {
            let child = EffectScope::new(true);
            let counter = counter.clone();
            let runs = runs.clone();
            let _ = child.run(move || {
                effect(move || {
                    let _ = counter.get();
                    runs.fetch_add(1, Ordering::SeqCst);
                });
            });
            child
        })
        .unwrap();

    parent.stop();
    counter.set(1);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    child.stop();
    counter.set(2);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// A length-altering sequence mutation triggers a length effect exactly
/// once, not once per internal read or per fan-out edge.
#[test]
fn push_triggers_a_length_effect_exactly_once() {
    let arr = reactive(Value::new_list([Value::Int(1), Value::Int(2)]));
    let runs = Arc::new(AtomicI32::new(0));

    let arr_clone = arr.clone();
    let runs_clone = runs.clone();
    effect(move || {
        let _ = arr_clone.len_of();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let Value::Reactive(handle) = &arr else {
        panic!("expected a reactive list");
    };
    handle.push(Value::Int(3)).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(handle.len(), 3);
}

/// After a run, the dep list contains exactly the deps read on the final
/// path through the closure; deps no longer read are released.
#[test]
fn deps_shrink_to_the_latest_read_path() {
    let gate = signal(true);
    let left = signal(1);
    let right = signal(2);

    let (gate_c, left_c, right_c) = (gate.clone(), left.clone(), right.clone());
    let runner = effect(move || {
        if gate_c.get().as_bool().unwrap() {
            let _ = left_c.get();
        } else {
            let _ = right_c.get();
        }
    });

    assert_eq!(runner.effect().dep_count(), 2);
    assert_eq!(left.subscriber_count(), 1);
    assert_eq!(right.subscriber_count(), 0);

    gate.set(false);
    assert_eq!(runner.effect().dep_count(), 2);
    assert_eq!(left.subscriber_count(), 0);
    assert_eq!(right.subscriber_count(), 1);
}

/// Reads under `pause_tracking` do not subscribe; `reset_tracking`
/// restores the previous behavior.
#[test]
fn paused_tracking_reads_do_not_subscribe() {
    let seen = signal(1);
    let hidden = signal(2);
    let runs = Arc::new(AtomicI32::new(0));

    let (seen_c, hidden_c) = (seen.clone(), hidden.clone());
    let runs_clone = runs.clone();
    effect(move || {
        runs_clone.fetch_add(1, Ordering::SeqCst);
        let _ = seen_c.get();
        pause_tracking();
        let _ = hidden_c.get();
        reset_tracking();
    });

    assert_eq!(hidden.subscriber_count(), 0);

    hidden.set(9);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    seen.set(9);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Writes inside a paused-scheduling region coalesce: the effect re-runs
/// once at the drain point.
#[test]
fn paused_scheduling_batches_writes() {
    let count = signal(0);
    let runs = Arc::new(AtomicI32::new(0));

    let count_clone = count.clone();
    let runs_clone = runs.clone();
    effect(move || {
        let _ = count_clone.get();
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    pause_scheduling();
    count.set(1);
    count.set(2);
    count.set(3);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    reset_scheduling();

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(count.get_untracked().as_int(), Some(3));
}

/// Readonly wrappers reject writes with no state change, while reads keep
/// flowing through to the underlying data.
#[test]
fn readonly_views_are_inert_to_writes() {
    let raw = Value::obj_from([("mode", Value::from("dark"))]);
    let live = reactive(raw.clone());
    let frozen = readonly(live.clone());

    assert!(is_reactive(&frozen));
    assert_eq!(
        frozen.set_key("mode", "light"),
        Err(ReactiveError::ReadonlyWrite)
    );
    assert_eq!(frozen.get_key("mode").as_str(), Some("dark"));

    // Mutation through the live view is visible through the frozen one.
    live.set_key("mode", "light").unwrap();
    assert_eq!(frozen.get_key("mode").as_str(), Some("light"));
}

/// Two consecutive derivation reads with no intervening write yield the
/// cached value without re-running the getter, even through a chain.
#[test]
fn derivation_chains_memoize_between_writes() {
    let base = signal(1);
    let mid_calls = Arc::new(AtomicUsize::new(0));
    let top_calls = Arc::new(AtomicUsize::new(0));

    let base_clone = base.clone();
    let mid_clone = mid_calls.clone();
    let mid = derived(move || {
        mid_clone.fetch_add(1, Ordering::SeqCst);
        Value::Int(base_clone.get().as_int().unwrap() * 10)
    });

    let mid_handle = mid.clone();
    let top_clone = top_calls.clone();
    let top = derived(move || {
        top_clone.fetch_add(1, Ordering::SeqCst);
        Value::Int(mid_handle.get().as_int().unwrap() + 1)
    });

    assert_eq!(top.get().as_int(), Some(11));
    assert_eq!(top.get().as_int(), Some(11));
    assert_eq!(mid_calls.load(Ordering::SeqCst), 1);
    assert_eq!(top_calls.load(Ordering::SeqCst), 1);

    base.set(2);
    assert_eq!(top.get().as_int(), Some(21));
    assert_eq!(mid_calls.load(Ordering::SeqCst), 2);
    assert_eq!(top_calls.load(Ordering::SeqCst), 2);
}

/// Effects over deep cells observe nested mutations made through the
/// cell's reactive view.
#[test]
fn deep_cell_mutations_flow_to_effects() {
    let profile = signal(Value::obj_from([("name", Value::from("ada"))]));
    let observed = Arc::new(Mutex::new(String::new()));

    let profile_clone = profile.clone();
    let observed_clone = observed.clone();
    effect(move || {
        let name = profile_clone.get().get_key("name");
        *observed_clone.lock().unwrap() = name.as_str().unwrap_or("").to_string();
    });
    assert_eq!(*observed.lock().unwrap(), "ada");

    profile.get_untracked().set_key("name", "grace").unwrap();
    assert_eq!(*observed.lock().unwrap(), "grace");
}
