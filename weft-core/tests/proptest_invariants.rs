//! Property-based invariant tests for the reactive engine.
//!
//! These verify structural invariants that must hold for **any** sequence
//! of operations:
//!
//! 1. An effect mirroring a derivation always observes the latest value,
//!    and the derivation's getter runs at most once per distinct change.
//! 2. A reactive sequence driven by random mutations stays in lockstep
//!    with a plain `Vec` model, and a length effect re-runs only when the
//!    length actually changed.
//! 3. Subscriber tables shrink back to the latest read path: cells an
//!    effect stopped reading hold no subscription for it.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use proptest::prelude::*;

use weft_core::{derived, effect, reactive, signal, Value};

// ── Helpers ─────────────────────────────────────────────────────────────

/// A small integer pool keeps duplicate writes likely, which is the
/// interesting case for change-gating.
fn write_sequence() -> impl Strategy<Value = Vec<i64>> {
    proptest::collection::vec(-3i64..=3, 1..40)
}

#[derive(Debug, Clone)]
enum ListOp {
    Push(i64),
    Pop,
    Set(usize, i64),
    SetLen(usize),
}

fn list_ops() -> impl Strategy<Value = Vec<ListOp>> {
    proptest::collection::vec(
        prop_oneof![
            (-5i64..=5).prop_map(ListOp::Push),
            Just(ListOp::Pop),
            (0usize..8, -5i64..=5).prop_map(|(i, v)| ListOp::Set(i, v)),
            (0usize..8).prop_map(ListOp::SetLen),
        ],
        1..50,
    )
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Derivation mirror: latest value always observed, minimal recomputes
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn derivation_mirror_tracks_every_distinct_change(writes in write_sequence()) {
        let source = signal(0);
        let getter_calls = Arc::new(AtomicUsize::new(0));
        let observed = Arc::new(AtomicI64::new(i64::MIN));

        let source_clone = source.clone();
        let calls_clone = getter_calls.clone();
        let doubled = derived(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Value::Int(source_clone.get().as_int().unwrap() * 2)
        });

        let doubled_clone = doubled.clone();
        let observed_clone = observed.clone();
        effect(move || {
            observed_clone.store(
                doubled_clone.get().as_int().unwrap(),
                Ordering::SeqCst,
            );
        });

        let mut last = 0i64;
        let mut distinct_changes = 0usize;
        for w in writes {
            source.set(Value::Int(w));
            if w != last {
                distinct_changes += 1;
                last = w;
            }
            prop_assert_eq!(observed.load(Ordering::SeqCst), last * 2,
                "effect must observe the doubled latest write");
        }

        // One initial computation plus at most one per distinct change.
        prop_assert!(
            getter_calls.load(Ordering::SeqCst) <= distinct_changes + 1,
            "getter ran {} times for {} distinct changes",
            getter_calls.load(Ordering::SeqCst),
            distinct_changes
        );
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Reactive sequence stays in lockstep with a Vec model
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn reactive_sequence_matches_vec_model(ops in list_ops()) {
        let list = reactive(Value::new_list([]));
        let Value::Reactive(handle) = &list else {
            panic!("expected a reactive list");
        };
        let mut model: Vec<Option<i64>> = Vec::new();

        let observed_len = Arc::new(AtomicUsize::new(usize::MAX));
        let len_runs = Arc::new(AtomicUsize::new(0));
        let handle_clone = handle.clone();
        let observed_clone = observed_len.clone();
        let runs_clone = len_runs.clone();
        effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            observed_clone.store(handle_clone.len(), Ordering::SeqCst);
        });

        for op in ops {
            let len_before = model.len();
            match op {
                ListOp::Push(v) => {
                    handle.push(Value::Int(v)).unwrap();
                    model.push(Some(v));
                }
                ListOp::Pop => {
                    let popped = handle.pop().unwrap();
                    let expected = model.pop();
                    match (popped, expected.flatten()) {
                        (Some(value), Some(v)) => prop_assert_eq!(value.as_int(), Some(v)),
                        (Some(value), None) => prop_assert!(value.same(&Value::Null)),
                        (None, _) => prop_assert_eq!(len_before, 0),
                    }
                }
                ListOp::Set(i, v) => {
                    handle.set(i, Value::Int(v)).unwrap();
                    while model.len() < i {
                        model.push(None);
                    }
                    if i < model.len() {
                        model[i] = Some(v);
                    } else {
                        model.push(Some(v));
                    }
                }
                ListOp::SetLen(n) => {
                    handle.set_len(n).unwrap();
                    while model.len() < n {
                        model.push(None);
                    }
                    model.truncate(n);
                }
            }

            prop_assert_eq!(handle.len(), model.len(), "length diverged from model");
            prop_assert_eq!(
                observed_len.load(Ordering::SeqCst),
                model.len(),
                "length effect is stale"
            );
            for (i, expected) in model.iter().enumerate() {
                let actual = handle.get(i);
                match expected {
                    Some(v) => prop_assert_eq!(actual.as_int(), Some(*v)),
                    None => prop_assert!(actual.same(&Value::Null)),
                }
            }
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Subscriber tables shrink to the latest read path
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn unread_cells_drop_their_subscriptions(masks in proptest::collection::vec(0u8..16, 1..20)) {
        let cells: Vec<_> = (0..4).map(|_| signal(0)).collect();
        let mask = signal(Value::Int(15));

        let mask_clone = mask.clone();
        let cells_clone = cells.clone();
        let runner = effect(move || {
            let m = mask_clone.get().as_int().unwrap();
            for (i, cell) in cells_clone.iter().enumerate() {
                if m & (1 << i) != 0 {
                    let _ = cell.get();
                }
            }
        });

        for m in masks {
            mask.set(Value::Int(m as i64));
            for (i, cell) in cells.iter().enumerate() {
                let expected = usize::from(m & (1 << i) != 0);
                prop_assert_eq!(
                    cell.subscriber_count(),
                    expected,
                    "cell {} subscription does not match mask {:#06b}",
                    i,
                    m
                );
            }
        }

        runner.stop();
        for cell in &cells {
            prop_assert_eq!(cell.subscriber_count(), 0);
        }
    }
}
