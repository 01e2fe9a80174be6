//! Dep: the subscriber table of one observable value.
//!
//! A `Dep` maps each subscribing effect to the track epoch at which the
//! subscription was last confirmed. The epoch makes both halves of the
//! protocol cheap:
//!
//! - **track**: if the recorded epoch already equals the effect's current
//!   `track_id`, the edge was recorded earlier in this same run and nothing
//!   needs to happen.
//! - **trigger**: an entry whose epoch no longer matches the effect's
//!   `track_id` is stale (the effect re-ran without reading this value, or
//!   was stopped) and is skipped.
//!
//! Entries are kept in insertion order; triggers visit subscribers in that
//! order. When the last entry is removed the dep's `cleanup` hook runs,
//! letting the owner drop the dep itself (a cell clears its lazy slot, a
//! keyed table removes the key entry).

use std::sync::{Arc, RwLock, Weak};

use indexmap::IndexMap;

use super::context;
use super::debug::DebugEvent;
use super::effect::{DirtyLevel, EffectId, ReactiveEffect};
use super::scheduler;

/// Back-pointer from a dep to the derivation whose value it guards.
///
/// Used by the sequential dirty query: resolving `MaybeDirty` forces each
/// owning derivation to refresh, in recorded-read order, until one of them
/// propagates a real `Dirty`.
pub(crate) trait DepOwner: Send + Sync {
    fn refresh(&self);
}

struct DepSub {
    // Subscriptions keep the effect alive: an effect stays responsive
    // even when its creator dropped the runner. The strong cycle through
    // the effect's own dep list is broken explicitly by `stop()` and by
    // the post-run sweep, never by a collector.
    effect: Arc<ReactiveEffect>,
    epoch: u64,
}

/// Subscriber table of one observable value.
pub struct Dep {
    subs: RwLock<IndexMap<EffectId, DepSub>>,
    cleanup: Box<dyn Fn() + Send + Sync>,
    owner: Option<Weak<dyn DepOwner>>,
}

impl Dep {
    pub(crate) fn new(
        cleanup: Box<dyn Fn() + Send + Sync>,
        owner: Option<Weak<dyn DepOwner>>,
    ) -> Arc<Dep> {
        Arc::new(Dep {
            subs: RwLock::new(IndexMap::new()),
            cleanup,
            owner,
        })
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.subs.read().expect("dep subs lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn owner(&self) -> Option<Arc<dyn DepOwner>> {
        self.owner.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn epoch_of(&self, id: EffectId) -> Option<u64> {
        self.subs
            .read()
            .expect("dep subs lock poisoned")
            .get(&id)
            .map(|sub| sub.epoch)
    }

    pub(crate) fn record(&self, effect: &Arc<ReactiveEffect>, epoch: u64) {
        let mut subs = self.subs.write().expect("dep subs lock poisoned");
        let entry = subs.entry(effect.id()).or_insert_with(|| DepSub {
            effect: Arc::clone(effect),
            epoch,
        });
        entry.epoch = epoch;
    }

    /// Drop `id` from the table. Runs `cleanup` if this removal emptied it.
    pub(crate) fn remove(&self, id: EffectId) {
        let emptied = {
            let mut subs = self.subs.write().expect("dep subs lock poisoned");
            subs.shift_remove(&id).is_some() && subs.is_empty()
        };
        if emptied {
            (self.cleanup)();
        }
    }

    fn snapshot(&self) -> Vec<(EffectId, Arc<ReactiveEffect>)> {
        self.subs
            .read()
            .expect("dep subs lock poisoned")
            .iter()
            .map(|(id, sub)| (*id, Arc::clone(&sub.effect)))
            .collect()
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep").field("len", &self.len()).finish()
    }
}

/// Record a dependency edge from the running `effect` to `dep`.
///
/// The dep is spliced into the effect's dep list at the current high-water
/// slot; a different dep previously occupying that slot is evicted and, if
/// the effect no longer subscribes to it this run, removed from it. This
/// keeps the dep list in first-read order of the latest run and lets the
/// post-run sweep discard everything past the high-water mark.
pub(crate) fn track_effect(
    effect: &Arc<ReactiveEffect>,
    dep: &Arc<Dep>,
    info: &dyn Fn(EffectId) -> DebugEvent,
) {
    let id = effect.id();
    let (evicted, track_id) = {
        let mut done = None;
        let result = effect.with_state(|st| {
            if dep.epoch_of(id) == Some(st.track_id) {
                done = Some(());
                return (None, st.track_id);
            }
            dep.record(effect, st.track_id);
            let slot = st.deps_len;
            let mut evicted = None;
            if slot < st.deps.len() {
                if !Arc::ptr_eq(&st.deps[slot], dep) {
                    evicted = Some(std::mem::replace(&mut st.deps[slot], Arc::clone(dep)));
                }
            } else {
                st.deps.push(Arc::clone(dep));
            }
            st.deps_len += 1;
            (evicted, st.track_id)
        });
        if done.is_some() {
            return;
        }
        result
    };

    if let Some(old) = evicted {
        // Only sever if the effect did not re-read the evicted dep this run.
        if old.epoch_of(id).is_some_and(|epoch| epoch != track_id) {
            old.remove(id);
        }
    }

    if effect.has_on_track() {
        effect.fire_on_track(&info(id));
    }
}

/// Remove `effect` from a dep unless the subscription was refreshed during
/// the effect's current run.
pub(crate) fn cleanup_dep_effect(dep: &Arc<Dep>, id: EffectId, current_track_id: u64) {
    if dep
        .epoch_of(id)
        .is_some_and(|epoch| epoch != current_track_id)
    {
        dep.remove(id);
    }
}

/// Raise every live subscriber of `dep` to at least `level`.
///
/// Subscribers are visited in insertion order. A `Clean -> dirty`
/// transition fires the effect's announce hook immediately; scheduler
/// callbacks are only enqueued, and drain when the scheduling pause depth
/// returns to zero.
pub(crate) fn trigger_effects(
    dep: &Arc<Dep>,
    level: DirtyLevel,
    info: &dyn Fn(EffectId) -> DebugEvent,
) {
    scheduler::pause_scheduling();
    for (id, effect) in dep.snapshot() {
        // Re-read the epoch per entry: an earlier announce in this same
        // pass may have severed the subscription.
        let Some(epoch) = dep.epoch_of(id) else {
            continue;
        };
        let (announce, job) = effect.raise(epoch, level);
        if announce {
            if effect.has_on_trigger() {
                effect.fire_on_trigger(&info(id));
            }
            effect.announce();
        }
        if let Some(job) = job {
            scheduler::queue_scheduler(job);
        }
    }
    scheduler::reset_scheduling();
}

/// A lazily materialized dep slot, shared by cells and derivations.
///
/// The dep is created on first track and drops itself (via its cleanup
/// hook) when its last subscriber leaves, so unobserved cells carry no
/// subscriber table at all.
#[derive(Clone)]
pub(crate) struct LazyDep {
    slot: Arc<RwLock<Option<Arc<Dep>>>>,
}

impl LazyDep {
    pub(crate) fn new() -> Self {
        LazyDep {
            slot: Arc::new(RwLock::new(None)),
        }
    }

    pub(crate) fn current(&self) -> Option<Arc<Dep>> {
        self.slot.read().expect("lazy dep lock poisoned").clone()
    }

    pub(crate) fn ensure(&self, owner: Option<Weak<dyn DepOwner>>) -> Arc<Dep> {
        if let Some(dep) = self.current() {
            return dep;
        }
        let mut slot = self.slot.write().expect("lazy dep lock poisoned");
        slot.get_or_insert_with(|| {
            let weak = Arc::downgrade(&self.slot);
            Dep::new(
                Box::new(move || {
                    if let Some(slot) = weak.upgrade() {
                        *slot.write().expect("lazy dep lock poisoned") = None;
                    }
                }),
                owner,
            )
        })
        .clone()
    }

    /// Track the active effect against this dep, materializing it first.
    pub(crate) fn track(
        &self,
        owner: Option<Weak<dyn DepOwner>>,
        info: &dyn Fn(EffectId) -> DebugEvent,
    ) {
        if !context::is_tracking() {
            return;
        }
        let Some(effect) = context::active_effect() else {
            return;
        };
        let dep = self.ensure(owner);
        track_effect(&effect, &dep, info);
    }

    /// Trigger the dep's subscribers, if the dep ever materialized.
    pub(crate) fn trigger(&self, level: DirtyLevel, info: &dyn Fn(EffectId) -> DebugEvent) {
        if let Some(dep) = self.current() {
            trigger_effects(&dep, level, info);
        }
    }
}
