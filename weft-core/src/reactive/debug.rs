//! Debug event payloads delivered to `on_track` / `on_trigger` hooks.

use std::sync::Arc;

use crate::value::{Key, Value};

use super::effect::EffectId;

/// The operation that produced a debug event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Get,
    Has,
    Iterate,
    Set,
    Add,
    Delete,
    Clear,
}

/// A single track or trigger observation.
///
/// `target` is the id of the cell, derivation, or aggregate target the
/// operation addressed. `old_target` is only populated for `Clear`, where
/// it snapshots the container before it was emptied.
#[derive(Clone)]
pub struct DebugEvent {
    pub effect: EffectId,
    pub target: u64,
    pub op: OpKind,
    pub key: Option<Key>,
    pub new_value: Option<Value>,
    pub old_value: Option<Value>,
    pub old_target: Option<Value>,
}

impl DebugEvent {
    pub(crate) fn new(effect: EffectId, target: u64, op: OpKind) -> Self {
        DebugEvent {
            effect,
            target,
            op,
            key: None,
            new_value: None,
            old_value: None,
            old_target: None,
        }
    }

}

impl std::fmt::Debug for DebugEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugEvent")
            .field("effect", &self.effect)
            .field("target", &self.target)
            .field("op", &self.op)
            .field("key", &self.key)
            .finish()
    }
}

/// Callback type for `on_track` / `on_trigger` hooks.
pub type DebugHook = Arc<dyn Fn(&DebugEvent) + Send + Sync>;
