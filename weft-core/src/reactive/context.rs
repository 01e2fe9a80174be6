//! Ambient Tracking Context
//!
//! The tracking context records which effect is currently running and
//! whether dependency tracking is enabled at all. When a reactive value is
//! read, the read site consults this context to decide whether (and for
//! whom) to record a dependency edge.
//!
//! # Implementation
//!
//! We use thread-local state: the engine assumes a single mutator thread,
//! and thread-local storage avoids synchronization entirely. The
//! `should_track` flag is saved on a stack by [`pause_tracking`] /
//! [`enable_tracking`] and restored by [`reset_tracking`], so nested
//! pause/enable regions compose. A stack underflow resets the flag to
//! `true` rather than panicking.
//!
//! The active effect is swapped in and out around each effect run using a
//! guard that restores the previous state on every exit path, including
//! panics.

use std::cell::RefCell;
use std::sync::Arc;

use super::effect::ReactiveEffect;

thread_local! {
    static CONTEXT: RefCell<TrackingContext> = RefCell::new(TrackingContext {
        active_effect: None,
        should_track: true,
        track_stack: Vec::new(),
    });
}

struct TrackingContext {
    /// The effect currently executing, if any.
    active_effect: Option<Arc<ReactiveEffect>>,
    /// Whether reads should record dependencies right now.
    should_track: bool,
    /// Saved `should_track` values for nested pause/enable regions.
    track_stack: Vec<bool>,
}

/// Disable dependency tracking until the matching [`reset_tracking`].
pub fn pause_tracking() {
    CONTEXT.with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        let prev = ctx.should_track;
        ctx.track_stack.push(prev);
        ctx.should_track = false;
    });
}

/// Force-enable dependency tracking until the matching [`reset_tracking`].
pub fn enable_tracking() {
    CONTEXT.with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        let prev = ctx.should_track;
        ctx.track_stack.push(prev);
        ctx.should_track = true;
    });
}

/// Restore the tracking flag saved by the most recent
/// [`pause_tracking`] / [`enable_tracking`].
///
/// An unbalanced call resets the flag to `true`; it never panics.
pub fn reset_tracking() {
    CONTEXT.with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        ctx.should_track = ctx.track_stack.pop().unwrap_or(true);
    });
}

/// Whether a read at this point should record a dependency.
pub(crate) fn is_tracking() -> bool {
    CONTEXT.with(|ctx| {
        let ctx = ctx.borrow();
        ctx.should_track && ctx.active_effect.is_some()
    })
}

/// The currently running effect, if any.
pub(crate) fn active_effect() -> Option<Arc<ReactiveEffect>> {
    CONTEXT.with(|ctx| ctx.borrow().active_effect.clone())
}

/// Install `effect` as the active effect with tracking enabled, returning
/// the previous `(active_effect, should_track)` pair for later restore.
pub(crate) fn replace_active(
    effect: Option<Arc<ReactiveEffect>>,
) -> (Option<Arc<ReactiveEffect>>, bool) {
    CONTEXT.with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        let prev_effect = ctx.active_effect.take();
        let prev_track = ctx.should_track;
        ctx.active_effect = effect;
        ctx.should_track = true;
        (prev_effect, prev_track)
    })
}

/// Restore state captured by [`replace_active`].
pub(crate) fn restore_active(prev: (Option<Arc<ReactiveEffect>>, bool)) {
    CONTEXT.with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        ctx.active_effect = prev.0;
        ctx.should_track = prev.1;
    });
}

/// Guard that pauses tracking for its lifetime.
///
/// Used around operations that must read reactive state without recording
/// dependencies (length-mutating sequence methods, the sequential dirty
/// query). The flag is restored on drop, panics included.
pub(crate) struct PauseTracking;

impl PauseTracking {
    pub(crate) fn new() -> Self {
        pause_tracking();
        PauseTracking
    }
}

impl Drop for PauseTracking {
    fn drop(&mut self) {
        reset_tracking();
    }
}
